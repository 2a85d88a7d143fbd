//! Channel transport boundary.
//!
//! How bytes cross the process boundary is not this crate's concern. A
//! transport only has to hand out one [`ChannelHandle`] per channel name,
//! move request envelopes to the counterpart, and surface reply envelopes
//! to the single handler registered on the handle.
//!
//! - `memory`: in-process reference transport with a scriptable counterpart

pub mod memory;

use std::sync::Arc;

use crate::channel::ChannelName;
use crate::envelope::{InboundEvent, ReplyEnvelope, RequestEnvelope};
use crate::Result;

pub use memory::{MemoryPeer, MemoryTransport};

/// Receives every inbound envelope of one channel.
pub trait InboundHandler: Send + Sync {
    fn handle(&self, event: InboundEvent, reply: ReplyEnvelope);
}

impl<F> InboundHandler for F
where
    F: Fn(InboundEvent, ReplyEnvelope) + Send + Sync,
{
    fn handle(&self, event: InboundEvent, reply: ReplyEnvelope) {
        self(event, reply)
    }
}

/// Transport side of one logical channel.
pub trait ChannelHandle: Send + Sync {
    /// Transmit an envelope to the counterpart. Best-effort: `Ok` means the
    /// transport accepted it, not that it was delivered.
    fn send(&self, envelope: RequestEnvelope) -> Result<()>;

    /// Install the inbound handler, replacing any previous one.
    ///
    /// May run the handler synchronously for traffic buffered before the
    /// call. Bindings are created without holding the binding map's locks,
    /// so such a handler can look bindings up but must not create one.
    fn on_message(&self, handler: Arc<dyn InboundHandler>);
}

/// Factory for channel handles.
pub trait Transport: Send + Sync {
    /// Establish the named channel, or return the existing handle for it.
    fn register_channel(&self, name: ChannelName) -> Result<Arc<dyn ChannelHandle>>;
}
