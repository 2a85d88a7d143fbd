//! In-process transport.
//!
//! Requests from every channel are funnelled, in send order, to a single
//! [`MemoryPeer`] playing the counterpart process. The peer answers whenever
//! and in whatever order it likes, on any channel, including duplicate or
//! unsolicited replies.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{ChannelHandle, InboundHandler, Transport};
use crate::channel::ChannelName;
use crate::envelope::{InboundEvent, ReplyEnvelope, RequestEnvelope};
use crate::{CourierError, Result};

type Outbound = (ChannelName, RequestEnvelope);
type HandlerSlot = Arc<RwLock<Option<Arc<dyn InboundHandler>>>>;

struct MemoryChannel {
    name: ChannelName,
    handler: HandlerSlot,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelHandle for MemoryChannel {
    fn send(&self, envelope: RequestEnvelope) -> Result<()> {
        trace!(target: "memory_transport", channel = %self.name, id = %envelope.id(), "enqueue");
        self.outbound
            .send((self.name, envelope))
            .map_err(|_| CourierError::ChannelClosed(self.name))
    }

    fn on_message(&self, handler: Arc<dyn InboundHandler>) {
        let mut slot = match self.handler.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.replace(handler).is_some() {
            debug!(target: "memory_transport", channel = %self.name, "Replaced inbound handler");
        }
    }
}

/// Process side of the in-memory transport.
pub struct MemoryTransport {
    channels: DashMap<ChannelName, Arc<MemoryChannel>>,
    handlers: Arc<DashMap<ChannelName, HandlerSlot>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    registrations: Arc<AtomicUsize>,
}

/// Counterpart side of the in-memory transport.
///
/// Holds no sender of its own: once the transport and every handle it gave
/// out are dropped, [`next_request`](Self::next_request) returns `None`.
pub struct MemoryPeer {
    handlers: Arc<DashMap<ChannelName, HandlerSlot>>,
    inbound: mpsc::UnboundedReceiver<Outbound>,
    registrations: Arc<AtomicUsize>,
}

impl MemoryTransport {
    /// Create a connected transport/counterpart pair.
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handlers = Arc::new(DashMap::new());
        let registrations = Arc::new(AtomicUsize::new(0));
        (
            MemoryTransport {
                channels: DashMap::new(),
                handlers: Arc::clone(&handlers),
                outbound: tx,
                registrations: Arc::clone(&registrations),
            },
            MemoryPeer {
                handlers,
                inbound: rx,
                registrations,
            },
        )
    }
}

impl Transport for MemoryTransport {
    fn register_channel(&self, name: ChannelName) -> Result<Arc<dyn ChannelHandle>> {
        let channel = match self.channels.entry(name) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(slot) => {
                self.registrations.fetch_add(1, Ordering::SeqCst);
                debug!(target: "memory_transport", channel = %name, "Registered channel");
                let handler: HandlerSlot = Arc::new(RwLock::new(None));
                self.handlers.insert(name, Arc::clone(&handler));
                let channel = Arc::new(MemoryChannel {
                    name,
                    handler,
                    outbound: self.outbound.clone(),
                });
                slot.insert(Arc::clone(&channel));
                channel
            }
        };
        Ok(channel)
    }
}

impl MemoryPeer {
    /// Wait for the next request sent on any channel. `None` once the
    /// process side is gone.
    pub async fn next_request(&mut self) -> Option<(ChannelName, RequestEnvelope)> {
        self.inbound.recv().await
    }

    /// Take the next request if one is already queued.
    pub fn try_next_request(&mut self) -> Option<(ChannelName, RequestEnvelope)> {
        self.inbound.try_recv().ok()
    }

    /// Drain every queued request.
    pub fn drain_requests(&mut self) -> Vec<(ChannelName, RequestEnvelope)> {
        let mut out = Vec::new();
        while let Some(next) = self.try_next_request() {
            out.push(next);
        }
        out
    }

    /// Deliver a reply on `channel`.
    ///
    /// The channel's handler runs synchronously on the caller's thread.
    /// Returns `false` when the channel was never registered or has no
    /// handler, in which case the reply is lost.
    pub fn reply(&self, channel: ChannelName, reply: ReplyEnvelope) -> bool {
        let handler = self.handlers.get(&channel).and_then(|h| {
            let slot = match h.value().read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.clone()
        });

        match handler {
            Some(handler) => {
                handler.handle(InboundEvent::now(channel), reply);
                true
            }
            None => {
                warn!(target: "memory_transport", channel = %channel, id = %reply.id, "No listener for reply");
                false
            }
        }
    }

    /// Number of distinct channels registered by the process side.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}
