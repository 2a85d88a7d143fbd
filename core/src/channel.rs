// Channel bindings: one per named subsystem channel
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::envelope::{InboundEvent, ReplyEnvelope, RequestEnvelope};
use crate::transport::{ChannelHandle, InboundHandler, Transport};
use crate::{CourierError, Result};

/// The fixed set of channels shared with the counterpart process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelName {
    Circuits,
    Members,
    Hotkeys,
    Teams,
    Journal,
    Talk,
    Notifications,
}

impl ChannelName {
    pub const ALL: [ChannelName; 7] = [
        ChannelName::Circuits,
        ChannelName::Members,
        ChannelName::Hotkeys,
        ChannelName::Teams,
        ChannelName::Journal,
        ChannelName::Talk,
        ChannelName::Notifications,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelName::Circuits => "circuits",
            ChannelName::Members => "members",
            ChannelName::Hotkeys => "hotkeys",
            ChannelName::Teams => "teams",
            ChannelName::Journal => "journal",
            ChannelName::Talk => "talk",
            ChannelName::Notifications => "notifications",
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelName {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        ChannelName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| CourierError::UnknownChannel(s.to_string()))
    }
}

#[derive(Default)]
struct BindingCounters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of a binding's traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

/// Owns one named channel to the counterpart.
///
/// Sends go straight to the transport handle. Inbound envelopes are handed,
/// unfiltered, to the one handler given at construction; without a handler
/// they are counted and dropped.
pub struct ChannelBinding {
    name: ChannelName,
    owner: String,
    handle: Arc<dyn ChannelHandle>,
    handler: Option<Arc<dyn InboundHandler>>,
    counters: Arc<BindingCounters>,
}

// Handlers are compared by data pointer; vtables for one type may differ
// between codegen units.
fn handler_addr(handler: &Arc<dyn InboundHandler>) -> *const () {
    Arc::as_ptr(handler) as *const ()
}

impl ChannelBinding {
    fn bind(
        name: ChannelName,
        owner: String,
        handle: Arc<dyn ChannelHandle>,
        handler: Option<Arc<dyn InboundHandler>>,
    ) -> Self {
        let counters = Arc::new(BindingCounters::default());
        let dispatch = BindingDispatch {
            name,
            handler: handler.clone(),
            counters: Arc::clone(&counters),
        };
        handle.on_message(Arc::new(dispatch));
        Self {
            name,
            owner,
            handle,
            handler,
            counters,
        }
    }

    pub fn name(&self) -> ChannelName {
        self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether inbound envelopes on this binding reach `target`.
    pub fn routes_to<T: InboundHandler>(&self, target: &T) -> bool {
        self.handler
            .as_ref()
            .is_some_and(|h| handler_addr(h) == target as *const T as *const ())
    }

    fn accepts(&self, handler: Option<&Arc<dyn InboundHandler>>) -> bool {
        match (handler, &self.handler) {
            (None, _) => true,
            (Some(new), Some(installed)) => handler_addr(new) == handler_addr(installed),
            (Some(_), None) => false,
        }
    }

    /// Hand an envelope to the transport. Best-effort, no delivery receipt.
    pub fn send(&self, envelope: &RequestEnvelope) -> Result<()> {
        debug!(
            target: "channel",
            channel = %self.name,
            owner = %self.owner,
            id = %envelope.id(),
            request_type = %envelope.request_type(),
            "Sending envelope"
        );
        self.handle.send(envelope.clone())?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> BindingStats {
        BindingStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ChannelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBinding")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("stats", &self.stats())
            .finish()
    }
}

// Installed on the transport handle in place of the caller's handler so the
// binding can count traffic and drop it when no handler was given.
struct BindingDispatch {
    name: ChannelName,
    handler: Option<Arc<dyn InboundHandler>>,
    counters: Arc<BindingCounters>,
}

impl InboundHandler for BindingDispatch {
    fn handle(&self, event: InboundEvent, reply: ReplyEnvelope) {
        match &self.handler {
            Some(handler) => {
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                handler.handle(event, reply);
            }
            None => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(target: "channel", channel = %self.name, id = %reply.id, "Dropped inbound envelope on send-only channel");
            }
        }
    }
}

/// Process-wide set of channel bindings, at most one per name.
pub struct ChannelRegistry {
    transport: Arc<dyn Transport>,
    bindings: DashMap<ChannelName, Arc<ChannelBinding>>,
    // Serializes first-time binding; lookups never take it.
    creating: Mutex<()>,
}

impl ChannelRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            bindings: DashMap::new(),
            creating: Mutex::new(()),
        }
    }

    /// Create the binding for `name`, or return the existing one.
    ///
    /// Only the first call registers with the transport and installs
    /// `handler`. A later call may pass `None` or the handler already
    /// installed; any other handler fails with
    /// [`CourierError::ChannelAlreadyBound`], since inbound messages are
    /// never delivered to two listeners.
    ///
    /// The transport is called without holding a lock on the binding map,
    /// so a handler run synchronously from `on_message` may call
    /// [`get`](Self::get). It must not call `create_channel`.
    pub fn create_channel(
        &self,
        name: ChannelName,
        owner: &str,
        handler: Option<Arc<dyn InboundHandler>>,
    ) -> Result<Arc<ChannelBinding>> {
        if let Some(existing) = self.get(name) {
            return Self::reuse(existing, owner, handler.as_ref());
        }

        let _creating = self
            .creating
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.get(name) {
            return Self::reuse(existing, owner, handler.as_ref());
        }

        let handle = self.transport.register_channel(name)?;
        let binding = Arc::new(ChannelBinding::bind(
            name,
            owner.to_string(),
            handle,
            handler,
        ));
        self.bindings.insert(name, Arc::clone(&binding));
        info!(target: "channel", channel = %name, owner = %owner, "Channel bound");
        Ok(binding)
    }

    fn reuse(
        existing: Arc<ChannelBinding>,
        owner: &str,
        handler: Option<&Arc<dyn InboundHandler>>,
    ) -> Result<Arc<ChannelBinding>> {
        if !existing.accepts(handler) {
            warn!(
                target: "channel",
                channel = %existing.name(),
                owner = %owner,
                bound_by = %existing.owner(),
                "Channel already bound to another handler"
            );
            return Err(CourierError::ChannelAlreadyBound {
                channel: existing.name(),
                bound_by: existing.owner().to_string(),
            });
        }
        debug!(
            target: "channel",
            channel = %existing.name(),
            owner = %owner,
            bound_by = %existing.owner(),
            "Channel already bound; reusing binding"
        );
        Ok(existing)
    }

    /// Like [`create_channel`](Self::create_channel) but from a raw name.
    /// Unknown names fail with [`CourierError::UnknownChannel`] and register
    /// nothing.
    pub fn create_channel_named(
        &self,
        name: &str,
        owner: &str,
        handler: Option<Arc<dyn InboundHandler>>,
    ) -> Result<Arc<ChannelBinding>> {
        let name: ChannelName = name.parse()?;
        self.create_channel(name, owner, handler)
    }

    pub fn get(&self, name: ChannelName) -> Option<Arc<ChannelBinding>> {
        self.bindings.get(&name).map(|b| Arc::clone(b.value()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
