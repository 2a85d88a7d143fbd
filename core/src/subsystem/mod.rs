//! Subsystem clients.
//!
//! Every domain facade (circuits, members, hotkeys) is a thin layer over one
//! [`SubsystemClient`]: a channel binding plus the correlation registry that
//! routes that channel's replies.
pub mod circuits;
pub mod hotkeys;
pub mod members;

pub use circuits::{CircuitClient, CircuitRequest};
pub use hotkeys::{HotkeyClient, HotkeyRequest};
pub use members::{MemberClient, MemberRequest};

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::{ChannelBinding, ChannelName, ChannelRegistry};
use crate::correlation::{CorrelationRegistry, PendingReply, ReplyObserver};
use crate::envelope::Delivery;
use crate::{CourierError, Result};

/// Channel binding + correlation registry for one subsystem.
///
/// `init` is idempotent: the first call binds the channel with the registry
/// as its reply handler, later calls do nothing. The registry is created
/// with the client and never reset, so requests in flight survive a
/// repeated `init`.
pub struct SubsystemClient {
    channel: ChannelName,
    owner: String,
    binding: OnceLock<Arc<ChannelBinding>>,
    registry: Arc<CorrelationRegistry>,
}

impl SubsystemClient {
    pub fn new(channel: ChannelName, owner: impl Into<String>) -> Self {
        Self {
            channel,
            owner: owner.into(),
            binding: OnceLock::new(),
            registry: Arc::new(CorrelationRegistry::new(channel)),
        }
    }

    pub fn with_observer(
        channel: ChannelName,
        owner: impl Into<String>,
        observer: ReplyObserver,
    ) -> Self {
        Self {
            registry: Arc::new(CorrelationRegistry::with_observer(channel, observer)),
            ..Self::new(channel, owner)
        }
    }

    /// Bind the subsystem channel. No-op after the first success.
    ///
    /// Fails with [`CourierError::ChannelAlreadyBound`] when another client
    /// already owns the channel in `channels`.
    pub fn init(&self, channels: &ChannelRegistry) -> Result<()> {
        if self.binding.get().is_some() {
            debug!(target: "subsystem", channel = %self.channel, "Already initialized");
            return Ok(());
        }

        let binding = channels.create_channel(
            self.channel,
            &self.owner,
            Some(self.registry.clone()),
        )?;
        // The channel registry hands back the same binding to a racing caller.
        if self.binding.set(binding).is_ok() {
            info!(target: "subsystem", channel = %self.channel, owner = %self.owner, "Subsystem client initialized");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.get().is_some()
    }

    pub fn channel(&self) -> ChannelName {
        self.channel
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn binding(&self) -> Option<&Arc<ChannelBinding>> {
        self.binding.get()
    }

    /// Number of requests still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Send a request and return its pending reply.
    pub fn request(&self, request_type: &str, payload: Value) -> Result<PendingReply> {
        let binding = self
            .binding
            .get()
            .ok_or(CourierError::NotInitialized(self.channel))?;
        self.registry.dispatch(binding, request_type, payload)
    }

    /// Send a request and wait for its reply.
    ///
    /// With `timeout` set, an unanswered request is cancelled when it
    /// elapses and [`CourierError::Timeout`] is returned. `None` waits for
    /// as long as it takes.
    pub async fn call(
        &self,
        request_type: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Delivery> {
        let pending = self.request(request_type, payload)?;
        let Some(limit) = timeout else {
            return pending.await;
        };

        let id = pending.id();
        match tokio::time::timeout(limit, pending).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.registry.cancel(id);
                warn!(
                    target: "subsystem",
                    channel = %self.channel,
                    id = %id,
                    request_type = %request_type,
                    timeout_ms = limit.as_millis() as u64,
                    "Request timed out"
                );
                Err(CourierError::Timeout(id))
            }
        }
    }
}
