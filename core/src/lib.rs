// Courier Core Library
// Correlated request/reply messaging between the client and its counterpart process

pub mod channel;
pub mod config;
pub mod correlation;
pub mod envelope;
pub mod subsystem;
pub mod telemetry;
pub mod transport;

// Export core types
pub use channel::{BindingStats, ChannelBinding, ChannelName, ChannelRegistry};
pub use config::CourierConfig;
pub use correlation::{CorrelationRegistry, PendingReply, ReplyObserver};
pub use envelope::{Delivery, InboundEvent, ReplyEnvelope, RequestEnvelope, RequestId};
pub use subsystem::{CircuitClient, HotkeyClient, MemberClient, SubsystemClient};
pub use transport::{ChannelHandle, InboundHandler, MemoryPeer, MemoryTransport, Transport};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Subsystem not initialized: {0}")]
    NotInitialized(ChannelName),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(ChannelName),

    #[error("Channel {channel} already bound by {bound_by}")]
    ChannelAlreadyBound {
        channel: ChannelName,
        bound_by: String,
    },

    #[error("Binding for {0} does not route replies to this registry")]
    Misrouted(ChannelName),

    #[error("Request {0} cancelled")]
    Cancelled(RequestId),

    #[error("Request {0} expired without reply")]
    Expired(RequestId),

    #[error("Request {0} timed out")]
    Timeout(RequestId),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CourierError {
    /// Convert to error code string
    pub fn code(&self) -> &'static str {
        match self {
            CourierError::UnknownChannel(_) => "UNKNOWN_CHANNEL",
            CourierError::NotInitialized(_) => "NOT_INITIALIZED",
            CourierError::Transport(_) => "TRANSPORT_ERROR",
            CourierError::ChannelClosed(_) => "CHANNEL_CLOSED",
            CourierError::ChannelAlreadyBound { .. } => "CHANNEL_ALREADY_BOUND",
            CourierError::Misrouted(_) => "MISROUTED",
            CourierError::Cancelled(_) => "CANCELLED",
            CourierError::Expired(_) => "EXPIRED",
            CourierError::Timeout(_) => "TIMEOUT",
            CourierError::Config(_) => "CONFIG_ERROR",
            CourierError::Io(_) => "IO_ERROR",
            CourierError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;

/// Composition root: one channel registry and one client per subsystem.
///
/// Build a single `Courier` per process and share it by reference.
pub struct Courier {
    config: CourierConfig,
    channels: ChannelRegistry,
    pub circuits: CircuitClient,
    pub members: MemberClient,
    pub hotkeys: HotkeyClient,
    notify_seq: AtomicU64,
}

impl Courier {
    pub fn new(transport: Arc<dyn Transport>, config: CourierConfig) -> Self {
        Self {
            circuits: CircuitClient::new(config.owner.clone()),
            members: MemberClient::new(config.owner.clone()),
            hotkeys: HotkeyClient::new(config.owner.clone()),
            channels: ChannelRegistry::new(transport),
            notify_seq: AtomicU64::new(1),
            config,
        }
    }

    /// Bind every subsystem channel. Safe to call repeatedly.
    pub fn init(&self) -> Result<()> {
        tracing::info!(target: "courier", owner = %self.config.owner, "Initializing Courier...");

        self.circuits.init(&self.channels)?;
        self.members.init(&self.channels)?;
        self.hotkeys.init(&self.channels)?;
        self.channels
            .create_channel(ChannelName::Notifications, &self.config.owner, None)?;

        tracing::info!(target: "courier", channels = self.channels.len(), "Courier initialized");
        Ok(())
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    fn subsystems(&self) -> [&SubsystemClient; 3] {
        [
            self.circuits.subsystem(),
            self.members.subsystem(),
            self.hotkeys.subsystem(),
        ]
    }

    /// Fire-and-forget envelope on the notifications channel. No reply is
    /// expected or tracked.
    pub fn notify(&self, kind: &str, payload: Value) -> Result<RequestId> {
        let binding = self
            .channels
            .get(ChannelName::Notifications)
            .ok_or(CourierError::NotInitialized(ChannelName::Notifications))?;
        let id = RequestId(self.notify_seq.fetch_add(1, Ordering::Relaxed));
        binding.send(&RequestEnvelope::new(id, kind, payload))?;
        Ok(id)
    }

    /// Await `pending`, bounded by `reply_timeout_ms` when configured. On
    /// timeout the request is withdrawn from its registry.
    pub async fn resolve(&self, pending: PendingReply) -> Result<Delivery> {
        let Some(limit) = self.config.reply_timeout() else {
            return pending.await;
        };
        let id = pending.id();
        let channel = pending.channel();
        match tokio::time::timeout(limit, pending).await {
            Ok(outcome) => outcome,
            Err(_) => {
                if let Some(subsystem) = self
                    .subsystems()
                    .into_iter()
                    .find(|s| s.channel() == channel)
                {
                    subsystem.registry().cancel(id);
                }
                tracing::warn!(target: "courier", channel = %channel, id = %id, "Reply timed out");
                Err(CourierError::Timeout(id))
            }
        }
    }

    /// Total requests awaiting a reply across all subsystems.
    pub fn pending_total(&self) -> usize {
        self.subsystems().iter().map(|s| s.pending()).sum()
    }

    /// Drop requests older than `pending_max_age_ms`. Does nothing when the
    /// age is not configured.
    pub fn sweep_expired(&self) -> usize {
        let Some(max_age) = self.config.pending_max_age() else {
            return 0;
        };
        self.subsystems()
            .iter()
            .map(|s| s.registry().expire_older_than(max_age))
            .sum()
    }

    /// Logs every request still pending; they will never be answered.
    pub fn shutdown(&self) {
        tracing::info!(target: "courier", "Shutting down Courier...");
        for subsystem in self.subsystems() {
            let outstanding = subsystem.registry().pending_ids();
            if !outstanding.is_empty() {
                tracing::warn!(
                    target: "courier",
                    channel = %subsystem.channel(),
                    count = outstanding.len(),
                    ids = ?outstanding,
                    "Requests still pending at shutdown"
                );
            }
        }
        tracing::info!(target: "courier", "Courier shut down");
    }
}
