/// Correlation registry
///
/// Tracks every request a subsystem has sent and not yet seen answered.
/// Replies arrive out of band and in any order; each one is matched to its
/// request purely by id, the entry is removed, and the waiting
/// [`PendingReply`] is resolved. Removal happens before resolution, so a
/// duplicate reply finds nothing and is dropped.
///
/// There is no implicit timeout. A request the counterpart never answers
/// stays pending until it is explicitly cancelled or swept with
/// [`CorrelationRegistry::expire_older_than`].
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::channel::{ChannelBinding, ChannelName};
use crate::envelope::{Delivery, InboundEvent, ReplyEnvelope, RequestEnvelope, RequestId};
use crate::transport::InboundHandler;
use crate::{CourierError, Result};

/// Called with the originating request type for every matched reply.
pub type ReplyObserver = Arc<dyn Fn(&str, &ReplyEnvelope) + Send + Sync>;

struct PendingEntry {
    request_type: String,
    dispatched_at: Instant,
    completion: oneshot::Sender<Result<Delivery>>,
}

/// Pending-request map of one subsystem: request id -> waiting caller.
pub struct CorrelationRegistry {
    channel: ChannelName,
    next_id: AtomicU64,
    pending: DashMap<RequestId, PendingEntry>,
    observer: Option<ReplyObserver>,
}

impl CorrelationRegistry {
    pub fn new(channel: ChannelName) -> Self {
        Self {
            channel,
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            observer: None,
        }
    }

    pub fn with_observer(channel: ChannelName, observer: ReplyObserver) -> Self {
        Self {
            observer: Some(observer),
            ..Self::new(channel)
        }
    }

    pub fn channel(&self) -> ChannelName {
        self.channel
    }

    /// Register a new request and send it through `binding`.
    ///
    /// The entry is inserted before the send. If the transport refuses the
    /// envelope the entry is removed again and the error returned. A binding
    /// that hands its replies to anything but this registry is refused with
    /// [`CourierError::Misrouted`]: the reply could never be matched.
    pub fn dispatch(
        &self,
        binding: &ChannelBinding,
        request_type: &str,
        payload: Value,
    ) -> Result<PendingReply> {
        if binding.name() != self.channel || !binding.routes_to(self) {
            warn!(
                target: "correlation",
                channel = %self.channel,
                binding = %binding.name(),
                bound_by = %binding.owner(),
                request_type = %request_type,
                "Binding does not route replies here; request refused"
            );
            return Err(CourierError::Misrouted(self.channel));
        }

        let (tx, rx) = oneshot::channel();
        let id = self.insert(PendingEntry {
            request_type: request_type.to_string(),
            dispatched_at: Instant::now(),
            completion: tx,
        });
        let envelope = RequestEnvelope::new(id, request_type, payload);

        if let Err(err) = binding.send(&envelope) {
            self.pending.remove(&id);
            warn!(
                target: "correlation",
                channel = %self.channel,
                id = %id,
                request_type = %request_type,
                error = %err,
                "Send failed; request withdrawn"
            );
            return Err(err);
        }

        debug!(
            target: "correlation",
            channel = %self.channel,
            id = %id,
            request_type = %request_type,
            pending = self.pending.len(),
            "Request dispatched"
        );

        Ok(PendingReply {
            channel: self.channel,
            envelope,
            rx,
        })
    }

    // Ids come from a counter; values still pending are skipped, which only
    // matters after the counter wraps.
    fn insert(&self, entry: PendingEntry) -> RequestId {
        loop {
            let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
            if raw == 0 {
                continue;
            }
            let id = RequestId(raw);
            if let Entry::Vacant(slot) = self.pending.entry(id) {
                slot.insert(entry);
                return id;
            }
        }
    }

    /// Match an inbound reply to its request and resolve it.
    ///
    /// Unknown ids (duplicates, stale replies, replies to requests never
    /// made) are logged and dropped.
    pub fn on_reply(&self, event: InboundEvent, reply: ReplyEnvelope) {
        let Some((id, entry)) = self.pending.remove(&reply.id) else {
            warn!(
                target: "correlation",
                channel = %self.channel,
                id = %reply.id,
                reply_type = %reply.reply_type,
                "Dropping reply for unknown request"
            );
            return;
        };

        debug!(
            target: "correlation",
            channel = %self.channel,
            id = %id,
            request_type = %entry.request_type,
            is_error = reply.is_error(),
            latency_ms = entry.dispatched_at.elapsed().as_millis() as u64,
            "Reply matched"
        );
        if !reply.reply_type.is_empty() && reply.reply_type != entry.request_type {
            debug!(
                target: "correlation",
                id = %id,
                request_type = %entry.request_type,
                reply_type = %reply.reply_type,
                "Reply type differs from request type"
            );
        }

        if let Some(observer) = &self.observer {
            observer(&entry.request_type, &reply);
        }

        if entry.completion.send(Ok(Delivery { event, reply })).is_err() {
            debug!(target: "correlation", channel = %self.channel, id = %id, "Caller gone; reply discarded");
        }
    }

    /// Withdraw a pending request. Its waiter resolves with
    /// [`CourierError::Cancelled`]; a later reply for it counts as unknown.
    pub fn cancel(&self, id: RequestId) -> bool {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                debug!(target: "correlation", channel = %self.channel, id = %id, "Request cancelled");
                let _ = entry.completion.send(Err(CourierError::Cancelled(id)));
                true
            }
            None => false,
        }
    }

    /// Remove every request pending for at least `max_age`; their waiters
    /// resolve with [`CourierError::Expired`]. Returns how many were removed.
    pub fn expire_older_than(&self, max_age: Duration) -> usize {
        let stale: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|e| e.value().dispatched_at.elapsed() >= max_age)
            .map(|e| *e.key())
            .collect();

        let mut expired = 0;
        for id in stale {
            if let Some((_, entry)) = self
                .pending
                .remove_if(&id, |_, e| e.dispatched_at.elapsed() >= max_age)
            {
                warn!(
                    target: "correlation",
                    channel = %self.channel,
                    id = %id,
                    request_type = %entry.request_type,
                    "Request expired without reply"
                );
                let _ = entry.completion.send(Err(CourierError::Expired(id)));
                expired += 1;
            }
        }
        expired
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Currently pending ids, ascending.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.pending.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }
}

impl InboundHandler for CorrelationRegistry {
    fn handle(&self, event: InboundEvent, reply: ReplyEnvelope) {
        self.on_reply(event, reply);
    }
}

/// Handle to one in-flight request.
///
/// Awaiting it yields the matched [`Delivery`]. Dropping it does not
/// withdraw the request; the registry entry stays until answered.
#[must_use = "the reply is only observable by awaiting the PendingReply"]
pub struct PendingReply {
    channel: ChannelName,
    envelope: RequestEnvelope,
    rx: oneshot::Receiver<Result<Delivery>>,
}

impl PendingReply {
    pub fn id(&self) -> RequestId {
        self.envelope.id()
    }

    pub fn request_type(&self) -> &str {
        self.envelope.request_type()
    }

    pub fn channel(&self) -> ChannelName {
        self.channel
    }

    pub fn envelope(&self) -> &RequestEnvelope {
        &self.envelope
    }
}

impl Future for PendingReply {
    type Output = Result<Delivery>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let channel = self.channel;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Registry dropped with the request still pending
            Poll::Ready(Err(_)) => Poll::Ready(Err(CourierError::ChannelClosed(channel))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("channel", &self.channel)
            .field("envelope", &self.envelope)
            .finish()
    }
}
