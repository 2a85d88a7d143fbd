use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::ChannelName;

/// Identifier of one request on a correlation registry.
///
/// Unique among the ids currently pending on the registry that issued it.
/// Values may be reused once the original request has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        RequestId(value)
    }
}

/// Outgoing request sent to the counterpart process.
///
/// The envelope is immutable once built. The reply continuation is not part
/// of the envelope; it lives in the [`CorrelationRegistry`](crate::CorrelationRegistry)
/// entry keyed by `id` and is surfaced to the caller as a
/// [`PendingReply`](crate::PendingReply).
///
/// # Examples
///
/// ```
/// use courier_core::{RequestEnvelope, RequestId};
/// use serde_json::json;
///
/// let env = RequestEnvelope::new(RequestId(7), "get-me", json!({}));
/// let wire = serde_json::to_value(&env).unwrap();
/// assert_eq!(wire["id"], 7);
/// assert_eq!(wire["type"], "get-me");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    id: RequestId,
    #[serde(rename = "type")]
    request_type: String,
    #[serde(default)]
    payload: Value,
}

impl RequestEnvelope {
    pub fn new(id: RequestId, request_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id,
            request_type: request_type.into(),
            payload,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Builds a successful reply correlated to this request.
    pub fn reply(&self, data: Value) -> ReplyEnvelope {
        ReplyEnvelope::ok(self.id, self.request_type.clone(), data)
    }

    /// Builds an error reply correlated to this request.
    pub fn reply_error(&self, error: Value) -> ReplyEnvelope {
        ReplyEnvelope::failed(self.id, self.request_type.clone(), error)
    }
}

/// Reply sent back by the counterpart.
///
/// Routing is by `id` only. `reply_type` echoes the request type and is kept
/// for diagnostics. A reply carrying `error` is delivered exactly like one
/// carrying `data`; telling them apart is the domain caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub id: RequestId,
    #[serde(rename = "type", default)]
    pub reply_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ReplyEnvelope {
    pub fn ok(id: RequestId, reply_type: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            reply_type: reply_type.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(id: RequestId, reply_type: impl Into<String>, error: Value) -> Self {
        Self {
            id,
            reply_type: reply_type.into(),
            data: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Splits the reply into domain success or domain error.
    ///
    /// A reply with neither field resolves to `Ok(Value::Null)`.
    pub fn into_result(self) -> std::result::Result<Value, Value> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

/// Raw context of one inbound envelope, passed alongside it to the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub channel: ChannelName,
    pub received_at_ms: i64,
}

impl InboundEvent {
    pub fn now(channel: ChannelName) -> Self {
        Self {
            channel,
            received_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// What a pending request resolves to: the inbound event context and the
/// matched reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: InboundEvent,
    pub reply: ReplyEnvelope,
}
