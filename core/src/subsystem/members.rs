// Members subsystem, with a local mirror of the signed-in member
use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use tracing::trace;

use super::SubsystemClient;
use crate::channel::{ChannelName, ChannelRegistry};
use crate::correlation::PendingReply;
use crate::envelope::ReplyEnvelope;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRequest {
    GetMe,
    LoadMe,
    GetMember,
}

impl MemberRequest {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberRequest::GetMe => "get-me",
            MemberRequest::LoadMe => "load-me",
            MemberRequest::GetMember => "get-member",
        }
    }

    fn refreshes_me(request_type: &str) -> bool {
        request_type == MemberRequest::GetMe.as_str()
            || request_type == MemberRequest::LoadMe.as_str()
    }
}

/// Member lookups plus a best-effort copy of the current member.
///
/// The copy is overwritten by every successful `get-me` / `load-me` reply,
/// whether or not the caller still awaits it. It has no staleness bound and
/// must not be relied on where correctness matters.
pub struct MemberClient {
    inner: SubsystemClient,
    me: Arc<RwLock<Option<Value>>>,
}

impl MemberClient {
    pub fn new(owner: impl Into<String>) -> Self {
        let me: Arc<RwLock<Option<Value>>> = Arc::new(RwLock::new(None));
        let mirror = Arc::clone(&me);
        let observer = Arc::new(move |request_type: &str, reply: &ReplyEnvelope| {
            if !MemberRequest::refreshes_me(request_type) || reply.is_error() {
                return;
            }
            let Some(data) = reply.data.clone() else {
                return;
            };
            trace!(target: "subsystem", id = %reply.id, "Refreshing cached member");
            let mut slot = match mirror.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(data);
        });

        Self {
            inner: SubsystemClient::with_observer(ChannelName::Members, owner, observer),
            me,
        }
    }

    pub fn init(&self, channels: &ChannelRegistry) -> Result<()> {
        self.inner.init(channels)
    }

    pub fn subsystem(&self) -> &SubsystemClient {
        &self.inner
    }

    pub fn get_me(&self) -> Result<PendingReply> {
        self.inner.request(MemberRequest::GetMe.as_str(), json!({}))
    }

    pub fn load_me(&self) -> Result<PendingReply> {
        self.inner.request(MemberRequest::LoadMe.as_str(), json!({}))
    }

    pub fn get_member(&self, member_id: &str) -> Result<PendingReply> {
        self.inner.request(
            MemberRequest::GetMember.as_str(),
            json!({ "memberId": member_id }),
        )
    }

    /// Last observed current-member record, if any.
    pub fn me(&self) -> Option<Value> {
        match self.me.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn me_username(&self) -> Option<String> {
        self.me()
            .and_then(|me| me.get("username").and_then(Value::as_str).map(str::to_string))
    }
}
