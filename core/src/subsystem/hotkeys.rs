use serde_json::{json, Value};

use super::SubsystemClient;
use crate::channel::{ChannelName, ChannelRegistry};
use crate::correlation::PendingReply;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeyRequest {
    GetCurrentShortcuts,
    UpdateShortcuts,
}

impl HotkeyRequest {
    pub fn as_str(self) -> &'static str {
        match self {
            HotkeyRequest::GetCurrentShortcuts => "get-current-shortcuts",
            HotkeyRequest::UpdateShortcuts => "update-shortcuts",
        }
    }
}

/// Global shortcut bindings owned by the counterpart process.
pub struct HotkeyClient {
    inner: SubsystemClient,
}

impl HotkeyClient {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            inner: SubsystemClient::new(ChannelName::Hotkeys, owner),
        }
    }

    pub fn init(&self, channels: &ChannelRegistry) -> Result<()> {
        self.inner.init(channels)
    }

    pub fn subsystem(&self) -> &SubsystemClient {
        &self.inner
    }

    pub fn get_current_shortcuts(&self) -> Result<PendingReply> {
        self.inner
            .request(HotkeyRequest::GetCurrentShortcuts.as_str(), json!({}))
    }

    /// `shortcuts` maps action names to accelerator strings.
    pub fn update_shortcuts(&self, shortcuts: Value) -> Result<PendingReply> {
        self.inner.request(
            HotkeyRequest::UpdateShortcuts.as_str(),
            json!({ "shortcuts": shortcuts }),
        )
    }
}
