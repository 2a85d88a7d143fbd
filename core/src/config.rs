use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{CourierError, Result};

/// Runtime configuration for a [`Courier`](crate::Courier).
///
/// Neither timeout is set by default: requests wait for their reply
/// indefinitely and nothing is swept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CourierConfig {
    /// Owner name recorded on every channel binding (diagnostics only)
    pub owner: String,
    /// Applied by `Courier::resolve`; `None` waits forever
    pub reply_timeout_ms: Option<u64>,
    /// Age after which `Courier::sweep_expired` drops a pending request
    pub pending_max_age_ms: Option<u64>,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            owner: "renderer".to_string(),
            reply_timeout_ms: None,
            pending_max_age_ms: None,
            log_filter: "info".to_string(),
        }
    }
}

impl CourierConfig {
    /// Defaults overlaid with `COURIER_*` environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            owner: std::env::var("COURIER_OWNER")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(default.owner),
            reply_timeout_ms: std::env::var("COURIER_REPLY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0),
            pending_max_age_ms: std::env::var("COURIER_PENDING_MAX_AGE_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0),
            log_filter: std::env::var("COURIER_LOG")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(default.log_filter),
        }
    }

    /// Load from a TOML file (path via `COURIER_CONFIG` or `./courier.toml`)
    /// on top of [`from_env`](Self::from_env). A missing file is not an error.
    pub fn load() -> Result<Self> {
        let path = std::env::var("COURIER_CONFIG").unwrap_or_else(|_| "courier.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let base = Self::from_env();
        if !path.exists() {
            tracing::debug!(target: "courier", path = %path.display(), "No TOML config found; using defaults/env");
            return Ok(base);
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw, base)
    }

    /// Overlay the keys present in `raw` onto `base`.
    pub fn from_toml_str(raw: &str, base: Self) -> Result<Self> {
        let file: CourierToml =
            toml::from_str(raw).map_err(|e| CourierError::Config(e.to_string()))?;
        Ok(file.overlay(base))
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    pub fn pending_max_age(&self) -> Option<Duration> {
        self.pending_max_age_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CourierToml {
    owner: Option<String>,
    reply_timeout_ms: Option<u64>,
    pending_max_age_ms: Option<u64>,
    log_filter: Option<String>,
}

impl CourierToml {
    fn overlay(self, mut base: CourierConfig) -> CourierConfig {
        if let Some(owner) = self.owner {
            base.owner = owner;
        }
        if let Some(ms) = self.reply_timeout_ms {
            base.reply_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(ms) = self.pending_max_age_ms {
            base.pending_max_age_ms = (ms > 0).then_some(ms);
        }
        if let Some(filter) = self.log_filter {
            base.log_filter = filter;
        }
        base
    }
}
