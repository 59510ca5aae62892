//! Bridge tuning knobs.
//!
//! Defaults match the run-loop bridge's historical constants: a 5 second
//! bounded wait in the performer loop and workers reclaimed after 60 seconds
//! idle. Values can come from JSON and be overridden from the environment.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`BridgeConfig::performer_wait_limit_ms`].
pub const ENV_PERFORMER_WAIT_MS: &str = "RUNLOOP_BRIDGE_PERFORMER_WAIT_MS";
/// Environment variable overriding [`BridgeConfig::worker_keep_alive_secs`].
pub const ENV_WORKER_KEEP_ALIVE_SECS: &str = "RUNLOOP_BRIDGE_WORKER_KEEP_ALIVE_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long the performer loop waits for a nested invocation before it
    /// gives up on the offloaded call.
    pub performer_wait_limit_ms: u64,
    /// Idle time after which a performer worker thread is reclaimed.
    pub worker_keep_alive_secs: u64,
    /// Worker threads are named `<worker_thread_name>-<n>`.
    pub worker_thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            performer_wait_limit_ms: 5_000,
            worker_keep_alive_secs: 60,
            worker_thread_name: "selector-performer".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid bridge config JSON")?;
        Ok(config.normalized())
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Unparseable values are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = parse_override::<u64>(&lookup, ENV_PERFORMER_WAIT_MS) {
            self.performer_wait_limit_ms = ms;
        }
        if let Some(secs) = parse_override::<u64>(&lookup, ENV_WORKER_KEEP_ALIVE_SECS) {
            self.worker_keep_alive_secs = secs;
        }
        self.normalized()
    }

    pub fn performer_wait_limit(&self) -> Duration {
        Duration::from_millis(self.performer_wait_limit_ms)
    }

    pub fn worker_keep_alive(&self) -> Duration {
        Duration::from_secs(self.worker_keep_alive_secs)
    }

    fn normalized(mut self) -> Self {
        if self.worker_thread_name.is_empty() {
            self.worker_thread_name = Self::default().worker_thread_name;
        }
        self
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.performer_wait_limit(), Duration::from_secs(5));
        assert_eq!(config.worker_keep_alive(), Duration::from_secs(60));
        assert_eq!(config.worker_thread_name, "selector-performer");
    }

    #[test]
    fn test_from_json_partial() {
        let config = BridgeConfig::from_json(r#"{"performer_wait_limit_ms": 250}"#).unwrap();
        assert_eq!(config.performer_wait_limit(), Duration::from_millis(250));
        assert_eq!(config.worker_keep_alive_secs, 60);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = BridgeConfig::from_json("{not json").unwrap_err();
        assert!(err.to_string().contains("invalid bridge config JSON"));
    }

    #[test]
    fn test_empty_worker_name_falls_back() {
        let config = BridgeConfig::from_json(r#"{"worker_thread_name": ""}"#).unwrap();
        assert_eq!(config.worker_thread_name, "selector-performer");
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::default().with_overrides(|key| match key {
            ENV_PERFORMER_WAIT_MS => Some("100".to_string()),
            ENV_WORKER_KEEP_ALIVE_SECS => Some(" 5 ".to_string()),
            _ => None,
        });
        assert_eq!(config.performer_wait_limit_ms, 100);
        assert_eq!(config.worker_keep_alive_secs, 5);

        let config = BridgeConfig::default().with_overrides(|key| match key {
            ENV_WORKER_KEEP_ALIVE_SECS => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config.worker_keep_alive_secs, 60);
    }
}
