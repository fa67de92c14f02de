//! Timeout and polling configuration for cloud operations
//!
//! These settings can be stored per profile. Resource level `timeouts`
//! attributes still win over anything configured here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-profile overrides for operation timeouts and poll cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutsConfig {
    /// Upper bound for create operations, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_secs: Option<u64>,

    /// Upper bound for update operations, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_secs: Option<u64>,

    /// Upper bound for delete operations, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_secs: Option<u64>,

    /// Caps every wait delay and poll interval, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// HTTP request timeout, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            create_secs: None,
            update_secs: None,
            delete_secs: None,
            poll_interval_ms: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl TimeoutsConfig {
    pub fn create(&self) -> Option<Duration> {
        self.create_secs.map(Duration::from_secs)
    }

    pub fn update(&self) -> Option<Duration> {
        self.update_secs.map(Duration::from_secs)
    }

    pub fn delete(&self) -> Option<Duration> {
        self.delete_secs.map(Duration::from_secs)
    }

    pub fn poll_cap(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_defaults_from_empty_table() {
        let cfg: TimeoutsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.create(), None);
        assert_eq!(cfg.poll_cap(), None);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_timeouts_overrides() {
        let cfg: TimeoutsConfig = toml::from_str(
            r#"
create_secs = 1800
delete_secs = 600
poll_interval_ms = 50
"#,
        )
        .unwrap();
        assert_eq!(cfg.create(), Some(Duration::from_secs(1800)));
        assert_eq!(cfg.update(), None);
        assert_eq!(cfg.delete(), Some(Duration::from_secs(600)));
        assert_eq!(cfg.poll_cap(), Some(Duration::from_millis(50)));
    }
}
