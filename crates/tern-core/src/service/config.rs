use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Orchestration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Restarts tolerated when a job does not set its own limit.
    pub default_backoff_limit: u32,
    /// Events buffered per listener before the producer waits.
    pub listen_buffer: usize,
    /// How long a cleaned-up job's forwarder may keep draining output
    /// before its log is closed anyway.
    pub cleanup_grace_ms: u64,
}

impl ServiceConfig {
    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_backoff_limit: 0,
            listen_buffer: 64,
            cleanup_grace_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: ServiceConfig = serde_json::from_str(r#"{"defaultBackoffLimit": 3}"#).unwrap();
        assert_eq!(cfg.default_backoff_limit, 3);
        assert_eq!(cfg.listen_buffer, 64);
        assert_eq!(cfg.cleanup_grace(), Duration::from_secs(5));
    }
}
