use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskvisor::BackoffPolicy;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorConfig {
    pub namespace: String,
    /// Prefix of every label and annotation the executor owns.
    pub label_prefix: String,
    /// Longest a job may stay in `Preparing`.
    pub preparation_timeout_ms: u64,
    /// Longest a job may run overall.
    pub total_timeout_ms: u64,
    pub reconnect_first_ms: u64,
    pub reconnect_max_ms: u64,
    /// Consecutive watch failures before the error callback hears about it.
    pub reconnect_escalate_after: u32,
    /// JSON-lines trace of every computed status; `-` is stdout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_trace_log: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            label_prefix: "tern.dev/".into(),
            preparation_timeout_ms: 10 * 60 * 1000,
            total_timeout_ms: 60 * 60 * 1000,
            reconnect_first_ms: 500,
            reconnect_max_ms: 30_000,
            reconnect_escalate_after: 5,
            event_trace_log: None,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preparation_timeout_ms == 0 {
            return Err(ConfigError::Zero("preparationTimeoutMs"));
        }
        if self.total_timeout_ms == 0 {
            return Err(ConfigError::Zero("totalTimeoutMs"));
        }
        if self.total_timeout_ms < self.preparation_timeout_ms {
            return Err(ConfigError::TotalBelowPreparation);
        }
        if self.reconnect_first_ms == 0 {
            return Err(ConfigError::Zero("reconnectFirstMs"));
        }
        if self.reconnect_escalate_after == 0 {
            return Err(ConfigError::Zero("reconnectEscalateAfter"));
        }
        Ok(())
    }

    pub fn preparation_timeout(&self) -> Duration {
        Duration::from_millis(self.preparation_timeout_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    /// Housekeeping runs twice per preparation timeout.
    pub fn housekeeping_interval(&self) -> Duration {
        self.preparation_timeout() / 2
    }

    /// Backoff between watch sessions: doubles from the first delay up to the maximum.
    pub fn reconnect_backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(self.reconnect_first_ms),
            max: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_first_ms)),
            factor: 2.0,
            ..BackoffPolicy::default()
        }
    }
}
