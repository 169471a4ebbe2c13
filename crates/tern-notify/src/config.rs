use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;
use tern_model::JobPhase;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// URL every matching status is POSTed to.
    pub endpoint: String,
    /// Phases worth a notification; finished jobs only by default.
    #[serde(default = "default_phases")]
    pub phases: Vec<JobPhase>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra request headers, e.g. an authorization token.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_phases() -> Vec<JobPhase> {
    vec![JobPhase::Done]
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl WebhookConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            phases: default_phases(),
            timeout_ms: default_timeout_ms(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_phases(mut self, phases: impl IntoIterator<Item = JobPhase>) -> Self {
        self.phases = phases.into_iter().collect();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
