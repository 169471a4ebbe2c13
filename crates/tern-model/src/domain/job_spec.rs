use serde::{Deserialize, Serialize};

use crate::{JobMetadata, SpecError, WorkloadSpec};

/// A request to run one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Name of the job definition within its repository (e.g. `build`).
    #[serde(default)]
    pub job: String,
    pub metadata: JobMetadata,
    pub workload: WorkloadSpec,
    /// Only the newest job holding a mutex keeps running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutex: Option<String>,
    /// Container restarts tolerated before the job counts as failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<u32>,
}

impl JobSpec {
    pub fn new(job: impl Into<String>, metadata: JobMetadata, workload: WorkloadSpec) -> Self {
        Self {
            job: job.into(),
            metadata,
            workload,
            mutex: None,
            backoff_limit: None,
        }
    }

    pub fn with_mutex(mut self, mutex: impl Into<String>) -> Self {
        self.mutex = Some(mutex.into());
        self
    }

    pub fn with_backoff_limit(mut self, limit: u32) -> Self {
        self.backoff_limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if let Some(m) = &self.mutex
            && m.trim().is_empty()
        {
            return Err(SpecError::Invalid("mutex cannot be empty".into()));
        }
        self.workload.validate()
    }
}
