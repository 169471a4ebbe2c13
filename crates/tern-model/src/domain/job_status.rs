use serde::{Deserialize, Serialize};

use crate::{JobMetadata, JobPhase, JobResult};

/// Outcome of a job; meaningful once the phase is `Done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConditions {
    pub success: bool,
    pub failure_count: u32,
}

/// Identity and current state of one scheduled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Unique job name, immutable once assigned.
    pub name: String,
    pub phase: JobPhase,
    pub conditions: JobConditions,
    pub metadata: JobMetadata,
    #[serde(default)]
    pub results: Vec<JobResult>,
    /// Failure explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl JobStatus {
    pub fn new(name: impl Into<String>, metadata: JobMetadata) -> Self {
        Self {
            name: name.into(),
            phase: JobPhase::Unknown,
            conditions: JobConditions::default(),
            metadata,
            results: Vec::new(),
            details: None,
        }
    }

    pub fn with_phase(mut self, phase: JobPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Terminal `Done` status for a job that never reached the cluster.
    pub fn failed(name: impl Into<String>, metadata: JobMetadata, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: JobPhase::Done,
            conditions: JobConditions {
                success: false,
                failure_count: 1,
            },
            metadata,
            results: Vec::new(),
            details: Some(details.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Trigger;

    #[test]
    fn failed_status_is_terminal() {
        let st = JobStatus::failed("job.0", JobMetadata::new("bob", Trigger::Manual), "boom");
        assert_eq!(st.phase, JobPhase::Done);
        assert!(!st.conditions.success);
        assert_eq!(st.conditions.failure_count, 1);
        assert_eq!(st.details.as_deref(), Some("boom"));
    }

    #[test]
    fn serde_roundtrip() {
        let mut st = JobStatus::new("job.1", JobMetadata::new("bob", Trigger::Push))
            .with_phase(JobPhase::Running);
        st.results.push(JobResult::new("url", "https://example.com"));

        let json = serde_json::to_string(&st).unwrap();
        assert!(json.contains(r#""failureCount":0"#));
        assert!(!json.contains("details"));

        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, st.name);
        assert_eq!(back.phase, JobPhase::Running);
        assert_eq!(back.results, st.results);
    }
}
