use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Coarse-grained lifecycle state of a job.
///
/// Phases only advance; `Cleanup` is the housekeeping phase that follows `Done`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum JobPhase {
    /// The phase could not be derived from the workload state.
    #[default]
    Unknown,
    /// The workload is scheduled and its init containers are running.
    Preparing,
    /// Init containers finished; main containers are being started.
    Starting,
    /// Main containers are running.
    Running,
    /// The job finished; see `JobConditions` for the outcome.
    Done,
    /// The workload is being removed from the cluster.
    Cleanup,
}

impl JobPhase {
    pub const ALL: [JobPhase; 6] = [
        JobPhase::Unknown,
        JobPhase::Preparing,
        JobPhase::Starting,
        JobPhase::Running,
        JobPhase::Done,
        JobPhase::Cleanup,
    ];

    /// Returns `true` once the job will not run any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Cleanup)
    }

    /// Returns `true` while the workload may still produce output.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobPhase::Preparing | JobPhase::Starting | JobPhase::Running
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Unknown => "unknown",
            JobPhase::Preparing => "preparing",
            JobPhase::Starting => "starting",
            JobPhase::Running => "running",
            JobPhase::Done => "done",
            JobPhase::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        JobPhase::ALL
            .into_iter()
            .find(|p| p.as_str() == norm)
            .ok_or_else(|| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_active() {
        assert!(JobPhase::Done.is_terminal());
        assert!(JobPhase::Cleanup.is_terminal());
        assert!(!JobPhase::Running.is_terminal());

        assert!(JobPhase::Preparing.is_active());
        assert!(JobPhase::Starting.is_active());
        assert!(JobPhase::Running.is_active());
        assert!(!JobPhase::Unknown.is_active());
        assert!(!JobPhase::Done.is_active());
    }

    #[test]
    fn phases_are_ordered() {
        assert!(JobPhase::Preparing < JobPhase::Running);
        assert!(JobPhase::Done < JobPhase::Cleanup);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("DONE".parse::<JobPhase>(), Ok(JobPhase::Done));
        assert_eq!(" running ".parse::<JobPhase>(), Ok(JobPhase::Running));
        assert!("blabla".parse::<JobPhase>().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&JobPhase::Preparing).unwrap();
        assert_eq!(json, r#""preparing""#);

        let back: JobPhase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobPhase::Preparing);
    }
}
