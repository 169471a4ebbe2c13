use tern_core::ExecutorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("workload not found: {0}")]
    NotFound(String),
    #[error("workload already exists: {0}")]
    AlreadyExists(String),
    #[error("conflicting update of {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("cluster connection lost: {0}")]
    Disconnected(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ClusterError {
    fn from(e: std::io::Error) -> Self {
        ClusterError::Io(e.to_string())
    }
}

impl From<ClusterError> for ExecutorError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::NotFound(name) => ExecutorError::NotFound(name),
            ClusterError::Rejected(reason) => ExecutorError::Scheduling(reason),
            ClusterError::AlreadyExists(name) => {
                ExecutorError::Scheduling(format!("workload {name} already exists"))
            }
            other => ExecutorError::Cluster(other.to_string()),
        }
    }
}

/// Rejected executor configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("total timeout must not be shorter than the preparation timeout")]
    TotalBelowPreparation,
    #[error("cannot open event trace log {path}: {reason}")]
    TraceLog { path: String, reason: String },
}

/// The task supervisor refused a submission.
#[derive(Error, Debug)]
#[error("cannot submit task {task}: {reason}")]
pub struct SupervisorError {
    pub task: String,
    pub reason: String,
}

impl From<SupervisorError> for ClusterError {
    fn from(e: SupervisorError) -> Self {
        ClusterError::Rejected(e.to_string())
    }
}
