use thiserror::Error;

/// Log store misuse and I/O failures.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("log not found: {0}")]
    NotFound(String),
    #[error("log already open: {0}")]
    AlreadyOpen(String),
    #[error("log closed: {0}")]
    Closed(String),
    #[error("invalid log id: {0}")]
    InvalidId(String),
    #[error("log io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogError {
    /// A session with this id already exists, open or finished.
    pub fn is_taken(&self) -> bool {
        matches!(self, LogError::AlreadyOpen(_) | LogError::Closed(_))
    }
}

/// Job store collaborator failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failures of the component that schedules workloads.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("scheduling failed: {0}")]
    Scheduling(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("invalid spec: {0}")]
    InvalidSpec(String),
    #[error("cluster error: {0}")]
    Cluster(String),
}

/// Failure of an external notification.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Failures that never block a job and are handed to the error callback.
#[derive(Debug, Error)]
pub enum ReportedError {
    #[error("cannot store job {job}: {reason}")]
    Persistence { job: String, reason: String },
    #[error("cannot notify about job {job}: {reason}")]
    Notification { job: String, reason: String },
    #[error("watch disconnected {attempts} times in a row: {reason}")]
    WatchDisconnected { attempts: u32, reason: String },
    #[error("log forwarding for {job} failed: {reason}")]
    LogForwarding { job: String, reason: String },
}

/// Errors returned by the orchestration service to its callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<LogError> for ServiceError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::NotFound(id) => ServiceError::NotFound(format!("logs of {id}")),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(name) => ServiceError::NotFound(name),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ExecutorError> for ServiceError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::NotFound(name) => ServiceError::NotFound(name),
            ExecutorError::InvalidSpec(msg) => ServiceError::InvalidArgument(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_mapping() {
        assert!(matches!(
            ServiceError::from(LogError::NotFound("a".into())),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            ServiceError::from(LogError::Closed("a".into())),
            ServiceError::Internal(_)
        ));
        assert!(matches!(
            ServiceError::from(ExecutorError::InvalidSpec("x".into())),
            ServiceError::InvalidArgument(_)
        ));
        assert!(matches!(
            ServiceError::from(ExecutorError::Scheduling("x".into())),
            ServiceError::Internal(_)
        ));
    }
}
