use async_trait::async_trait;
use tern_core::{ListenEvent, ListenOptions, ServiceError, Subscription};
use tern_model::{FilterExpression, JobPage, JobQuery, JobSpec, JobStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Items of one job listener; an `Err` is always the last item.
pub type ListenStream = mpsc::Receiver<Result<ListenEvent, ServiceError>>;

/// Job orchestration API handler.
///
/// This trait abstracts the backend implementation, allowing users to:
/// - Use the provided `ServiceAdapter`
/// - Implement custom handlers with additional logic (auth, rate limiting, etc.)
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Submit a job; returns its first status.
    async fn start_job(&self, spec: JobSpec) -> Result<JobStatus, ApiError>;

    /// Request cancellation of an active job.
    async fn stop_job(&self, name: &str) -> Result<(), ApiError>;

    async fn get_job(&self, name: &str) -> Result<JobStatus, ApiError>;

    async fn list_jobs(&self, query: JobQuery) -> Result<JobPage<JobStatus>, ApiError>;

    /// Follow one job until its stream ends or `cancel` fires.
    async fn listen(
        &self,
        name: &str,
        opts: ListenOptions,
        cancel: CancellationToken,
    ) -> Result<ListenStream, ApiError>;

    /// Live status updates of every job matching `filter`.
    fn subscribe(&self, filter: Vec<FilterExpression>) -> Subscription;
}
