use std::sync::Arc;

use async_trait::async_trait;
use tern_core::{JobService, ListenOptions, Subscription};
use tern_model::{FilterExpression, JobPage, JobQuery, JobSpec, JobStatus};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::ApiError;
use crate::handler::{ApiHandler, ListenStream};

/// Adapter that bridges `JobService` to `ApiHandler`.
///
/// This is a ready-to-use implementation that directly delegates to `JobService`.
pub struct ServiceAdapter {
    service: Arc<JobService>,
}

impl ServiceAdapter {
    pub fn new(service: Arc<JobService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ApiHandler for ServiceAdapter {
    #[instrument(level = "debug", skip_all, fields(job = %spec.job))]
    async fn start_job(&self, spec: JobSpec) -> Result<JobStatus, ApiError> {
        self.service.start_job(spec).await.map_err(ApiError::from)
    }

    async fn stop_job(&self, name: &str) -> Result<(), ApiError> {
        self.service.stop_job(name).await.map_err(ApiError::from)
    }

    async fn get_job(&self, name: &str) -> Result<JobStatus, ApiError> {
        self.service.get_job(name).await.map_err(ApiError::from)
    }

    async fn list_jobs(&self, query: JobQuery) -> Result<JobPage<JobStatus>, ApiError> {
        self.service.list_jobs(&query).await.map_err(ApiError::from)
    }

    async fn listen(
        &self,
        name: &str,
        opts: ListenOptions,
        cancel: CancellationToken,
    ) -> Result<ListenStream, ApiError> {
        self.service
            .listen(name, opts, cancel)
            .await
            .map_err(ApiError::from)
    }

    fn subscribe(&self, filter: Vec<FilterExpression>) -> Subscription {
        self.service.subscribe(filter)
    }
}
