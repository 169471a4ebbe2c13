//! Seam between orchestration and the component that runs workloads.

use async_trait::async_trait;
use tern_model::{JobMetadata, JobResult, JobStatus, KeyValue, WorkloadSpec};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;

/// Receives every status transition the executor observes.
///
/// Delivery is at-least-once: the same transition may arrive more than once.
pub trait OnTransition: Send + Sync + 'static {
    fn on_transition(&self, status: JobStatus);
}

impl OnTransition for mpsc::UnboundedSender<JobStatus> {
    fn on_transition(&self, status: JobStatus) {
        let _ = self.send(status);
    }
}

/// Options applied when scheduling a workload.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub name: Option<String>,
    /// Container restarts tolerated before the job fails; 0 tolerates none.
    pub backoff_limit: u32,
    /// Mirrored onto the workload so metadata survives a restart.
    pub annotations: Vec<KeyValue>,
    pub mutex: Option<String>,
    /// Containers whose output is prefixed with `[<name>] `.
    pub sidecars: Vec<String>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_backoff(mut self, limit: u32) -> Self {
        self.backoff_limit = limit;
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.push(KeyValue::new(key, value));
        self
    }

    pub fn with_annotations<I>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.annotations.extend(annotations);
        self
    }

    pub fn with_mutex(mut self, mutex: impl Into<String>) -> Self {
        self.mutex = Some(mutex.into());
        self
    }

    pub fn with_sidecars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sidecars = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Schedules workloads and reports on them.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    /// Submit a workload. Fails with `Scheduling` when the platform rejects it.
    async fn start(
        &self,
        spec: WorkloadSpec,
        metadata: JobMetadata,
        opts: StartOptions,
    ) -> Result<JobStatus, ExecutorError>;

    /// Request cancellation; does not wait for the workload to finish.
    async fn stop(&self, name: &str, reason: &str) -> Result<(), ExecutorError>;

    /// Raw output lines of a job. The channel closes when the workload is
    /// deleted or `cancel` fires.
    fn logs(&self, name: &str, cancel: CancellationToken) -> mpsc::Receiver<String>;

    /// Attach a result reported by the running workload.
    async fn register_result(&self, name: &str, result: JobResult) -> Result<(), ExecutorError>;
}
