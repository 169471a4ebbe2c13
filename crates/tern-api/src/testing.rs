//! In-memory handler shared by the transport tests.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use tern_core::{EventBus, ListenEvent, ListenOptions, LogsMode, ServiceError, Subscription};
use tern_model::{
    FilterExpression, JobMetadata, JobPage, JobPhase, JobQuery, JobSpec, JobStatus, LogSliceEvent,
    LogSliceType, Trigger, filter,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{ApiError, ApiHandler, ListenStream};

#[derive(Default)]
pub(crate) struct StubHandler {
    pub jobs: Mutex<HashMap<String, JobStatus>>,
    pub bus: EventBus,
    pub listen_cancel: Mutex<Option<CancellationToken>>,
}

impl StubHandler {
    pub fn with_job(self, status: JobStatus) -> Self {
        self.jobs.lock().unwrap().insert(status.name.clone(), status);
        self
    }
}

/// Replays a `START` slice (when logs are requested), the current status and
/// an `Aborted` error, then closes.
#[async_trait]
impl ApiHandler for StubHandler {
    async fn start_job(&self, spec: JobSpec) -> Result<JobStatus, ApiError> {
        spec.validate()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let name = format!("{}.0", spec.job);
        let st = JobStatus::new(&name, spec.metadata).with_phase(JobPhase::Preparing);
        self.jobs.lock().unwrap().insert(name, st.clone());
        Ok(st)
    }

    async fn stop_job(&self, name: &str) -> Result<(), ApiError> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get(name)
            .ok_or_else(|| ApiError::NotFound(name.to_string()))?;
        if !job.phase.is_active() {
            return Err(ApiError::FailedPrecondition(name.to_string()));
        }
        Ok(())
    }

    async fn get_job(&self, name: &str) -> Result<JobStatus, ApiError> {
        self.jobs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(name.to_string()))
    }

    async fn list_jobs(&self, query: JobQuery) -> Result<JobPage<JobStatus>, ApiError> {
        let mut items: Vec<JobStatus> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|st| filter::matches(st, &query.filter))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        let total = items.len();
        let items = items
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        Ok(JobPage { items, total })
    }

    async fn listen(
        &self,
        name: &str,
        opts: ListenOptions,
        cancel: CancellationToken,
    ) -> Result<ListenStream, ApiError> {
        let job = self.get_job(name).await?;
        let (tx, rx) = mpsc::channel(8);
        if opts.logs != LogsMode::Disabled {
            let slice = LogSliceEvent::new("build", LogSliceType::Start, "");
            tx.send(Ok(ListenEvent::Slice(slice))).await.unwrap();
        }
        tx.send(Ok(ListenEvent::Update(job))).await.unwrap();
        tx.send(Err(ServiceError::Aborted("listener cancelled".into())))
            .await
            .unwrap();
        *self.listen_cancel.lock().unwrap() = Some(cancel);
        Ok(rx)
    }

    fn subscribe(&self, filter: Vec<FilterExpression>) -> Subscription {
        self.bus.subscribe(filter)
    }
}

pub(crate) fn running(name: &str, owner: &str) -> JobStatus {
    JobStatus::new(name, JobMetadata::new(owner, Trigger::Push)).with_phase(JobPhase::Running)
}
