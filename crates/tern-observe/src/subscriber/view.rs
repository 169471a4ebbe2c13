use std::borrow::Borrow;

use tern_model::{JobPhase, JobStatus};
use tracing::{debug, info, warn};

const TARGET: &str = "tern.observe.job";

pub trait View {
    fn as_job(&self) -> &str;
    fn phase(&self) -> JobPhase;
    fn succeeded(&self) -> bool;
    fn failure_count(&self) -> u32;
    fn as_details(&self) -> &str;
    fn as_owner(&self) -> &str;
    fn result_count(&self) -> usize;
}

impl<T> View for T
where
    T: Borrow<JobStatus>,
{
    #[inline]
    fn as_job(&self) -> &str {
        &self.borrow().name
    }
    #[inline]
    fn phase(&self) -> JobPhase {
        self.borrow().phase
    }
    #[inline]
    fn succeeded(&self) -> bool {
        self.borrow().conditions.success
    }
    #[inline]
    fn failure_count(&self) -> u32 {
        self.borrow().conditions.failure_count
    }
    #[inline]
    fn as_details(&self) -> &str {
        self.borrow().details.as_deref().unwrap_or("none")
    }
    #[inline]
    fn as_owner(&self) -> &str {
        &self.borrow().metadata.owner
    }
    #[inline]
    fn result_count(&self) -> usize {
        self.borrow().results.len()
    }
}

#[inline]
pub fn message_for(phase: JobPhase, success: bool) -> &'static str {
    match phase {
        JobPhase::Unknown => "job state could not be determined",
        JobPhase::Preparing => "job is preparing (init containers)",
        JobPhase::Starting => "job preparation finished, starting",
        JobPhase::Running => "job is running",
        JobPhase::Done if success => "job finished successfully",
        JobPhase::Done => "job failed",
        JobPhase::Cleanup => "job workload removed",
    }
}

#[inline]
pub fn log_status<S: View>(s: &S) {
    let msg = message_for(s.phase(), s.succeeded());

    match s.phase() {
        JobPhase::Unknown => warn!(target: TARGET, job = s.as_job(), "{msg}"),
        JobPhase::Preparing => info!(target: TARGET, job = s.as_job(), owner = s.as_owner(), "{msg}"),
        JobPhase::Starting => debug!(target: TARGET, job = s.as_job(), "{msg}"),
        JobPhase::Running => info!(
            target: TARGET,
            job = s.as_job(),
            restarts = s.failure_count(),
            "{msg}"
        ),
        JobPhase::Done if s.succeeded() => info!(
            target: TARGET,
            job = s.as_job(),
            results = s.result_count(),
            "{msg}"
        ),
        JobPhase::Done => warn!(
            target: TARGET,
            job = s.as_job(),
            failures = s.failure_count(),
            details = s.as_details(),
            "{msg}"
        ),
        JobPhase::Cleanup => debug!(target: TARGET, job = s.as_job(), "{msg}"),
    }
}
