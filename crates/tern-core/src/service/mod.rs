//! Glue between the executor, log store, job store and event bus.
//!
//! Every transition reported by the executor passes through
//! [`JobService::on_update`], which keeps log forwarding attached to
//! active jobs, persists the status, notifies and publishes it.

mod config;
pub use config::ServiceConfig;

mod forward;
mod listen;
pub use listen::{ListenEvent, ListenOptions, LogsMode};

pub mod naming;

use std::{
    collections::{HashMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use tern_model::{FilterExpression, JobMetadata, JobPage, JobPhase, JobQuery, JobSpec, JobStatus};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    error::{LogError, ReportedError, ServiceError},
    events::{EventBus, Subscription},
    executor::{JobExecutor, StartOptions},
    logs::{LogStore, LogWriter},
    notify::Notifier,
    numbergroup::NumberGroup,
    store::JobStore,
};

/// Callback for failures that must not block a job.
pub type ErrorHandler = Arc<dyn Fn(ReportedError) + Send + Sync>;

const LOG_TARGET: &str = "tern.core.service";
const PREPARATION_MARKER: &[u8] = b"[preparing|PHASE] job preparation\n";
const STOPPED_MANUALLY: &str = "job was stopped manually";
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Log session and forwarder of one job.
#[derive(Default)]
struct JobLog {
    writer: Option<LogWriter>,
    cancel: Option<CancellationToken>,
    forwarder: Option<JoinHandle<()>>,
}

impl JobLog {
    /// Let the forwarder copy the remaining output, then close.
    async fn drain(mut self, name: &str, grace: Duration) {
        if let Some(forwarder) = self.forwarder.take()
            && tokio::time::timeout(grace, forwarder).await.is_err()
        {
            warn!(target: LOG_TARGET, job = %name, ?grace, "log forwarder did not finish, closing log");
        }
        self.close(name);
    }

    fn close(self, name: &str) {
        if let Some(cancel) = self.cancel {
            cancel.cancel();
        }
        if let Some(writer) = self.writer
            && let Err(e) = writer.close()
        {
            warn!(target: LOG_TARGET, job = %name, error = %e, "cannot close log");
        }
    }
}

/// Job orchestration: start, stop, query and follow jobs.
pub struct JobService {
    cfg: ServiceConfig,
    executor: Arc<dyn JobExecutor>,
    logs: Arc<dyn LogStore>,
    jobs: Arc<dyn JobStore>,
    groups: Arc<dyn NumberGroup>,
    bus: EventBus,
    notifier: Option<Arc<dyn Notifier>>,
    on_error: ErrorHandler,
    listeners: Mutex<HashMap<String, JobLog>>,
    // Digest of the last recorded status per job, to drop duplicate transitions.
    seen: Mutex<HashMap<String, u64>>,
    shutdown: CancellationToken,
}

impl JobService {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        logs: Arc<dyn LogStore>,
        jobs: Arc<dyn JobStore>,
        groups: Arc<dyn NumberGroup>,
    ) -> Self {
        Self {
            cfg: ServiceConfig::default(),
            executor,
            logs,
            jobs,
            groups,
            bus: EventBus::new(),
            notifier: None,
            on_error: Arc::new(|e| error!(target: LOG_TARGET, error = %e, "job service error")),
            listeners: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, cfg: ServiceConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(ReportedError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(f);
        self
    }

    /// Share an existing bus, e.g. one the server already subscribed to.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Consume executor transitions in order until shutdown or until the
    /// channel closes.
    pub fn run(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<JobStatus>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let status = tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    status = updates.recv() => match status {
                        Some(status) => status,
                        None => break,
                    },
                };
                self.on_update(status).await;
            }
            debug!(target: LOG_TARGET, "update loop stopped");
        })
    }

    /// Handle one status transition.
    pub async fn on_update(&self, status: JobStatus) {
        if status.phase == JobPhase::Cleanup {
            if let Some(log) = self.lock_listeners().remove(&status.name) {
                let grace = self.cfg.cleanup_grace();
                let name = status.name.clone();
                tokio::spawn(async move { log.drain(&name, grace).await });
            }
            self.lock_seen().remove(&status.name);
            debug!(target: LOG_TARGET, job = %status.name, "job cleaned up");
            return;
        }

        if status.phase.is_active() {
            self.ensure_logging(&status.name);
        }
        self.record(status).await;
    }

    /// Validate, name and submit a job.
    ///
    /// When the executor rejects the job, or its log cannot be opened, a
    /// terminal failed status is stored and published before the error is
    /// returned.
    pub async fn start_job(&self, spec: JobSpec) -> Result<JobStatus, ServiceError> {
        spec.validate()
            .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
        let (name, opened) = self.open_job_log(&spec)?;

        let JobSpec {
            mut metadata,
            workload,
            mutex,
            backoff_limit,
            ..
        } = spec;
        metadata.created = SystemTime::now();
        metadata.finished = None;

        let writer = match opened {
            Ok(writer) => writer,
            // The name belongs to another job; recording a status would overwrite it.
            Err(e) if e.is_taken() => return Err(e.into()),
            Err(e) => {
                let details = format!("cannot start logging for {name}: {e}");
                self.fail_start(&name, metadata, &details).await;
                return Err(ServiceError::Internal(details));
            }
        };
        let marker = writer.write(PREPARATION_MARKER);
        self.lock_listeners().insert(
            name.clone(),
            JobLog {
                writer: Some(writer),
                ..Default::default()
            },
        );
        if let Err(e) = marker {
            let details = format!("cannot start logging for {name}: {e}");
            self.fail_start(&name, metadata, &details).await;
            return Err(ServiceError::Internal(details));
        }

        let mut opts = StartOptions::new()
            .with_name(&name)
            .with_backoff(backoff_limit.unwrap_or(self.cfg.default_backoff_limit));
        if let Some(mutex) = mutex {
            opts = opts.with_mutex(mutex);
        }

        match self.executor.start(workload, metadata.clone(), opts).await {
            Ok(status) => {
                info!(target: LOG_TARGET, job = %name, phase = %status.phase, "job started");
                Ok(status)
            }
            Err(e) => {
                self.fail_start(&name, metadata, &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// Request cancellation of an active job.
    pub async fn stop_job(&self, name: &str) -> Result<(), ServiceError> {
        let job = self.jobs.get(name).await?;
        if !job.phase.is_active() {
            return Err(ServiceError::FailedPrecondition(format!(
                "job {name} is in unstoppable phase {}",
                job.phase
            )));
        }

        self.executor.stop(name, STOPPED_MANUALLY).await?;
        info!(target: LOG_TARGET, job = %name, "job stop requested");
        Ok(())
    }

    pub async fn get_job(&self, name: &str) -> Result<JobStatus, ServiceError> {
        Ok(self.jobs.get(name).await?)
    }

    pub async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage<JobStatus>, ServiceError> {
        Ok(self.jobs.find(query).await?)
    }

    /// Live status updates of all jobs matching `filter`.
    pub fn subscribe(&self, filter: Vec<FilterExpression>) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// Stop forwarding and close every log session this service holds.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<(String, JobLog)> = self.lock_listeners().drain().collect();
        for (name, log) in drained {
            log.close(&name);
        }
        info!(target: LOG_TARGET, "job service stopped");
    }

    fn job_name(&self, spec: &JobSpec) -> Result<String, ServiceError> {
        let repo = &spec.metadata.repository;
        let flat = naming::flatten_ref(&repo.r#ref);
        let job = if spec.job.is_empty() { "custom" } else { &spec.job };

        let suffix = if flat.is_empty() {
            naming::random_name()
        } else {
            flat.clone()
        };
        let base = [repo.repo.as_str(), job, suffix.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("-");
        let base = naming::cleanup_name(&base);
        if flat.is_empty() {
            return Ok(base);
        }

        let n = self
            .groups
            .next(&base)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        Ok(format!("{base}.{n}"))
    }

    /// Name the job and open its log. Names whose log already exists, e.g.
    /// runs recovered from a previous process, are skipped.
    fn open_job_log(
        &self,
        spec: &JobSpec,
    ) -> Result<(String, Result<LogWriter, LogError>), ServiceError> {
        let mut attempt = 1;
        loop {
            let name = self.job_name(spec)?;
            match self.logs.open(&name) {
                Err(e) if e.is_taken() && attempt < MAX_NAME_ATTEMPTS => {
                    debug!(target: LOG_TARGET, job = %name, attempt, "log exists, picking the next name");
                    attempt += 1;
                }
                opened => return Ok((name, opened)),
            }
        }
    }

    async fn fail_start(&self, name: &str, mut metadata: JobMetadata, details: &str) {
        warn!(target: LOG_TARGET, job = %name, details, "job failed to start");
        metadata.finished = Some(SystemTime::now());

        if let Some(log) = self.lock_listeners().remove(name) {
            if let Some(writer) = &log.writer {
                let _ = writer.write(format!("[tern] FAILURE {details}\n").as_bytes());
            }
            log.close(name);
        }
        self.record(JobStatus::failed(name, metadata, details)).await;
        // The executor never saw this job, so no cleanup will follow.
        self.lock_seen().remove(name);
    }

    fn ensure_logging(&self, name: &str) {
        let mut listeners = self.lock_listeners();
        let entry = listeners.entry(name.to_string()).or_default();
        if entry.cancel.is_some() {
            return;
        }

        if entry.writer.is_none() {
            match self.logs.open(name) {
                Ok(writer) => entry.writer = Some(writer),
                Err(e) => {
                    warn!(target: LOG_TARGET, job = %name, error = %e, "cannot open log, output is not recorded");
                    listeners.remove(name);
                    return;
                }
            }
        }

        let cancel = self.shutdown.child_token();
        entry.cancel = Some(cancel.clone());
        debug!(target: LOG_TARGET, job = %name, "attaching log listener");
        entry.forwarder = Some(tokio::spawn(forward::forward_logs(
            name.to_string(),
            Arc::clone(&self.logs),
            Arc::clone(&self.executor),
            Arc::clone(&self.on_error),
            cancel,
        )));
    }

    // Persistence and notification failures are reported, never fatal:
    // the status is published either way.
    async fn record(&self, status: JobStatus) {
        let digest = digest(&status);
        {
            let mut seen = self.lock_seen();
            if seen.get(&status.name) == Some(&digest) {
                trace!(target: LOG_TARGET, job = %status.name, phase = %status.phase, "duplicate status dropped");
                return;
            }
            seen.insert(status.name.clone(), digest);
        }

        if let Err(e) = self.jobs.store(status.clone()).await {
            (self.on_error)(ReportedError::Persistence {
                job: status.name.clone(),
                reason: e.to_string(),
            });
        }
        if let Some(notifier) = &self.notifier
            && let Err(e) = notifier.notify(&status).await
        {
            (self.on_error)(ReportedError::Notification {
                job: status.name.clone(),
                reason: e.to_string(),
            });
        }
        self.bus.publish(&status);
    }

    fn lock_listeners(&self) -> MutexGuard<'_, HashMap<String, JobLog>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_seen(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Timestamps are left out: a re-observed transition carries a fresh `finished`.
fn digest(status: &JobStatus) -> u64 {
    let mut h = DefaultHasher::new();
    (status.phase, status.conditions, &status.results, &status.details).hash(&mut h);
    h.finish()
}
