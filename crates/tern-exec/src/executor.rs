//! Watches the cluster and turns workload changes into job status
//! transitions.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use async_trait::async_trait;
use taskvisor::{RestartPolicy, TaskError, TaskFn, TaskRef, TaskSpec};
use tern_core::{ExecutorError, JobExecutor, OnTransition, StartOptions, service::naming};
use tern_model::{JobMetadata, JobPhase, JobResult, JobStatus, WorkloadSpec};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    cluster::{Cluster, Selector, WatchEvent, Workload},
    config::ExecutorConfig,
    error::{ClusterError, ConfigError, SupervisorError},
    labels::LabelSet,
    loglistener,
    status::compute_status,
    supervise::{HOUSEKEEPING_TASK, TaskSupervisor, WATCH_TASK, WatchMonitor},
    trace::EventTrace,
};

const LOG_TARGET: &str = "tern.exec.executor";
const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Schedules jobs as workloads and reports every transition to an
/// [`OnTransition`] sink.
pub struct Executor {
    cfg: ExecutorConfig,
    labels: LabelSet,
    cluster: Arc<dyn Cluster>,
    on_transition: Arc<dyn OnTransition>,
    trace: Option<EventTrace>,
    monitor: Option<Arc<WatchMonitor>>,
    // Last reported status per job, used to diff after a reconnect.
    seen: Mutex<HashMap<String, JobStatus>>,
}

impl Executor {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        cfg: ExecutorConfig,
        on_transition: Arc<dyn OnTransition>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let trace = cfg
            .event_trace_log
            .as_deref()
            .map(EventTrace::open)
            .transpose()?;

        Ok(Self {
            labels: LabelSet::new(&cfg.label_prefix),
            cfg,
            cluster,
            on_transition,
            trace,
            monitor: None,
            seen: Mutex::new(HashMap::new()),
        })
    }

    /// Monitor subscribed to the supervisor that escalates watch failures;
    /// it learns about every established session.
    pub fn with_monitor(mut self, monitor: Arc<WatchMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.cfg
    }

    /// Submit the watch session and housekeeping to `supervisor`; both stop
    /// when `cancel` fires.
    pub async fn run(
        self: &Arc<Self>,
        supervisor: &TaskSupervisor,
        cancel: CancellationToken,
    ) -> Result<(), SupervisorError> {
        let backoff = self.cfg.reconnect_backoff();
        supervisor
            .submit(
                WATCH_TASK,
                TaskSpec::new(
                    self.watch_task(cancel.clone()),
                    RestartPolicy::OnFailure,
                    backoff.clone(),
                    None,
                ),
            )
            .await?;
        supervisor
            .submit(
                HOUSEKEEPING_TASK,
                TaskSpec::new(
                    self.housekeeping_task(cancel),
                    RestartPolicy::OnFailure,
                    backoff,
                    None,
                ),
            )
            .await?;
        info!(target: LOG_TARGET, namespace = %self.cfg.namespace, "executor started");
        Ok(())
    }

    fn watch_task(self: &Arc<Self>, cancel: CancellationToken) -> TaskRef {
        let this = Arc::clone(self);
        TaskFn::arc(WATCH_TASK, move |ctx: CancellationToken| {
            let this = Arc::clone(&this);
            let cancel = cancel.clone();
            async move { this.watch(ctx, cancel).await }
        })
    }

    /// One watch session. A lost stream fails the attempt and the
    /// supervisor reconnects after the configured backoff.
    async fn watch(&self, ctx: CancellationToken, cancel: CancellationToken) -> Result<(), TaskError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let mut events = self
            .connect(&self.labels.discovery())
            .await
            .map_err(|e| {
                warn!(target: LOG_TARGET, error = %e, "cannot establish watch");
                TaskError::Fail {
                    reason: e.to_string(),
                }
            })?;
        if let Some(monitor) = &self.monitor {
            monitor.connected();
        }

        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Err(TaskError::Canceled),
                _ = cancel.cancelled() => {
                    info!(target: LOG_TARGET, "executor stopped");
                    return Ok(());
                }
                ev = events.recv() => match ev {
                    Some(ev) => self.handle_event(ev).await,
                    None => {
                        warn!(target: LOG_TARGET, "watch disconnected, reconnecting");
                        return Err(TaskError::Fail {
                            reason: "watch stream closed".into(),
                        });
                    }
                },
            }
        }
    }

    // The watch is established before the relist, so nothing falls between
    // the two; what changed while disconnected is reported by the diff.
    async fn connect(&self, selector: &Selector) -> Result<mpsc::Receiver<WatchEvent>, ClusterError> {
        let events = self.cluster.watch(selector).await?;
        let workloads = self.cluster.list(selector).await?;

        let mut present = HashSet::new();
        for w in workloads {
            let status = match compute_status(&w, &self.labels) {
                Ok(status) => status,
                Err(e) => {
                    warn!(target: LOG_TARGET, workload = %w.name, error = %e, "cannot compute status");
                    continue;
                }
            };
            present.insert(status.name.clone());

            let changed = self
                .lock_seen()
                .get(&status.name)
                .is_none_or(|prev| differs(prev, &status));
            if changed {
                self.emit(status).await;
            }
        }

        let vanished: Vec<JobStatus> = self
            .lock_seen()
            .values()
            .filter(|s| !present.contains(&s.name))
            .map(|s| s.clone().with_phase(JobPhase::Cleanup))
            .collect();
        for status in vanished {
            debug!(target: LOG_TARGET, job = %status.name, "job vanished while disconnected");
            self.emit(status).await;
        }

        Ok(events)
    }

    async fn handle_event(&self, ev: WatchEvent) {
        let (w, deleted) = match ev {
            WatchEvent::Added(w) | WatchEvent::Modified(w) => (w, false),
            WatchEvent::Deleted(w) => (w, true),
        };

        let mut status = match compute_status(&w, &self.labels) {
            Ok(status) => status,
            Err(e) => {
                warn!(target: LOG_TARGET, workload = %w.name, error = %e, "cannot compute status");
                return;
            }
        };
        if deleted {
            if !self.lock_seen().contains_key(&status.name) {
                return;
            }
            status.phase = JobPhase::Cleanup;
        }
        self.emit(status).await;
    }

    /// Report a transition and act on it: finished jobs are deleted.
    async fn emit(&self, status: JobStatus) {
        {
            let mut seen = self.lock_seen();
            if status.phase == JobPhase::Cleanup {
                seen.remove(&status.name);
            } else {
                seen.insert(status.name.clone(), status.clone());
            }
        }
        trace!(target: LOG_TARGET, job = %status.name, phase = %status.phase, "job status");
        if let Some(trace) = &self.trace {
            trace.record(&status);
        }

        let done = status.phase == JobPhase::Done;
        let name = status.name.clone();
        self.on_transition.on_transition(status);

        if done {
            match self.cluster.delete(&name).await {
                Ok(()) | Err(ClusterError::NotFound(_)) => {}
                Err(e) => warn!(target: LOG_TARGET, job = %name, error = %e, "cannot delete finished job"),
            }
        }
    }

    fn housekeeping_task(self: &Arc<Self>, cancel: CancellationToken) -> TaskRef {
        let this = Arc::clone(self);
        TaskFn::arc(HOUSEKEEPING_TASK, move |ctx: CancellationToken| {
            let this = Arc::clone(&this);
            let cancel = cancel.clone();
            async move {
                let mut tick = tokio::time::interval(this.cfg.housekeeping_interval());
                loop {
                    tokio::select! {
                        _ = ctx.cancelled() => return Err(TaskError::Canceled),
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tick.tick() => this.housekeeping().await,
                    }
                }
            }
        })
    }

    /// Fail every job that exceeded its time budget.
    async fn housekeeping(&self) {
        let workloads = match self.cluster.list(&self.labels.discovery()).await {
            Ok(workloads) => workloads,
            Err(e) => {
                warn!(target: LOG_TARGET, error = %e, "cannot perform housekeeping");
                return;
            }
        };

        let now = SystemTime::now();
        for w in workloads {
            if w.annotations.contains_key(&self.labels.annotation_failed) {
                continue;
            }
            let status = match compute_status(&w, &self.labels) {
                Ok(status) if !status.phase.is_terminal() => status,
                Ok(_) => continue,
                Err(e) => {
                    warn!(target: LOG_TARGET, workload = %w.name, error = %e, "cannot perform housekeeping");
                    continue;
                }
            };

            let ttl = if status.phase == JobPhase::Preparing {
                self.cfg.preparation_timeout()
            } else {
                self.cfg.total_timeout()
            };
            let age = now
                .duration_since(status.metadata.created)
                .unwrap_or_default();
            if age < ttl {
                continue;
            }

            let msg = format!("job timed out during {}", status.phase);
            info!(target: LOG_TARGET, job = %status.name, "{msg}");
            if let Err(e) = self.annotate(&w.name, &self.labels.annotation_failed, msg).await {
                warn!(target: LOG_TARGET, job = %status.name, error = %e, "cannot mark job as timed out");
            }
        }
    }

    /// Only the newest job holding `mutex` may run: every other holder is failed.
    async fn preempt(&self, mutex: &str, newer: &str) -> Result<(), ClusterError> {
        let holders = self.cluster.list(&self.labels.for_mutex(mutex)).await?;
        for w in holders {
            if self.labels.job_name(&w) == Some(newer)
                || w.annotations.contains_key(&self.labels.annotation_failed)
            {
                continue;
            }
            let reason = format!("a newer job ({newer}) with the same mutex ({mutex}) started");
            info!(target: LOG_TARGET, job = %w.name, mutex, "{reason}");
            match self.annotate(&w.name, &self.labels.annotation_failed, reason).await {
                Ok(()) | Err(ClusterError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn annotate(&self, name: &str, key: &str, value: String) -> Result<(), ClusterError> {
        self.modify(name, |w| {
            w.annotations.insert(key.to_string(), value.clone());
            Ok(())
        })
        .await
    }

    /// Read-modify-write of a workload, retried on conflicting updates.
    async fn modify<F>(&self, name: &str, mut f: F) -> Result<(), ClusterError>
    where
        F: FnMut(&mut Workload) -> Result<(), ClusterError> + Send,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut w = self.cluster.get(name).await?;
            f(&mut w)?;
            match self.cluster.update(w).await {
                Ok(_) => return Ok(()),
                Err(ClusterError::Conflict(_)) => {
                    debug!(target: LOG_TARGET, workload = %name, attempt, "update conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ClusterError::Conflict(name.to_string()))
    }

    fn lock_seen(&self) -> MutexGuard<'_, HashMap<String, JobStatus>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn differs(a: &JobStatus, b: &JobStatus) -> bool {
    a.phase != b.phase
        || a.conditions != b.conditions
        || a.results != b.results
        || a.details != b.details
}

#[async_trait]
impl JobExecutor for Executor {
    #[instrument(level = "debug", skip_all, fields(job = opts.name.as_deref()))]
    async fn start(
        &self,
        spec: WorkloadSpec,
        mut metadata: JobMetadata,
        opts: StartOptions,
    ) -> Result<JobStatus, ExecutorError> {
        spec.validate()
            .map_err(|e| ExecutorError::InvalidSpec(e.to_string()))?;

        let name = opts
            .name
            .clone()
            .unwrap_or_else(|| format!("tern-{}", naming::random_name()));
        metadata.created = SystemTime::now();
        metadata.finished = None;
        metadata.annotations.extend(opts.annotations.iter().cloned());

        let raw_metadata = serde_json::to_string(&metadata)
            .map_err(|e| ExecutorError::InvalidSpec(format!("cannot serialize metadata: {e}")))?;
        let l = &self.labels;
        let mut w = Workload::new(&name, spec)
            .with_label(&l.marker, "true")
            .with_label(&l.job_name, &name)
            .with_annotation(&l.annotation_metadata, raw_metadata);
        w.annotations.extend(l.user_data(&metadata.annotations));
        if opts.backoff_limit > 0 {
            w.annotations.insert(
                l.annotation_failure_limit.clone(),
                opts.backoff_limit.to_string(),
            );
        }
        if !opts.sidecars.is_empty() {
            w.annotations
                .insert(l.annotation_sidecars.clone(), opts.sidecars.join(","));
        }
        if let Some(mutex) = &opts.mutex {
            w.labels.insert(l.mutex.clone(), mutex.clone());
            self.preempt(mutex, &name).await?;
        }

        let created = self.cluster.create(w).await?;
        let status = compute_status(&created, l)
            .map_err(|e| ExecutorError::Cluster(e.to_string()))?;
        info!(target: LOG_TARGET, job = %name, "job scheduled");
        Ok(status)
    }

    async fn stop(&self, name: &str, reason: &str) -> Result<(), ExecutorError> {
        self.annotate(name, &self.labels.annotation_failed, reason.to_string())
            .await?;
        info!(target: LOG_TARGET, job = %name, reason, "job marked as failed");
        Ok(())
    }

    fn logs(&self, name: &str, cancel: CancellationToken) -> mpsc::Receiver<String> {
        loglistener::listen(
            Arc::clone(&self.cluster),
            self.labels.clone(),
            name.to_string(),
            cancel,
        )
    }

    async fn register_result(&self, name: &str, result: JobResult) -> Result<(), ExecutorError> {
        let key = self.labels.annotation_results.clone();
        self.modify(name, |w| {
            let mut results: Vec<JobResult> = match w.annotations.get(&key) {
                Some(raw) => serde_json::from_str(raw)
                    .map_err(|e| ClusterError::Rejected(format!("corrupt results of {name}: {e}")))?,
                None => Vec::new(),
            };
            results.push(result.clone());
            let raw = serde_json::to_string(&results)
                .map_err(|e| ClusterError::Rejected(e.to_string()))?;
            w.annotations.insert(key.clone(), raw);
            Ok(())
        })
        .await?;
        debug!(target: LOG_TARGET, job = %name, "result registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taskvisor::Subscribe;
    use tern_model::{ContainerSpec, Trigger};
    use tokio::time::timeout;

    use crate::cluster::{ContainerState, MemoryCluster, PodPhase};

    struct Harness {
        cluster: MemoryCluster,
        executor: Arc<Executor>,
        supervisor: Arc<TaskSupervisor>,
        updates: mpsc::UnboundedReceiver<JobStatus>,
        errors: Arc<Mutex<Vec<String>>>,
        cancel: CancellationToken,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    impl Harness {
        async fn run(&self) {
            self.executor
                .run(&self.supervisor, self.cancel.clone())
                .await
                .unwrap();
        }
    }

    fn fast() -> ExecutorConfig {
        ExecutorConfig {
            reconnect_first_ms: 5,
            reconnect_max_ms: 20,
            reconnect_escalate_after: 2,
            ..Default::default()
        }
    }

    async fn harness(cfg: ExecutorConfig) -> Harness {
        let cluster = MemoryCluster::new();
        let (tx, updates) = mpsc::unbounded_channel();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let monitor = Arc::new(
            WatchMonitor::new(&cfg)
                .with_error_handler(move |e| sink.lock().unwrap().push(e.to_string())),
        );
        let supervisor = TaskSupervisor::start(vec![monitor.clone() as Arc<dyn Subscribe>]).await;
        let executor = Executor::new(Arc::new(cluster.clone()), cfg, Arc::new(tx))
            .unwrap()
            .with_monitor(monitor);
        Harness {
            cluster,
            executor: Arc::new(executor),
            supervisor,
            updates,
            errors,
            cancel: CancellationToken::new(),
        }
    }

    fn workload() -> WorkloadSpec {
        WorkloadSpec::new(vec![ContainerSpec::new("main").with_command(["make"])])
    }

    fn metadata() -> JobMetadata {
        JobMetadata::new("alice", Trigger::Push)
    }

    async fn start(h: &Harness, name: &str, opts: StartOptions) -> JobStatus {
        h.executor
            .start(workload(), metadata(), opts.with_name(name))
            .await
            .unwrap()
    }

    async fn wait_phase(h: &mut Harness, name: &str, phase: JobPhase) -> JobStatus {
        timeout(Duration::from_secs(3), async {
            loop {
                let st = h.updates.recv().await.expect("executor went away");
                if st.name == name && st.phase == phase {
                    return st;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{name} never reached {phase}"))
    }

    #[tokio::test]
    async fn start_creates_labeled_workload() {
        let h = harness(fast()).await;
        let opts = StartOptions::new()
            .with_backoff(2)
            .with_annotation("pr", "42")
            .with_sidecars(["proxy"]);
        let st = start(&h, "job.0", opts).await;
        assert_eq!(st.name, "job.0");
        assert_eq!(st.phase, JobPhase::Preparing);
        assert_eq!(st.metadata.annotation("pr"), Some("42"));

        let l = h.executor.labels();
        let w = h.cluster.workload("job.0").unwrap();
        assert_eq!(w.labels.get(&l.marker).map(String::as_str), Some("true"));
        assert_eq!(w.labels.get(&l.job_name).map(String::as_str), Some("job.0"));
        assert_eq!(l.failure_limit(&w), 2);
        assert!(l.is_sidecar(&w, "proxy"));
        assert_eq!(
            w.annotations.get("tern.dev/userdata.pr").map(String::as_str),
            Some("42")
        );
    }

    #[tokio::test]
    async fn start_without_name_gets_one() {
        let h = harness(fast()).await;
        let st = h
            .executor
            .start(workload(), metadata(), StartOptions::new())
            .await
            .unwrap();
        assert!(st.name.starts_with("tern-"), "{}", st.name);
    }

    #[tokio::test]
    async fn start_rejects_invalid_spec() {
        let h = harness(fast()).await;
        let res = h
            .executor
            .start(WorkloadSpec::default(), metadata(), StartOptions::new())
            .await;
        assert!(matches!(res, Err(ExecutorError::InvalidSpec(_))));
    }

    #[tokio::test]
    async fn reports_lifecycle_and_deletes_finished_jobs() {
        let mut h = harness(fast()).await;
        h.run().await;
        start(&h, "job.0", StartOptions::new()).await;
        wait_phase(&mut h, "job.0", JobPhase::Preparing).await;

        h.cluster
            .set_container_state("job.0", "main", ContainerState::Running)
            .unwrap();
        h.cluster.set_pod_phase("job.0", PodPhase::Running).unwrap();
        wait_phase(&mut h, "job.0", JobPhase::Running).await;

        h.cluster
            .set_container_state("job.0", "main", ContainerState::Terminated { exit_code: 0 })
            .unwrap();
        let done = wait_phase(&mut h, "job.0", JobPhase::Done).await;
        assert!(done.conditions.success);
        assert!(done.metadata.finished.is_some());

        wait_phase(&mut h, "job.0", JobPhase::Cleanup).await;
        assert!(h.cluster.workload("job.0").is_none());
    }

    #[tokio::test]
    async fn stop_marks_job_failed() {
        let mut h = harness(fast()).await;
        h.run().await;
        start(&h, "job.0", StartOptions::new()).await;

        h.executor.stop("job.0", "job was stopped manually").await.unwrap();
        let done = wait_phase(&mut h, "job.0", JobPhase::Done).await;
        assert!(!done.conditions.success);
        assert_eq!(done.details.as_deref(), Some("job was stopped manually"));

        assert!(matches!(
            h.executor.stop("ghost", "x").await,
            Err(ExecutorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn newer_job_preempts_mutex_holder() {
        let h = harness(fast()).await;
        start(&h, "old.0", StartOptions::new().with_mutex("deploy")).await;
        start(&h, "other.0", StartOptions::new().with_mutex("lint")).await;
        start(&h, "new.0", StartOptions::new().with_mutex("deploy")).await;

        let failed = &h.executor.labels().annotation_failed;
        let old = h.cluster.workload("old.0").unwrap();
        assert_eq!(
            old.annotations.get(failed).map(String::as_str),
            Some("a newer job (new.0) with the same mutex (deploy) started")
        );
        assert!(!h.cluster.workload("new.0").unwrap().annotations.contains_key(failed));
        assert!(!h.cluster.workload("other.0").unwrap().annotations.contains_key(failed));
    }

    #[tokio::test]
    async fn register_result_survives_conflicts() {
        let h = harness(fast()).await;
        start(&h, "job.0", StartOptions::new()).await;

        h.cluster.inject_conflicts(2);
        h.executor
            .register_result("job.0", JobResult::new("url", "https://a"))
            .await
            .unwrap();
        h.executor
            .register_result("job.0", JobResult::new("url", "https://b"))
            .await
            .unwrap();

        let w = h.cluster.workload("job.0").unwrap();
        let st = compute_status(&w, h.executor.labels()).unwrap();
        let payloads: Vec<_> = st.results.iter().map(|r| r.payload.as_str()).collect();
        assert_eq!(payloads, ["https://a", "https://b"]);

        h.cluster.inject_conflicts(MAX_UPDATE_ATTEMPTS);
        assert!(matches!(
            h.executor
                .register_result("job.0", JobResult::new("url", "https://c"))
                .await,
            Err(ExecutorError::Cluster(_))
        ));
    }

    #[tokio::test]
    async fn reconnect_diffs_against_last_seen() {
        let mut h = harness(fast()).await;
        h.run().await;
        start(&h, "a.0", StartOptions::new()).await;
        start(&h, "b.0", StartOptions::new()).await;
        wait_phase(&mut h, "a.0", JobPhase::Preparing).await;
        wait_phase(&mut h, "b.0", JobPhase::Preparing).await;

        h.cluster.refuse_watches(true);
        h.cluster.disconnect_watches();
        h.cluster.set_pod_phase("a.0", PodPhase::Running).unwrap();
        h.cluster.forget("b.0");

        timeout(Duration::from_secs(3), async {
            while h.errors.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("disconnect was not escalated");
        assert!(h.errors.lock().unwrap()[0].contains("watch disconnected"));

        h.cluster.refuse_watches(false);
        let mut pending = vec![("a.0", JobPhase::Running), ("b.0", JobPhase::Cleanup)];
        timeout(Duration::from_secs(3), async {
            while !pending.is_empty() {
                let st = h.updates.recv().await.unwrap();
                pending.retain(|(n, p)| !(st.name == *n && st.phase == *p));
            }
        })
        .await
        .expect("missed transitions were not reported");
    }

    #[tokio::test]
    async fn housekeeping_fails_stuck_jobs() {
        let mut h = harness(ExecutorConfig {
            preparation_timeout_ms: 40,
            total_timeout_ms: 80,
            ..fast()
        })
        .await;
        h.run().await;
        start(&h, "job.0", StartOptions::new()).await;

        let done = wait_phase(&mut h, "job.0", JobPhase::Done).await;
        assert!(!done.conditions.success);
        assert_eq!(done.details.as_deref(), Some("job timed out during preparing"));
    }

    #[tokio::test]
    async fn logs_follow_every_container() {
        let h = harness(fast()).await;
        let spec = WorkloadSpec::new(vec![
            ContainerSpec::new("main").with_command(["make"]),
            ContainerSpec::new("proxy").with_command(["proxy"]),
        ])
        .with_init_container(ContainerSpec::new("checkout").with_command(["git"]));
        h.executor
            .start(
                spec,
                metadata(),
                StartOptions::new().with_name("job.0").with_sidecars(["proxy"]),
            )
            .await
            .unwrap();

        let c = &h.cluster;
        c.set_container_state("job.0", "checkout", ContainerState::Running).unwrap();
        c.append_log("job.0", "checkout", "cloning").unwrap();
        c.set_container_state("job.0", "checkout", ContainerState::Terminated { exit_code: 0 })
            .unwrap();

        let mut lines = h.executor.logs("job.0", CancellationToken::new());

        c.set_container_state("job.0", "main", ContainerState::Running).unwrap();
        c.set_container_state("job.0", "proxy", ContainerState::Running).unwrap();
        c.append_log("job.0", "main", "building").unwrap();
        c.append_log("job.0", "proxy", "ready").unwrap();

        let mut got = Vec::new();
        while got.len() < 3 {
            let line = timeout(Duration::from_secs(2), lines.recv()).await.unwrap().unwrap();
            got.push(line);
        }
        got.sort();
        assert_eq!(got, ["[proxy] ready", "building", "cloning"]);

        c.delete("job.0").await.unwrap();
        let end = timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn logs_of_unknown_job_end_immediately() {
        let h = harness(fast()).await;
        let mut lines = h.executor.logs("ghost", CancellationToken::new());
        let end = timeout(Duration::from_secs(2), lines.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn writes_event_trace() {
        let path = std::env::temp_dir().join(format!("tern-trace-{}.jsonl", uuid::Uuid::new_v4()));
        let mut h = harness(ExecutorConfig {
            event_trace_log: Some(path.to_string_lossy().into_owned()),
            ..fast()
        })
        .await;
        h.run().await;
        start(&h, "job.0", StartOptions::new()).await;
        wait_phase(&mut h, "job.0", JobPhase::Preparing).await;

        let trace = std::fs::read_to_string(&path).unwrap();
        let first: JobStatus = serde_json::from_str(trace.lines().next().unwrap()).unwrap();
        assert_eq!(first.name, "job.0");
        let _ = std::fs::remove_file(&path);
    }
}
