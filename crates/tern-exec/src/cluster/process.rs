//! Runs workloads as host processes: init containers one after another,
//! then the main containers side by side. Every workload is a task of the
//! shared [`TaskSupervisor`] that is never restarted.

use std::{
    collections::HashMap,
    process::Stdio,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use taskvisor::{BackoffPolicy, RestartPolicy, TaskError, TaskFn, TaskRef, TaskSpec};
use tern_model::ContainerSpec;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    cluster::{
        Cluster, ContainerState, LogStream, MemoryCluster, PodPhase, Selector, WatchEvent,
        Workload,
    },
    error::ClusterError,
    supervise::TaskSupervisor,
};

/// Exit code reported for a container killed by deletion.
const KILLED: i32 = 137;
/// Exit code reported for a container that could not be spawned.
const NOT_STARTED: i32 = 127;
/// Exit code of main containers skipped after a failed init container.
const SKIPPED: i32 = -1;

/// Host-process backend; workload state and container output are kept in
/// an embedded [`MemoryCluster`].
#[derive(Clone)]
pub struct ProcessCluster {
    state: MemoryCluster,
    supervisor: Arc<TaskSupervisor>,
    running: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ProcessCluster {
    pub fn new(supervisor: Arc<TaskSupervisor>) -> Self {
        Self {
            state: MemoryCluster::new(),
            supervisor,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn workload_task(&self, name: &'static str, w: Workload, cancel: CancellationToken) -> TaskRef {
        let state = self.state.clone();
        let running = Arc::clone(&self.running);
        let w = Arc::new(w);

        TaskFn::arc(name, move |ctx: CancellationToken| {
            let state = state.clone();
            let running = Arc::clone(&running);
            let cancel = cancel.clone();
            let w = Arc::clone(&w);
            async move {
                let res = tokio::select! {
                    ok = run_workload(&state, &w, &cancel) => if ok {
                        Ok(())
                    } else {
                        Err(TaskError::Fail { reason: format!("workload {} failed", w.name) })
                    },
                    // Dropping the workload future kills its children.
                    _ = ctx.cancelled() => Err(TaskError::Canceled),
                };
                // A cancelled token was already removed by delete.
                if !cancel.is_cancelled() {
                    running
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&w.name);
                }
                res
            }
        })
    }

    fn lock_running(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Cluster for ProcessCluster {
    async fn create(&self, workload: Workload) -> Result<Workload, ClusterError> {
        let created = self.state.create(workload).await?;

        let cancel = CancellationToken::new();
        self.lock_running()
            .insert(created.name.clone(), cancel.clone());

        // TaskFn names are 'static; one leaked string per workload.
        let name: &'static str = Box::leak(format!("tern-workload-{}", created.name).into_boxed_str());
        let task = self.workload_task(name, created.clone(), cancel);
        let spec = TaskSpec::new(task, RestartPolicy::Never, BackoffPolicy::default(), None);
        if let Err(e) = self.supervisor.submit(name, spec).await {
            self.lock_running().remove(&created.name);
            let _ = self.state.delete(&created.name).await;
            return Err(e.into());
        }
        Ok(created)
    }

    async fn get(&self, name: &str) -> Result<Workload, ClusterError> {
        self.state.get(name).await
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<Workload>, ClusterError> {
        self.state.list(selector).await
    }

    async fn watch(&self, selector: &Selector) -> Result<mpsc::Receiver<WatchEvent>, ClusterError> {
        self.state.watch(selector).await
    }

    async fn update(&self, workload: Workload) -> Result<Workload, ClusterError> {
        self.state.update(workload).await
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        if let Some(cancel) = self.lock_running().remove(name) {
            cancel.cancel();
        }
        self.state.delete(name).await
    }

    async fn logs(&self, workload: &str, container: &str) -> Result<LogStream, ClusterError> {
        self.state.logs(workload, container).await
    }
}

/// Run every container of `w`; true when all of them succeeded.
async fn run_workload(state: &MemoryCluster, w: &Workload, cancel: &CancellationToken) -> bool {
    let name = w.name.as_str();
    debug!(target: "tern.exec.proc", workload = %name, "workload started");

    for (i, c) in w.spec.init_containers.iter().enumerate() {
        let code = run_container(state, name, c, cancel).await;
        if code != 0 {
            let skipped = w.spec.init_containers[i + 1..]
                .iter()
                .chain(w.spec.containers.iter());
            for c in skipped {
                let _ = state.set_container_state(
                    name,
                    &c.name,
                    ContainerState::Terminated { exit_code: SKIPPED },
                );
            }
            let _ = state.set_pod_phase(name, PodPhase::Failed);
            debug!(target: "tern.exec.proc", workload = %name, container = %c.name, code, "init container failed");
            return false;
        }
    }

    if state.set_pod_phase(name, PodPhase::Running).is_err() {
        return false;
    }

    let mut mains = JoinSet::new();
    for c in w.spec.containers.iter().cloned() {
        let state = state.clone();
        let name = name.to_string();
        let cancel = cancel.clone();
        mains.spawn(async move { run_container(&state, &name, &c, &cancel).await });
    }

    let mut failed = false;
    while let Some(res) = mains.join_next().await {
        failed |= !matches!(res, Ok(0));
    }
    let phase = if failed {
        PodPhase::Failed
    } else {
        PodPhase::Succeeded
    };
    let _ = state.set_pod_phase(name, phase);
    debug!(target: "tern.exec.proc", workload = %name, ?phase, "workload finished");
    !failed
}

fn command(c: &ContainerSpec) -> Option<Command> {
    let mut argv = c.command.iter().chain(c.args.iter());
    let program = match argv.next() {
        Some(p) => p.as_str(),
        None if !c.image.is_empty() => c.image.as_str(),
        None => return None,
    };

    let mut cmd = Command::new(program);
    cmd.args(argv);
    for kv in &c.env {
        cmd.env(kv.key(), kv.value());
    }
    if let Some(dir) = &c.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    Some(cmd)
}

/// Run one container to completion and return its exit code.
async fn run_container(
    state: &MemoryCluster,
    workload: &str,
    c: &ContainerSpec,
    cancel: &CancellationToken,
) -> i32 {
    let terminate = |exit_code: i32| {
        let _ = state.set_container_state(workload, &c.name, ContainerState::Terminated { exit_code });
        exit_code
    };

    let Some(mut cmd) = command(c) else {
        let _ = state.append_log(workload, &c.name, "nothing to run");
        return terminate(NOT_STARTED);
    };
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = state.append_log(workload, &c.name, &format!("cannot start container: {e}"));
            return terminate(NOT_STARTED);
        }
    };
    if state
        .set_container_state(workload, &c.name, ContainerState::Running)
        .is_err()
    {
        let _ = child.start_kill();
        return KILLED;
    }
    trace!(target: "tern.exec.proc", workload, container = %c.name, "container running");

    let mut pumps = JoinSet::new();
    if let Some(out) = child.stdout.take() {
        pumps.spawn(pump(state.clone(), workload.to_string(), c.name.clone(), out));
    }
    if let Some(err) = child.stderr.take() {
        pumps.spawn(pump(state.clone(), workload.to_string(), c.name.clone(), err));
    }

    let code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => status.code().unwrap_or(KILLED),
            Err(e) => {
                warn!(target: "tern.exec.proc", workload, container = %c.name, error = %e, "wait failed");
                KILLED
            }
        },
        _ = cancel.cancelled() => {
            debug!(target: "tern.exec.proc", workload, container = %c.name, "cancelled; killing container");
            kill(&mut child).await;
            KILLED
        }
    };
    while pumps.join_next().await.is_some() {}

    terminate(code)
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(target: "tern.exec.proc", error = %e, "kill failed");
    }
}

async fn pump<R>(state: MemoryCluster, workload: String, container: String, out: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(out).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if state.append_log(&workload, &container, &line).is_err() {
            break;
        }
    }
}
