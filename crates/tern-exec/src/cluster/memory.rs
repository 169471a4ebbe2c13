use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tern_core::{LogError, LogStore, LogWriter, MemoryLogStore};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    cluster::{
        Cluster, ContainerState, LogStream, PodPhase, Selector, WatchEvent, Workload,
    },
    error::ClusterError,
};

const WATCH_BUFFER: usize = 1024;

struct Watcher {
    selector: Selector,
    tx: mpsc::Sender<WatchEvent>,
}

#[derive(Default)]
struct State {
    workloads: BTreeMap<String, Workload>,
    watchers: Vec<Watcher>,
    writers: HashMap<String, LogWriter>,
    version: u64,
    refuse_watches: bool,
    conflicts: u32,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    // A watcher that cannot keep up is dropped, which its owner sees as a disconnect.
    fn notify(&mut self, event: WatchEvent) {
        let labels = &event.workload().labels;
        self.watchers.retain(|w| {
            if !w.selector.matches(labels) {
                return !w.tx.is_closed();
            }
            w.tx.try_send(event.clone()).is_ok()
        });
    }

    fn modify<F>(&mut self, name: &str, f: F) -> Result<(), ClusterError>
    where
        F: FnOnce(&mut Workload),
    {
        let version = self.bump();
        let w = self
            .workloads
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))?;
        f(w);
        w.resource_version = version;
        let event = WatchEvent::Modified(w.clone());
        self.notify(event);
        Ok(())
    }
}

fn log_id(workload: &str, container: &str) -> String {
    format!("{workload}/{container}")
}

/// In-process cluster whose workloads change only when told to.
///
/// Besides the [`Cluster`] operations it exposes controls to move pods and
/// containers through their states, emit container output and break
/// watches.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<State>>,
    logs: Arc<MemoryLogStore>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a workload.
    pub fn workload(&self, name: &str) -> Option<Workload> {
        self.lock().workloads.get(name).cloned()
    }

    pub fn set_pod_phase(&self, name: &str, phase: PodPhase) -> Result<(), ClusterError> {
        self.lock().modify(name, |w| w.status.phase = phase)
    }

    /// Terminating a container ends its log stream.
    pub fn set_container_state(
        &self,
        name: &str,
        container: &str,
        state: ContainerState,
    ) -> Result<(), ClusterError> {
        let terminated = matches!(state, ContainerState::Terminated { .. });
        let mut st = self.lock();
        let mut found = false;
        st.modify(name, |w| {
            if let Some(c) = w.status.container_mut(container) {
                c.state = state;
                found = true;
            }
        })?;
        if !found {
            return Err(ClusterError::NotFound(format!("{name}/{container}")));
        }
        if terminated && let Some(writer) = st.writers.remove(&log_id(name, container)) {
            let _ = writer.close();
        }
        Ok(())
    }

    pub fn set_restart_count(&self, name: &str, container: &str, count: u32) -> Result<(), ClusterError> {
        self.lock().modify(name, |w| {
            if let Some(c) = w.status.container_mut(container) {
                c.restart_count = count;
            }
        })
    }

    /// Append one line of output to a running container.
    pub fn append_log(&self, name: &str, container: &str, line: &str) -> Result<(), ClusterError> {
        let st = self.lock();
        let writer = st
            .writers
            .get(&log_id(name, container))
            .ok_or_else(|| ClusterError::NotFound(format!("{name}/{container}")))?;
        writer
            .write(format!("{line}\n").as_bytes())
            .map_err(|e| ClusterError::Io(e.to_string()))
    }

    /// Close every open watch.
    pub fn disconnect_watches(&self) {
        let dropped = std::mem::take(&mut self.lock().watchers);
        debug!(watchers = dropped.len(), "watches disconnected");
    }

    /// While set, establishing a watch fails.
    pub fn refuse_watches(&self, refuse: bool) {
        self.lock().refuse_watches = refuse;
    }

    /// Fail the next `n` updates with `Conflict`.
    pub fn inject_conflicts(&self, n: u32) {
        self.lock().conflicts = n;
    }

    /// Remove a workload without telling any watcher.
    pub fn forget(&self, name: &str) -> Option<Workload> {
        let mut st = self.lock();
        st.writers.retain(|id, _| !id.starts_with(&format!("{name}/")));
        st.workloads.remove(name)
    }

    pub fn watcher_count(&self) -> usize {
        let mut st = self.lock();
        st.watchers.retain(|w| !w.tx.is_closed());
        st.watchers.len()
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn create(&self, mut workload: Workload) -> Result<Workload, ClusterError> {
        let mut st = self.lock();
        if st.workloads.contains_key(&workload.name) {
            return Err(ClusterError::AlreadyExists(workload.name));
        }

        for c in workload.spec.init_containers.iter().chain(workload.spec.containers.iter()) {
            let id = log_id(&workload.name, &c.name);
            let writer = self.logs.open(&id).map_err(|e| match e {
                LogError::AlreadyOpen(_) | LogError::Closed(_) => {
                    ClusterError::AlreadyExists(workload.name.clone())
                }
                other => ClusterError::Io(other.to_string()),
            })?;
            st.writers.insert(id, writer);
        }

        workload.resource_version = st.bump();
        workload.deletion_requested = false;
        st.workloads.insert(workload.name.clone(), workload.clone());
        st.notify(WatchEvent::Added(workload.clone()));
        trace!(workload = %workload.name, "workload created");
        Ok(workload)
    }

    async fn get(&self, name: &str) -> Result<Workload, ClusterError> {
        self.workload(name)
            .ok_or_else(|| ClusterError::NotFound(name.to_string()))
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<Workload>, ClusterError> {
        Ok(self
            .lock()
            .workloads
            .values()
            .filter(|w| selector.matches(&w.labels))
            .cloned()
            .collect())
    }

    async fn watch(&self, selector: &Selector) -> Result<mpsc::Receiver<WatchEvent>, ClusterError> {
        let mut st = self.lock();
        if st.refuse_watches {
            return Err(ClusterError::Disconnected("watch refused".into()));
        }
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        st.watchers.push(Watcher {
            selector: selector.clone(),
            tx,
        });
        Ok(rx)
    }

    async fn update(&self, workload: Workload) -> Result<Workload, ClusterError> {
        let mut st = self.lock();
        if st.conflicts > 0 {
            st.conflicts -= 1;
            return Err(ClusterError::Conflict(workload.name));
        }
        let current = st
            .workloads
            .get(&workload.name)
            .ok_or_else(|| ClusterError::NotFound(workload.name.clone()))?;
        if current.resource_version != workload.resource_version {
            return Err(ClusterError::Conflict(workload.name));
        }

        let Workload {
            name,
            labels,
            annotations,
            ..
        } = workload;
        st.modify(&name, |w| {
            w.labels = labels;
            w.annotations = annotations;
        })?;
        st.workloads
            .get(&name)
            .cloned()
            .ok_or(ClusterError::NotFound(name))
    }

    async fn delete(&self, name: &str) -> Result<(), ClusterError> {
        let mut st = self.lock();
        st.modify(name, |w| w.deletion_requested = true)?;

        let prefix = format!("{name}/");
        let ids: Vec<String> = st
            .writers
            .keys()
            .filter(|id| id.starts_with(&prefix))
            .cloned()
            .collect();
        for id in ids {
            if let Some(writer) = st.writers.remove(&id) {
                let _ = writer.close();
            }
        }

        if let Some(w) = st.workloads.remove(name) {
            st.notify(WatchEvent::Deleted(w));
        }
        trace!(workload = %name, "workload deleted");
        Ok(())
    }

    async fn logs(&self, workload: &str, container: &str) -> Result<LogStream, ClusterError> {
        let reader = self
            .logs
            .read(&log_id(workload, container))
            .map_err(|e| match e {
                LogError::NotFound(id) => ClusterError::NotFound(id),
                other => ClusterError::Io(other.to_string()),
            })?;
        Ok(Box::new(reader))
    }
}
