//! Taskvisor runtime hosting the executor loops and process workloads.
//!
//! Restarts and reconnect backoff are left to the supervisor; the
//! [`WatchMonitor`] subscriber turns repeated watch failures into an
//! escalated error.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use taskvisor::{
    SupervisorConfig, ControllerConfig, ControllerSpec, Event, EventKind, Subscribe,
    Supervisor, TaskSpec,
};
use tern_core::{ErrorHandler, ReportedError};
use tracing::{debug, error, info};

use crate::{config::ExecutorConfig, error::SupervisorError};

const LOG_TARGET: &str = "tern.exec.supervise";

/// Task name of the executor watch session.
pub const WATCH_TASK: &str = "tern-exec-watch";
/// Task name of the executor housekeeping loop.
pub const HOUSEKEEPING_TASK: &str = "tern-exec-housekeeping";

/// Running taskvisor supervisor. Every task is admitted through the
/// controller; the slot is the task name.
pub struct TaskSupervisor {
    sup: Arc<Supervisor>,
}

impl TaskSupervisor {
    /// Build the supervisor, run it in the background and wait until it
    /// accepts submissions.
    pub async fn start(subscribers: Vec<Arc<dyn Subscribe>>) -> Arc<Self> {
        let sup = Supervisor::builder(SupervisorConfig::default())
            .with_controller(ControllerConfig::default())
            .with_subscribers(subscribers)
            .build();

        let runner = Arc::clone(&sup);
        tokio::spawn(async move {
            let _ = runner.run(Vec::new()).await;
        });
        sup.wait_ready().await;

        info!(target: LOG_TARGET, "task supervisor is ready");
        Arc::new(Self { sup })
    }

    /// Submit `spec`, replacing whatever runs under the same name.
    pub async fn submit(&self, name: &str, spec: TaskSpec) -> Result<(), SupervisorError> {
        debug!(target: LOG_TARGET, task = name, "submitting task");
        self.sup
            .submit(ControllerSpec::replace(spec))
            .await
            .map_err(|e| SupervisorError {
                task: name.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Counts failed watch sessions and escalates every
/// `reconnect_escalate_after` consecutive failures.
pub struct WatchMonitor {
    escalate_after: u32,
    failures: AtomicU32,
    on_error: ErrorHandler,
}

impl WatchMonitor {
    pub fn new(cfg: &ExecutorConfig) -> Self {
        Self {
            escalate_after: cfg.reconnect_escalate_after.max(1),
            failures: AtomicU32::new(0),
            on_error: Arc::new(|e| error!(target: LOG_TARGET, error = %e, "executor error")),
        }
    }

    pub fn with_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(ReportedError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(f);
        self
    }

    /// A watch session was established; the failure streak starts over.
    pub fn connected(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    fn failed(&self, reason: &str) {
        let attempts = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if attempts % self.escalate_after == 0 {
            (self.on_error)(ReportedError::WatchDisconnected {
                attempts,
                reason: reason.to_string(),
            });
        }
    }
}

#[async_trait]
impl Subscribe for WatchMonitor {
    async fn on_event(&self, event: &Event) {
        if event.task.as_deref() != Some(WATCH_TASK) {
            return;
        }
        if matches!(event.kind, EventKind::TaskFailed) {
            self.failed(event.reason.as_deref().unwrap_or("unknown"));
        }
    }

    fn name(&self) -> &'static str {
        "tern-watch-monitor"
    }

    fn queue_capacity(&self) -> usize {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn monitor(escalate_after: u32) -> (WatchMonitor, Arc<Mutex<Vec<String>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let cfg = ExecutorConfig {
            reconnect_escalate_after: escalate_after,
            ..Default::default()
        };
        let m = WatchMonitor::new(&cfg)
            .with_error_handler(move |e| sink.lock().unwrap().push(e.to_string()));
        (m, errors)
    }

    #[test]
    fn escalates_every_nth_failure() {
        let (m, errors) = monitor(2);
        for _ in 0..5 {
            m.failed("connection refused");
        }
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("connection refused"), "{}", errors[0]);
        assert_eq!(m.failures(), 5);
    }

    #[test]
    fn connecting_resets_the_streak() {
        let (m, errors) = monitor(3);
        m.failed("a");
        m.failed("b");
        m.connected();
        m.failed("c");
        m.failed("d");
        assert!(errors.lock().unwrap().is_empty());
        m.failed("e");
        assert_eq!(errors.lock().unwrap().len(), 1);
    }
}
