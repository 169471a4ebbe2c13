use async_trait::async_trait;
use taskvisor::{Event, EventKind, Subscribe};
use tracing::{debug, error, info, trace, warn};

const TARGET: &str = "tern.observe.tasks";

/// Writes supervisor events (watch sessions, housekeeping, workloads) to the log.
#[derive(Default)]
pub struct TaskJournal;

impl TaskJournal {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for TaskJournal {
    async fn on_event(&self, event: &Event) {
        log_task_event(event);
    }
    fn name(&self) -> &'static str {
        "tern-task-journal"
    }
    fn queue_capacity(&self) -> usize {
        1024
    }
}

pub fn log_task_event(e: &Event) {
    let task = e.task.as_deref().unwrap_or("unknown");
    let reason = e.reason.as_deref().unwrap_or("none");
    let attempt = e.attempt.unwrap_or(0);

    match e.kind {
        EventKind::TaskStarting => debug!(target: TARGET, task, attempt, "task starting"),
        EventKind::TaskStopped => trace!(target: TARGET, task, "task stopped"),
        EventKind::TaskFailed => warn!(target: TARGET, task, attempt, reason, "task failed"),
        EventKind::TimeoutHit => warn!(target: TARGET, task, "task timed out"),
        EventKind::BackoffScheduled => debug!(
            target: TARGET,
            task,
            attempt,
            delay_ms = e.delay_ms.unwrap_or(0),
            "task restart scheduled"
        ),
        EventKind::ActorExhausted => debug!(target: TARGET, task, reason, "task will not run again"),
        EventKind::ActorDead => error!(target: TARGET, task, reason, "task terminated permanently"),
        EventKind::ControllerRejected => warn!(target: TARGET, task, reason, "task submission rejected"),
        EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
            error!(target: TARGET, task, reason, "event subscriber failed")
        }
        EventKind::ShutdownRequested => info!(target: TARGET, "supervisor shutdown requested"),
        EventKind::GraceExceeded => warn!(target: TARGET, "tasks did not stop within grace"),
        _ => trace!(target: TARGET, task, kind = ?e.kind, "supervisor event"),
    }
}
