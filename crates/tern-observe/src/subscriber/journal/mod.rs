use tern_core::Subscription;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::subscriber::view::log_status;

/// Writes every published job status to the log.
pub struct Journal {
    sub: Subscription,
}

impl Journal {
    pub fn new(sub: Subscription) -> Self {
        Self { sub }
    }

    /// Log statuses until the bus goes away or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                status = self.sub.recv() => match status {
                    Some(status) => log_status(&status),
                    None => break,
                },
            }
        }
        debug!(target: "tern.observe.journal", "journal stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tern_core::EventBus;
    use tern_model::{JobMetadata, JobPhase, JobStatus, Trigger};

    #[tokio::test]
    async fn stops_when_bus_is_dropped() {
        let bus = EventBus::new();
        let journal = Journal::new(bus.subscribe(Vec::new()));
        let task = tokio::spawn(journal.run(CancellationToken::new()));

        let st = JobStatus::new("job.0", JobMetadata::new("alice", Trigger::Manual))
            .with_phase(JobPhase::Running);
        assert_eq!(bus.publish(&st), 1);
        drop(bus);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("journal did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Journal::new(bus.subscribe(Vec::new())).run(cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("journal did not stop")
            .unwrap();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
