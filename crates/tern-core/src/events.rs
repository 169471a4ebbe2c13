//! In-process fan-out of job status transitions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tern_model::{FilterExpression, JobStatus, filter};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

struct Subscriber {
    id: Uuid,
    filter: Vec<FilterExpression>,
    tx: mpsc::UnboundedSender<JobStatus>,
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Typed publish/subscribe registry of `(filter, channel)` pairs.
///
/// Publishing never waits for subscribers. Each subscriber sees statuses in
/// publish order; there is no ordering across subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `status` to every live subscriber whose filter matches.
    /// Returns the number of deliveries.
    pub fn publish(&self, status: &JobStatus) -> usize {
        let mut subs = self.inner.lock();
        subs.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        for s in subs.iter() {
            if filter::matches(status, &s.filter) && s.tx.send(status.clone()).is_ok() {
                delivered += 1;
            }
        }
        trace!(job = %status.name, phase = %status.phase, delivered, "status published");
        delivered
    }

    /// Live stream of matching statuses; dropping it unsubscribes.
    pub fn subscribe(&self, filter: Vec<FilterExpression>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.inner.lock().push(Subscriber { id, filter, tx });

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Handle of one subscriber.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<JobStatus>,
    bus: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next matching status; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<JobStatus> {
        self.rx.recv().await
    }

    /// Already delivered status, without waiting.
    pub fn try_recv(&mut self) -> Option<JobStatus> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.lock().retain(|s| s.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tern_model::{JobMetadata, JobPhase, Trigger, filter::parse};
    use tokio::time::timeout;

    fn status(name: &str, phase: JobPhase) -> JobStatus {
        JobStatus::new(name, JobMetadata::new("alice", Trigger::Manual)).with_phase(phase)
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(Vec::new());

        for phase in [JobPhase::Preparing, JobPhase::Running, JobPhase::Done] {
            bus.publish(&status("a.0", phase));
        }

        for phase in [JobPhase::Preparing, JobPhase::Running, JobPhase::Done] {
            let got = timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
            assert_eq!(got.phase, phase);
        }
    }

    #[tokio::test]
    async fn filters_per_subscriber() {
        let bus = EventBus::new();
        let done = vec![FilterExpression::new(parse(&["phase==done"]).unwrap())];
        let mut only_done = bus.subscribe(done);
        let mut all = bus.subscribe(Vec::new());

        assert_eq!(bus.publish(&status("a.0", JobPhase::Running)), 1);
        assert_eq!(bus.publish(&status("a.0", JobPhase::Done)), 2);

        assert_eq!(all.recv().await.unwrap().phase, JobPhase::Running);
        assert_eq!(all.recv().await.unwrap().phase, JobPhase::Done);
        assert_eq!(only_done.recv().await.unwrap().phase, JobPhase::Done);
    }

    #[tokio::test]
    async fn dropping_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Vec::new());
        let _other = bus.subscribe(Vec::new());
        assert_eq!(bus.subscriber_count(), 2);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(&status("a.0", JobPhase::Done)), 1);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&status("a.0", JobPhase::Done)), 0);
    }
}
