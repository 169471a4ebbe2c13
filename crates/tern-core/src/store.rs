use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use tern_model::{JobPage, JobQuery, JobStatus, filter};

use crate::error::StoreError;

/// Persistence of job status, one record per job name.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Insert or overwrite the record of `status.name`.
    async fn store(&self, status: JobStatus) -> Result<(), StoreError>;

    async fn get(&self, name: &str) -> Result<JobStatus, StoreError>;

    /// Matching jobs, newest first.
    async fn find(&self, query: &JobQuery) -> Result<JobPage<JobStatus>, StoreError>;
}

/// In-memory job store.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<HashMap<String, JobStatus>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn store(&self, status: JobStatus) -> Result<(), StoreError> {
        let mut jobs = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(status.name.clone(), status);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<JobStatus, StoreError> {
        let jobs = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// `total` reflects the count after filtering, before pagination.
    async fn find(&self, query: &JobQuery) -> Result<JobPage<JobStatus>, StoreError> {
        let jobs = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        let mut filtered: Vec<&JobStatus> = jobs
            .values()
            .filter(|js| filter::matches(js, &query.filter))
            .collect();
        filtered.sort_by(|a, b| {
            b.metadata
                .created
                .cmp(&a.metadata.created)
                .then_with(|| a.name.cmp(&b.name))
        });
        let total = filtered.len();

        let items = filtered
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(JobPage { items, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tern_model::{FilterExpression, JobMetadata, JobPhase, Trigger, filter::parse};

    fn job(name: &str, owner: &str, phase: JobPhase, age: u64) -> JobStatus {
        let mut md = JobMetadata::new(owner, Trigger::Push);
        md.created = UNIX_EPOCH + Duration::from_secs(1_000 - age);
        JobStatus::new(name, md).with_phase(phase)
    }

    async fn setup() -> MemoryJobStore {
        let store = MemoryJobStore::new();
        store.store(job("a.0", "alice", JobPhase::Done, 30)).await.unwrap();
        store.store(job("a.1", "alice", JobPhase::Running, 20)).await.unwrap();
        store.store(job("b.0", "bob", JobPhase::Preparing, 10)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn store_overwrites_by_name() {
        let store = setup().await;
        store.store(job("a.1", "alice", JobPhase::Done, 20)).await.unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("a.1").await.unwrap().phase, JobPhase::Done);
    }

    #[tokio::test]
    async fn get_unknown() {
        let store = setup().await;
        assert!(matches!(store.get("zzz").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn find_newest_first() {
        let store = setup().await;
        let page = store.find(&JobQuery::new()).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["b.0", "a.1", "a.0"]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn find_with_filter_and_pagination() {
        let store = setup().await;
        let filter = vec![FilterExpression::new(parse(&["owner==alice"]).unwrap())];
        let page = store
            .find(&JobQuery::new().with_filter(filter).with_limit(1).with_offset(1))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "a.0");
    }
}
