//! Named monotonic counters used for sequential build numbers.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use crate::error::StoreError;

/// Atomic counter per named group.
pub trait NumberGroup: Send + Sync + 'static {
    /// Allocate the next number of `group`; the first allocation returns 0.
    fn next(&self, group: &str) -> Result<u64, StoreError>;

    /// Most recently allocated number of `group`, without allocating.
    fn latest(&self, group: &str) -> Result<u64, StoreError>;
}

/// In-memory number groups.
#[derive(Default)]
pub struct MemoryNumberGroup {
    groups: Mutex<HashMap<String, u64>>,
}

impl MemoryNumberGroup {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NumberGroup for MemoryNumberGroup {
    fn next(&self, group: &str) -> Result<u64, StoreError> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match groups.get(group) {
            Some(last) => last + 1,
            None => 0,
        };
        groups.insert(group.to_string(), next);
        Ok(next)
    }

    fn latest(&self, group: &str) -> Result<u64, StoreError> {
        let groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        groups
            .get(group)
            .copied()
            .ok_or_else(|| StoreError::NotFound(group.to_string()))
    }
}
