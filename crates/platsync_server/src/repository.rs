//! Canonical platform store.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use platsync_protocol::{NewPlatform, PlatformId, PlatformRecord};
use std::sync::Arc;

/// Storage for the owner's platform records.
pub trait PlatformRepository: Send + Sync {
    /// Returns every record in identifier order.
    fn all(&self) -> ServerResult<Vec<PlatformRecord>>;

    /// Returns one record.
    fn get(&self, id: PlatformId) -> ServerResult<Option<PlatformRecord>>;

    /// Stores a new record and assigns its identifier.
    fn create(&self, platform: NewPlatform) -> ServerResult<PlatformRecord>;

    /// Returns true if no record exists.
    fn is_empty(&self) -> ServerResult<bool>;

    /// Stores `platforms` only if the store is empty, as one atomic step.
    ///
    /// Returns the created records; empty if the store already had data.
    fn create_all_if_empty(&self, platforms: Vec<NewPlatform>)
        -> ServerResult<Vec<PlatformRecord>>;
}

impl<R: PlatformRepository + ?Sized> PlatformRepository for Arc<R> {
    fn all(&self) -> ServerResult<Vec<PlatformRecord>> {
        (**self).all()
    }

    fn get(&self, id: PlatformId) -> ServerResult<Option<PlatformRecord>> {
        (**self).get(id)
    }

    fn create(&self, platform: NewPlatform) -> ServerResult<PlatformRecord> {
        (**self).create(platform)
    }

    fn is_empty(&self) -> ServerResult<bool> {
        (**self).is_empty()
    }

    fn create_all_if_empty(
        &self,
        platforms: Vec<NewPlatform>,
    ) -> ServerResult<Vec<PlatformRecord>> {
        (**self).create_all_if_empty(platforms)
    }
}

/// In-memory platform store. Identifiers start at 1.
pub struct MemoryPlatformRepository {
    inner: RwLock<MemoryState>,
}

struct MemoryState {
    records: Vec<PlatformRecord>,
    next_id: PlatformId,
}

impl MemoryState {
    fn insert(&mut self, platform: NewPlatform) -> ServerResult<PlatformRecord> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| ServerError::Repository("identifier space exhausted".into()))?;
        let record = platform.into_record(id);
        self.records.push(record.clone());
        Ok(record)
    }
}

impl MemoryPlatformRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryState {
                records: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Returns the number of records.
    pub fn record_count(&self) -> usize {
        self.inner.read().records.len()
    }
}

impl Default for MemoryPlatformRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformRepository for MemoryPlatformRepository {
    fn all(&self) -> ServerResult<Vec<PlatformRecord>> {
        Ok(self.inner.read().records.clone())
    }

    fn get(&self, id: PlatformId) -> ServerResult<Option<PlatformRecord>> {
        Ok(self
            .inner
            .read()
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    fn create(&self, platform: NewPlatform) -> ServerResult<PlatformRecord> {
        self.inner.write().insert(platform)
    }

    fn is_empty(&self) -> ServerResult<bool> {
        Ok(self.inner.read().records.is_empty())
    }

    fn create_all_if_empty(
        &self,
        platforms: Vec<NewPlatform>,
    ) -> ServerResult<Vec<PlatformRecord>> {
        let mut state = self.inner.write();
        if !state.records.is_empty() {
            return Ok(Vec::new());
        }
        platforms
            .into_iter()
            .map(|platform| state.insert(platform))
            .collect()
    }
}
