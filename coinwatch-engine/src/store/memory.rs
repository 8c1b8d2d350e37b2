//! In-memory [`WatchlistStore`] backend.
//!
//! Primary backend for tests: supports injectable hard failures and per-id rejections so
//! the coordinator's abort and partial-failure paths can be exercised deterministically.

use super::{BulkReport, WatchlistStore};
use crate::{
    entry::{CoinId, WatchlistEntry},
    error::StorageError,
};
use async_trait::async_trait;
use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Faults {
    fail_writes: bool,
    reject_ids: FnvHashSet<CoinId>,
}

/// Keyed in-memory store with fault injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<FnvHashMap<CoinId, WatchlistEntry>>,
    faults: Mutex<Faults>,
    write_ops: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, as if the rows had been persisted in an earlier session.
    pub fn seeded(entries: impl IntoIterator<Item = WatchlistEntry>) -> Self {
        let store = Self::new();
        {
            let mut rows = store.rows.lock();
            for entry in entries {
                rows.insert(entry.id, entry);
            }
        }
        store
    }

    /// Make every subsequent write fail hard with a [`StorageError::Backend`].
    pub fn fail_writes(&self, fail: bool) {
        self.faults.lock().fail_writes = fail;
    }

    /// Reject the given ids on subsequent writes, committing the rest of each batch.
    pub fn reject_ids(&self, ids: impl IntoIterator<Item = CoinId>) {
        self.faults.lock().reject_ids = ids.into_iter().collect();
    }

    /// Number of write calls (`save`/`delete`/`clear`) that reached the backend.
    pub fn write_ops(&self) -> usize {
        self.write_ops.load(Ordering::Relaxed)
    }

    pub fn contains(&self, id: CoinId) -> bool {
        self.rows.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    fn check_hard_failure(&self) -> Result<(), StorageError> {
        if self.faults.lock().fail_writes {
            return Err(StorageError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WatchlistStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<WatchlistEntry>, StorageError> {
        Ok(self.rows.lock().values().cloned().collect())
    }

    async fn save(&self, entries: &[WatchlistEntry]) -> Result<BulkReport, StorageError> {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        self.check_hard_failure()?;

        let rejected: FnvHashSet<CoinId> = self.faults.lock().reject_ids.clone();
        let mut report = BulkReport::default();
        let mut rows = self.rows.lock();
        for entry in entries {
            if rejected.contains(&entry.id) {
                report.rejected.push(entry.id);
            } else {
                rows.insert(entry.id, entry.clone());
                report.committed.push(entry.id);
            }
        }
        Ok(report)
    }

    async fn delete(&self, ids: &[CoinId]) -> Result<BulkReport, StorageError> {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        self.check_hard_failure()?;

        let rejected: FnvHashSet<CoinId> = self.faults.lock().reject_ids.clone();
        let mut report = BulkReport::default();
        let mut rows = self.rows.lock();
        for id in ids {
            if rejected.contains(id) {
                report.rejected.push(*id);
            } else {
                rows.remove(id);
                report.committed.push(*id);
            }
        }
        Ok(report)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        self.check_hard_failure()?;
        self.rows.lock().clear();
        Ok(())
    }
}
