//! Durable persistence for the watchlist.
//!
//! The engine talks to storage exclusively through the [`WatchlistStore`] seam, so the
//! backend is swappable (JSON snapshot on disk, in-memory for tests, or any keyed store).
//! Every operation is all-or-nothing for the rows it touches: a failure midway must leave
//! previously committed rows intact.

use crate::{
    entry::{CoinId, WatchlistEntry},
    error::StorageError,
};
use async_trait::async_trait;

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Per-row outcome of a bulk write.
///
/// A backend that can reject individual rows (duplicate keys, constraint violations)
/// reports them here rather than failing the whole call; the coordinator then applies
/// only the committed subset to the cache and reports the rejected ids to the caller.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct BulkReport {
    pub committed: Vec<CoinId>,
    pub rejected: Vec<CoinId>,
}

impl BulkReport {
    /// Report with every id committed and none rejected.
    pub fn all_committed(ids: impl IntoIterator<Item = CoinId>) -> Self {
        Self {
            committed: ids.into_iter().collect(),
            rejected: Vec::new(),
        }
    }
}

/// Durable keyed store for [`WatchlistEntry`] rows, keyed by [`CoinId`].
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Load every persisted entry. Called once at cold start, before any read is served.
    async fn load_all(&self) -> Result<Vec<WatchlistEntry>, StorageError>;

    /// Insert or replace the given entries.
    async fn save(&self, entries: &[WatchlistEntry]) -> Result<BulkReport, StorageError>;

    /// Delete the rows for the given ids. Absent ids are not an error.
    async fn delete(&self, ids: &[CoinId]) -> Result<BulkReport, StorageError>;

    /// Remove every persisted entry.
    async fn clear(&self) -> Result<(), StorageError>;
}
