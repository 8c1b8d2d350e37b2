//! JSON snapshot [`WatchlistStore`] backend.
//!
//! Persists the watchlist as a single JSON document on disk. Writes go to a temp file in
//! the same directory followed by an atomic rename, so a crash midway never corrupts
//! previously committed rows.

use super::{BulkReport, WatchlistStore};
use crate::{
    entry::{CoinId, WatchlistEntry},
    error::StorageError,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// File-backed store holding the watchlist as one JSON array keyed by coin id in memory.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serialises read-modify-write cycles; reads of the published file stay lock-free.
    write_guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<Vec<WatchlistEntry>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(StorageError::from(err)),
        }
    }

    async fn write_entries(&self, entries: &[WatchlistEntry]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), rows = entries.len(), "watchlist snapshot written");
        Ok(())
    }
}

#[async_trait]
impl WatchlistStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<WatchlistEntry>, StorageError> {
        self.read_entries().await
    }

    async fn save(&self, entries: &[WatchlistEntry]) -> Result<BulkReport, StorageError> {
        let _guard = self.write_guard.lock().await;

        let mut current = self.read_entries().await?;
        for entry in entries {
            match current.iter_mut().find(|existing| existing.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => current.push(entry.clone()),
            }
        }
        self.write_entries(&current).await?;

        Ok(BulkReport::all_committed(entries.iter().map(|entry| entry.id)))
    }

    async fn delete(&self, ids: &[CoinId]) -> Result<BulkReport, StorageError> {
        let _guard = self.write_guard.lock().await;

        let mut current = self.read_entries().await?;
        current.retain(|entry| !ids.contains(&entry.id));
        self.write_entries(&current).await?;

        Ok(BulkReport::all_committed(ids.iter().copied()))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        self.write_entries(&[]).await
    }
}
