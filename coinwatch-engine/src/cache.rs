//! In-memory watchlist cache.
//!
//! Owns the authoritative in-memory snapshot: an O(1) index over the durable store plus a
//! memoized ordered projection. All mutation goes through the batch coordinator or the
//! refresh loop; readers get copy-on-write snapshots and never observe a partially
//! applied batch.

use crate::{
    entry::{CoinId, WatchlistEntry},
    quote::QuoteUpdate,
    view::ViewSpec,
};
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::warn;

/// Immutable point-in-time view of the watchlist map.
#[derive(Debug, Default)]
struct Snapshot {
    entries: FnvHashMap<CoinId, Arc<WatchlistEntry>>,
    version: u64,
}

/// Memoized ordered projection of a [`Snapshot`] under one [`ViewSpec`].
#[derive(Debug)]
struct Projection {
    view: ViewSpec,
    version: u64,
    rows: Arc<[Arc<WatchlistEntry>]>,
}

/// Net effect of an atomic batch apply, as seen by the cache.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub(crate) struct AppliedBatch {
    pub added: Vec<CoinId>,
    pub removed: Vec<CoinId>,
}

/// Copy-on-write cache over the durable store.
///
/// Writers build the next map outside the read path (serialised by a writer mutex) and
/// atomically swap the published `Arc`, so `is_watchlisted`/`get` reads proceed against
/// the previous snapshot while a write is in flight.
#[derive(Debug, Default)]
pub struct WatchlistCache {
    shared: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    projection: Mutex<Option<Projection>>,
}

impl WatchlistCache {
    /// Cache populated from the durable store's rows (cold start).
    pub fn from_entries(entries: Vec<WatchlistEntry>) -> Self {
        let mut map = FnvHashMap::default();
        for entry in entries {
            if let Some(previous) = map.insert(entry.id, Arc::new(entry)) {
                warn!(id = %previous.id, "duplicate persisted watchlist row, keeping latest");
            }
        }

        Self {
            shared: RwLock::new(Arc::new(Snapshot {
                entries: map,
                version: 0,
            })),
            writer: Mutex::new(()),
            projection: Mutex::new(None),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.read())
    }

    /// O(1) membership test against the current snapshot.
    pub fn is_watchlisted(&self, id: CoinId) -> bool {
        self.current().entries.contains_key(&id)
    }

    /// O(1) lookup by id against the current snapshot.
    pub fn get(&self, id: CoinId) -> Option<Arc<WatchlistEntry>> {
        self.current().entries.get(&id).cloned()
    }

    /// Ids of every watchlisted coin, in no particular order.
    pub fn coin_ids(&self) -> Vec<CoinId> {
        self.current().entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().entries.is_empty()
    }

    /// Ordered projection of the watchlist under the given view.
    ///
    /// Memoized on `(view, snapshot version)`: the O(n log n) sort only runs when the
    /// view or the underlying map changed since the last call. Never touches storage.
    pub fn snapshot(&self, view: ViewSpec) -> Arc<[Arc<WatchlistEntry>]> {
        let snapshot = self.current();

        let mut memo = self.projection.lock();
        if let Some(projection) = memo.as_ref()
            && projection.view == view
            && projection.version == snapshot.version
        {
            return Arc::clone(&projection.rows);
        }

        let mut rows: Vec<Arc<WatchlistEntry>> = snapshot.entries.values().cloned().collect();
        rows.sort_unstable_by(|a, b| view.compare(a, b));
        let rows: Arc<[Arc<WatchlistEntry>]> = rows.into();

        *memo = Some(Projection {
            view,
            version: snapshot.version,
            rows: Arc::clone(&rows),
        });

        rows
    }

    /// Atomically apply a committed batch: all adds and removes become visible at once.
    ///
    /// Only the batch coordinator calls this, and only with rows the store confirmed.
    /// Re-adding a watchlisted id keeps the original `added_at` and latest quote.
    pub(crate) fn apply(&self, adds: Vec<WatchlistEntry>, removes: &[CoinId]) -> AppliedBatch {
        let _writer = self.writer.lock();

        let current = self.current();
        let mut next = current.entries.clone();
        let mut applied = AppliedBatch::default();

        for mut entry in adds {
            if let Some(existing) = next.get(&entry.id) {
                entry.added_at = existing.added_at;
                entry.latest_quote = existing.latest_quote.clone();
            } else {
                applied.added.push(entry.id);
            }
            next.insert(entry.id, Arc::new(entry));
        }

        for id in removes {
            if next.remove(id).is_some() {
                applied.removed.push(*id);
            }
        }

        self.publish(next, current.version);
        applied
    }

    /// Replace quotes for the given ids, returning exactly the ids whose market data
    /// materially changed (value comparison, ignoring the source timestamp).
    ///
    /// Ids absent from `updates` - and updates for coins no longer watchlisted - are
    /// ignored.
    pub(crate) fn replace_quotes(&self, updates: FnvHashMap<CoinId, QuoteUpdate>) -> Vec<CoinId> {
        let _writer = self.writer.lock();

        let current = self.current();
        let mut next = current.entries.clone();
        let mut changed = Vec::new();

        for (id, update) in updates {
            let Some(existing) = next.get(&id) else {
                continue;
            };

            let rank = update.rank.unwrap_or(existing.rank);
            let materially_changed = rank != existing.rank
                || match &existing.latest_quote {
                    Some(previous) => previous.materially_differs(&update.quote),
                    None => true,
                };

            let mut entry = (**existing).clone();
            entry.rank = rank;
            entry.latest_quote = Some(update.quote);
            next.insert(id, Arc::new(entry));

            if materially_changed {
                changed.push(id);
            }
        }

        if !changed.is_empty() {
            self.publish(next, current.version);
        }
        changed
    }

    fn publish(&self, entries: FnvHashMap<CoinId, Arc<WatchlistEntry>>, previous_version: u64) {
        let next = Arc::new(Snapshot {
            entries,
            version: previous_version.wrapping_add(1),
        });
        *self.shared.write() = next;
    }
}
