//! Batch mutation coordinator.
//!
//! Executes multi-item add/remove as one transactional unit: validate, write to the
//! durable store, apply the confirmed subset to the cache atomically, then publish a
//! single event. A hard storage failure aborts with the cache untouched; per-row
//! rejections are best-effort by design (recoverable per item, not systemic) and are
//! reported back to the caller.

use crate::{
    bus::{NotificationBus, WatchlistEvent},
    cache::WatchlistCache,
    entry::{Coin, CoinId, WatchlistEntry},
    error::{MutationError, ValidationError, WatchlistError},
    store::WatchlistStore,
};
use chrono::Utc;
use fnv::FnvHashSet;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{error, info};

/// Request for one batch mutation. Transient - exists only for the duration of one
/// [`BatchCoordinator::execute`] call.
///
/// A single intent may carry both adds and removes (one modal confirmation, or one
/// coalesced toggle flush, is one transactional batch).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MutationIntent {
    pub adds: Vec<Coin>,
    pub removes: Vec<CoinId>,
}

impl MutationIntent {
    pub fn add(coins: impl IntoIterator<Item = Coin>) -> Self {
        Self {
            adds: coins.into_iter().collect(),
            removes: Vec::new(),
        }
    }

    pub fn remove(ids: impl IntoIterator<Item = CoinId>) -> Self {
        Self {
            adds: Vec::new(),
            removes: ids.into_iter().collect(),
        }
    }

    pub fn new(
        adds: impl IntoIterator<Item = Coin>,
        removes: impl IntoIterator<Item = CoinId>,
    ) -> Self {
        Self {
            adds: adds.into_iter().collect(),
            removes: removes.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }
}

/// What a committed batch did, as carried on the notification bus.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MutationAction {
    Add,
    Remove,
    Mixed,
}

/// One entry of a batch that did not commit.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FailedMutation {
    pub id: CoinId,
    pub error: MutationError,
}

/// Outcome of one batch mutation.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct BatchOutcome {
    /// Entries that committed to both store and cache.
    pub succeeded: usize,
    /// Entries rejected by validation or by the storage backend.
    pub failed: Vec<FailedMutation>,
}

/// Coordinates batch mutations across the durable store, the cache, and the bus.
#[derive(Clone)]
pub struct BatchCoordinator {
    store: Arc<dyn WatchlistStore>,
    cache: Arc<WatchlistCache>,
    bus: NotificationBus,
}

impl BatchCoordinator {
    pub fn new(
        store: Arc<dyn WatchlistStore>,
        cache: Arc<WatchlistCache>,
        bus: NotificationBus,
    ) -> Self {
        Self { store, cache, bus }
    }

    /// Execute one batch mutation.
    ///
    /// Invalid entries (empty symbol/name, duplicate id within the batch) are rejected
    /// per-entry before any write; the valid subset proceeds. Removing an id that is not
    /// watchlisted is a no-op, not an error; re-adding a watchlisted id refreshes the
    /// stored row without counting as a change. The cache is only touched after the
    /// store confirms, and the single `WatchlistChanged` event is published strictly
    /// after the cache swap is visible.
    pub async fn execute(&self, intent: MutationIntent) -> Result<BatchOutcome, WatchlistError> {
        let mut failed = Vec::new();

        // Reject every occurrence after the first of an id duplicated within the batch.
        let duplicate_ids: FnvHashSet<CoinId> =
            intent.adds.iter().map(|coin| coin.id).duplicates().collect();
        let mut seen = FnvHashSet::default();

        let mut valid_adds = Vec::with_capacity(intent.adds.len());
        for coin in intent.adds {
            if let Err(validation) = coin.validate() {
                failed.push(FailedMutation {
                    id: coin.id,
                    error: MutationError::Validation(validation),
                });
            } else if duplicate_ids.contains(&coin.id) && !seen.insert(coin.id) {
                failed.push(FailedMutation {
                    id: coin.id,
                    error: MutationError::Validation(ValidationError::DuplicateInBatch),
                });
            } else {
                valid_adds.push(coin);
            }
        }

        // Removes of absent ids are no-ops: not errors, not counted as succeeded.
        let removes: Vec<CoinId> = intent
            .removes
            .into_iter()
            .unique()
            .filter(|id| self.cache.is_watchlisted(*id))
            .collect();

        if valid_adds.is_empty() && removes.is_empty() {
            return Ok(BatchOutcome {
                succeeded: 0,
                failed,
            });
        }

        let added_at = Utc::now();
        let entries: Vec<WatchlistEntry> = valid_adds
            .into_iter()
            .map(|coin| WatchlistEntry::new(coin, added_at))
            .collect();

        // Store first. A hard failure here aborts with the cache untouched.
        let mut committed_adds: Vec<WatchlistEntry> = Vec::new();
        if !entries.is_empty() {
            let report = self.store.save(&entries).await.map_err(|err| {
                error!(%err, adds = entries.len(), "watchlist batch save failed");
                WatchlistError::Storage(err)
            })?;

            let confirmed: FnvHashSet<CoinId> = report.committed.into_iter().collect();
            for entry in entries {
                if confirmed.contains(&entry.id) {
                    committed_adds.push(entry);
                } else {
                    failed.push(FailedMutation {
                        id: entry.id,
                        error: MutationError::Rejected,
                    });
                }
            }
        }

        let mut committed_removes: Vec<CoinId> = Vec::new();
        if !removes.is_empty() {
            match self.store.delete(&removes).await {
                Ok(report) => {
                    committed_removes = report.committed;
                    failed.extend(report.rejected.into_iter().map(|id| FailedMutation {
                        id,
                        error: MutationError::Rejected,
                    }));
                }
                // Adds already committed durably: report the removes as failed instead
                // of aborting, so the caller sees the partial outcome.
                Err(err) if !committed_adds.is_empty() => {
                    error!(%err, removes = removes.len(), "watchlist batch delete failed after save");
                    failed.extend(removes.into_iter().map(|id| FailedMutation {
                        id,
                        error: MutationError::Storage(err.clone()),
                    }));
                }
                Err(err) => {
                    error!(%err, removes = removes.len(), "watchlist batch delete failed");
                    return Err(WatchlistError::Storage(err));
                }
            }
        }

        // Apply the confirmed subset to the cache as one atomic swap. The cache reports
        // which ids actually changed membership: a re-add refreshes the stored row in
        // place and is not a change.
        let applied = self.cache.apply(committed_adds, &committed_removes);

        let action = match (applied.added.is_empty(), applied.removed.is_empty()) {
            (false, true) => Some(MutationAction::Add),
            (true, false) => Some(MutationAction::Remove),
            (false, false) => Some(MutationAction::Mixed),
            (true, true) => None,
        };

        let mut affected = applied.added;
        affected.extend(applied.removed);

        if let Some(action) = action {
            info!(
                ?action,
                affected = affected.len(),
                failed = failed.len(),
                "watchlist batch committed"
            );
            // Published strictly after the cache swap above is visible.
            self.bus.publish(WatchlistEvent::WatchlistChanged {
                action,
                affected: affected.clone(),
            });
        }

        Ok(BatchOutcome {
            succeeded: affected.len(),
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::sync::broadcast::error::TryRecvError;

    fn coordinator() -> (Arc<MemoryStore>, Arc<WatchlistCache>, BatchCoordinator, NotificationBus)
    {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(WatchlistCache::from_entries(Vec::new()));
        let bus = NotificationBus::default();
        let coordinator = BatchCoordinator::new(
            Arc::clone(&store) as Arc<dyn WatchlistStore>,
            Arc::clone(&cache),
            bus.clone(),
        );
        (store, cache, coordinator, bus)
    }

    fn coin(id: u64, symbol: &str) -> Coin {
        Coin::new(id, symbol, symbol, id as u32)
    }

    #[tokio::test]
    async fn test_add_batch_commits_store_cache_and_event() {
        let (store, cache, coordinator, bus) = coordinator();
        let mut subscription = bus.subscribe();

        let outcome = coordinator
            .execute(MutationIntent::add([coin(1, "BTC"), coin(2, "ETH")]))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 2);
        assert!(outcome.failed.is_empty());
        assert!(store.contains(CoinId(1)) && store.contains(CoinId(2)));
        assert!(cache.is_watchlisted(CoinId(1)) && cache.is_watchlisted(CoinId(2)));

        let event = subscription.recv().await.unwrap();
        match event {
            WatchlistEvent::WatchlistChanged { action, affected } => {
                assert_eq!(action, MutationAction::Add);
                assert_eq!(affected.len(), 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_entries_rejected_valid_subset_commits() {
        let (_, cache, coordinator, _) = coordinator();

        let mut batch = vec![
            coin(1, "BTC"),
            coin(2, "ETH"),
            coin(3, "SOL"),
            coin(4, "ADA"),
            coin(5, "DOT"),
        ];
        batch.push(coin(6, ""));

        let outcome = coordinator
            .execute(MutationIntent::add(batch))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 5);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, CoinId(6));
        assert_eq!(
            outcome.failed[0].error,
            MutationError::Validation(ValidationError::EmptySymbol)
        );
        assert_eq!(cache.len(), 5);
        assert!(!cache.is_watchlisted(CoinId(6)));
    }

    #[tokio::test]
    async fn test_duplicate_id_within_batch_first_occurrence_wins() {
        let (_, cache, coordinator, _) = coordinator();

        let outcome = coordinator
            .execute(MutationIntent::add([
                coin(1, "BTC"),
                Coin::new(1u64, "WBTC", "Wrapped Bitcoin", 20),
            ]))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(
            outcome.failed[0].error,
            MutationError::Validation(ValidationError::DuplicateInBatch)
        );
        assert_eq!(cache.get(CoinId(1)).unwrap().symbol, "BTC");
    }

    #[tokio::test]
    async fn test_remove_absent_id_is_noop_without_event() {
        let (store, _, coordinator, bus) = coordinator();
        let mut subscription = bus.subscribe();
        let writes_before = store.write_ops();

        let outcome = coordinator
            .execute(MutationIntent::remove([CoinId(9)]))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 0);
        assert!(outcome.failed.is_empty());
        assert_eq!(store.write_ops(), writes_before);
        assert_eq!(subscription.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_readd_refreshes_row_without_counting_as_change() {
        let (store, cache, coordinator, bus) = coordinator();

        coordinator
            .execute(MutationIntent::add([coin(1, "BTC")]))
            .await
            .unwrap();

        let mut subscription = bus.subscribe();
        let outcome = coordinator
            .execute(MutationIntent::add([Coin::new(1u64, "BTC", "Bitcoin", 2)]))
            .await
            .unwrap();

        // Membership did not change: nothing succeeded, nothing failed, no event.
        assert_eq!(outcome.succeeded, 0);
        assert!(outcome.failed.is_empty());
        assert_eq!(subscription.try_recv(), Err(TryRecvError::Empty));

        // The row itself was still refreshed in store and cache.
        assert!(store.contains(CoinId(1)));
        assert_eq!(cache.get(CoinId(1)).unwrap().rank, 2);
    }

    #[tokio::test]
    async fn test_hard_storage_failure_leaves_cache_untouched() {
        let (store, cache, coordinator, bus) = coordinator();
        let mut subscription = bus.subscribe();
        store.fail_writes(true);

        let actual = coordinator
            .execute(MutationIntent::add([coin(1, "BTC")]))
            .await;

        assert!(matches!(actual, Err(WatchlistError::Storage(_))));
        assert!(cache.is_empty());
        assert_eq!(subscription.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_partial_storage_rejection_applies_confirmed_subset() {
        let (store, cache, coordinator, _) = coordinator();
        store.reject_ids([CoinId(2)]);

        let outcome = coordinator
            .execute(MutationIntent::add([coin(1, "BTC"), coin(2, "ETH")]))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, CoinId(2));
        assert_eq!(outcome.failed[0].error, MutationError::Rejected);
        assert!(cache.is_watchlisted(CoinId(1)));
        assert!(!cache.is_watchlisted(CoinId(2)));
    }

    #[tokio::test]
    async fn test_mixed_batch_publishes_mixed_action() {
        let (_, _, coordinator, bus) = coordinator();

        coordinator
            .execute(MutationIntent::add([coin(1, "BTC")]))
            .await
            .unwrap();

        let mut subscription = bus.subscribe();
        let outcome = coordinator
            .execute(MutationIntent::new([coin(2, "ETH")], [CoinId(1)]))
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, 2);

        match subscription.recv().await.unwrap() {
            WatchlistEvent::WatchlistChanged { action, affected } => {
                assert_eq!(action, MutationAction::Mixed);
                assert_eq!(affected.len(), 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
