//! Watchlist engine composition root.
//!
//! Explicitly constructed and dependency-injected (no global state): the application's
//! composition root builds one [`WatchlistEngine`] with a store and a quote source, holds
//! it for the process lifetime, and hands clones to every screen. The engine loads the
//! durable store into the cache before serving any read, so membership checks never
//! produce false negatives at launch.

use crate::{
    bus::{DEFAULT_BUS_CAPACITY, EventSubscription, NotificationBus},
    cache::WatchlistCache,
    debounce::{DEFAULT_DEBOUNCE_WINDOW, Debouncer},
    entry::{Coin, CoinId, WatchlistEntry},
    error::WatchlistError,
    mutation::{BatchCoordinator, BatchOutcome, MutationIntent},
    quote::QuoteSource,
    refresh::{RefreshConfig, RefreshHandle, RefreshLoop},
    store::WatchlistStore,
    view::ViewSpec,
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub refresh: RefreshConfig,
    pub debounce_window: Duration,
    pub bus_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh: RefreshConfig::default(),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Config with env overrides applied (currently the refresh interval).
    pub fn from_env() -> Self {
        Self {
            refresh: RefreshConfig::from_env(),
            ..Self::default()
        }
    }
}

/// Pending outcome for one rapidly-toggled coin: the latest intent wins.
#[derive(Debug, Clone, PartialEq)]
enum PendingToggle {
    Add(Coin),
    Remove,
}

/// The watchlist state & synchronization engine.
///
/// Cheap to clone; clones share the same cache, store, bus, and refresh loop.
#[derive(Clone)]
pub struct WatchlistEngine {
    cache: Arc<WatchlistCache>,
    coordinator: BatchCoordinator,
    bus: NotificationBus,
    refresh: Arc<RefreshHandle>,
    toggles: Arc<Mutex<FnvHashMap<CoinId, PendingToggle>>>,
    debouncer: Arc<Debouncer>,
}

impl WatchlistEngine {
    /// Build the engine: load the durable store into the cache, wire the coordinator and
    /// bus, and spawn the refresh loop.
    pub async fn init(
        store: Arc<dyn WatchlistStore>,
        source: Arc<dyn QuoteSource>,
        config: EngineConfig,
    ) -> Result<Self, WatchlistError> {
        let persisted = store.load_all().await?;
        info!(entries = persisted.len(), "watchlist loaded from store");

        let cache = Arc::new(WatchlistCache::from_entries(persisted));
        let bus = NotificationBus::new(config.bus_capacity);
        let coordinator = BatchCoordinator::new(store, Arc::clone(&cache), bus.clone());
        let refresh = RefreshLoop::spawn(
            Arc::clone(&cache),
            source,
            bus.clone(),
            config.refresh.clone(),
        );

        Ok(Self {
            cache,
            coordinator,
            bus,
            refresh: Arc::new(refresh),
            toggles: Arc::new(Mutex::new(FnvHashMap::default())),
            debouncer: Arc::new(Debouncer::new(config.debounce_window)),
        })
    }

    /// O(1) membership test against the current cache snapshot.
    pub fn is_watchlisted(&self, id: CoinId) -> bool {
        self.cache.is_watchlisted(id)
    }

    /// O(1) lookup against the current cache snapshot.
    pub fn get(&self, id: CoinId) -> Option<Arc<WatchlistEntry>> {
        self.cache.get(id)
    }

    /// Ordered, memoized projection of the watchlist under the given view.
    pub fn snapshot(&self, view: ViewSpec) -> Arc<[Arc<WatchlistEntry>]> {
        self.cache.snapshot(view)
    }

    /// Execute one batch mutation transactionally.
    pub async fn execute(&self, intent: MutationIntent) -> Result<BatchOutcome, WatchlistError> {
        self.coordinator.execute(intent).await
    }

    /// Toggle a coin's membership, coalescing rapid repeat toggles.
    ///
    /// Each call records the latest intent for the coin (add if not watchlisted and not
    /// pending, remove otherwise) and debounces the flush; toggling the same coin twice
    /// within the window cancels out to a no-op. Superseded intents are discarded, never
    /// queued. The flush outcome is reported via the notification bus.
    pub fn queue_toggle(&self, coin: Coin) {
        {
            let mut toggles = self.toggles.lock();
            match toggles.remove(&coin.id) {
                // Second toggle within the window reverts the first: net no-op.
                Some(pending) => {
                    debug!(id = %coin.id, ?pending, "toggle cancelled out within window");
                }
                None => {
                    let intent = if self.cache.is_watchlisted(coin.id) {
                        PendingToggle::Remove
                    } else {
                        PendingToggle::Add(coin.clone())
                    };
                    toggles.insert(coin.id, intent);
                }
            }
        }

        let engine = self.clone();
        self.debouncer.schedule(async move {
            engine.flush_toggles().await;
        });
    }

    async fn flush_toggles(&self) {
        let drained: Vec<(CoinId, PendingToggle)> = {
            let mut toggles = self.toggles.lock();
            toggles.drain().collect()
        };
        if drained.is_empty() {
            return;
        }

        let mut adds = Vec::new();
        let mut removes = Vec::new();
        for (id, pending) in drained {
            match pending {
                PendingToggle::Add(coin) => adds.push(coin),
                PendingToggle::Remove => removes.push(id),
            }
        }

        match self.coordinator.execute(MutationIntent::new(adds, removes)).await {
            Ok(outcome) => {
                debug!(
                    succeeded = outcome.succeeded,
                    failed = outcome.failed.len(),
                    "coalesced toggle batch flushed"
                );
            }
            // Never surfaced synchronously: the toggle path has no caller to block.
            Err(err) => {
                warn!(%err, "coalesced toggle batch failed");
            }
        }
    }

    /// Remove every coin from the watchlist and the durable store.
    pub async fn clear(&self) -> Result<BatchOutcome, WatchlistError> {
        self.execute(MutationIntent::remove(self.cache.coin_ids()))
            .await
    }

    /// Number of watchlisted coins.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Subscribe to watchlist/quote change events.
    pub fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    /// Control handle for the refresh loop (suspend/resume/refresh-now/shutdown).
    pub fn refresh(&self) -> &RefreshHandle {
        &self.refresh
    }
}
