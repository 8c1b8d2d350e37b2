//! # CoinWatch Engine
//! Watchlist state & synchronization engine for a cryptocurrency price tracker.
//!
//! The engine keeps a user's coin watchlist consistent across three layers:
//! - a durable [`store`](store::WatchlistStore) (JSON file by default),
//! - an O(1) in-memory [`cache`](cache::WatchlistCache) with copy-on-write snapshots,
//! - a periodic [`refresh`](refresh::RefreshLoop) loop fetching batched quotes.
//!
//! Mutations flow through the [`mutation::BatchCoordinator`] as transactional batches
//! (store first, cache second, one event last), and every change is announced on the
//! [`bus::NotificationBus`] so screens stay in sync without polling.
//!
//! ## Getting Started
//! ```no_run
//! use coinwatch_engine::{
//!     Coin, EngineConfig, HttpQuoteSource, JsonFileStore, MutationIntent, WatchlistEngine,
//! };
//! use std::sync::Arc;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(JsonFileStore::new("watchlist.json"));
//!     let source = Arc::new(HttpQuoteSource::new(Url::parse(
//!         "https://quotes.example.com/",
//!     )?));
//!
//!     let engine = WatchlistEngine::init(store, source, EngineConfig::default()).await?;
//!
//!     let outcome = engine
//!         .execute(MutationIntent::add([Coin::new(1u64, "BTC", "Bitcoin", 1)]))
//!         .await?;
//!     println!("added {} coins", outcome.succeeded);
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod cache;
pub mod debounce;
pub mod engine;
pub mod entry;
pub mod error;
pub mod mutation;
pub mod quote;
pub mod refresh;
pub mod store;
pub mod view;

pub use bus::{EventSubscription, NotificationBus, WatchlistEvent};
pub use cache::WatchlistCache;
pub use engine::{EngineConfig, WatchlistEngine};
pub use entry::{Coin, CoinId, PercentChanges, Quote, WatchlistEntry};
pub use error::{MutationError, QuoteError, StorageError, ValidationError, WatchlistError};
pub use mutation::{BatchCoordinator, BatchOutcome, FailedMutation, MutationAction, MutationIntent};
pub use quote::{HttpQuoteSource, QuoteSource, QuoteUpdate};
pub use refresh::{RefreshConfig, RefreshHandle, RefreshState};
pub use store::{BulkReport, JsonFileStore, MemoryStore, WatchlistStore};
pub use view::{PriceChangeWindow, SortColumn, SortOrder, ViewSpec};
