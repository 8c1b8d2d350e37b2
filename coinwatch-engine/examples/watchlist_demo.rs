use coinwatch_engine::{
    Coin, EngineConfig, HttpQuoteSource, JsonFileStore, MutationIntent, WatchlistEngine,
    WatchlistEvent,
};
use std::sync::Arc;
use url::Url;

/// Adds a few coins to a file-backed watchlist and prints every change event as the
/// refresh loop pulls quotes. Point `QUOTES_BASE_URL` at a quotes API exposing
/// `GET /v1/quotes?ids=1,2,3`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let base = std::env::var("QUOTES_BASE_URL")
        .unwrap_or_else(|_| "https://quotes.example.com/".to_string());

    let store = Arc::new(JsonFileStore::new("watchlist.json"));
    let source = Arc::new(HttpQuoteSource::new(Url::parse(&base)?));
    let engine = WatchlistEngine::init(store, source, EngineConfig::from_env()).await?;
    let mut events = engine.subscribe();

    let outcome = engine
        .execute(MutationIntent::add([
            Coin::new(1u64, "BTC", "Bitcoin", 1),
            Coin::new(1027u64, "ETH", "Ethereum", 2),
            Coin::new(5426u64, "SOL", "Solana", 6),
        ]))
        .await?;
    println!("added {} coins ({} failed)", outcome.succeeded, outcome.failed.len());

    engine.refresh().refresh_now();

    while let Ok(event) = events.recv().await {
        match event {
            WatchlistEvent::WatchlistChanged { action, affected } => {
                println!("watchlist {action:?}: {affected:?}");
            }
            WatchlistEvent::QuotesChanged { affected } => {
                for id in affected {
                    if let Some(entry) = engine.get(id) {
                        println!(
                            "{} {:?} (rank {})",
                            entry.symbol,
                            entry.price(),
                            entry.rank
                        );
                    }
                }
            }
            WatchlistEvent::RefreshFailed { reason } => {
                println!("refresh failed: {reason}");
            }
        }
    }

    Ok(())
}

// Initialise an INFO `Subscriber` for `Tracing` logs
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(cfg!(debug_assertions))
        .init()
}
