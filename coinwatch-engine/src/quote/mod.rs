//! Remote quote source seam.
//!
//! The refresh loop issues one batched fetch per tick through [`QuoteSource`]; the HTTP
//! implementation lives in [`http`]. Ids missing from a response are treated as
//! "unchanged" by the caller, never as an error.

use crate::{
    entry::{CoinId, Quote},
    error::QuoteError,
};
use async_trait::async_trait;
use fnv::FnvHashMap;

pub mod http;

pub use http::HttpQuoteSource;

/// Fresh market data for one watchlisted coin.
///
/// Carries the replacement [`Quote`] plus the coin's current market rank when the source
/// reports one (rank is display-only and refreshed alongside quotes).
#[derive(Clone, PartialEq, Debug)]
pub struct QuoteUpdate {
    pub quote: Quote,
    pub rank: Option<u32>,
}

impl QuoteUpdate {
    pub fn new(quote: Quote) -> Self {
        Self { quote, rank: None }
    }

    pub fn with_rank(quote: Quote, rank: u32) -> Self {
        Self {
            quote,
            rank: Some(rank),
        }
    }
}

/// Batched "fetch current price/rank by id list" collaborator.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch current quotes for the given ids in one request.
    ///
    /// A subset of the requested ids may be missing from the result; callers must treat
    /// those as unchanged.
    async fn fetch(&self, ids: &[CoinId]) -> Result<FnvHashMap<CoinId, QuoteUpdate>, QuoteError>;
}
