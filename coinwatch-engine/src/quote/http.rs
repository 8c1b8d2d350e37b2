//! HTTP [`QuoteSource`] implementation.
//!
//! Issues one batched GET per refresh tick against a quote API
//! (`{base}/v1/quotes?ids=1,2,3`) and normalises the response into [`QuoteUpdate`]s.
//! Ids the API omits from the response are simply absent from the result map.

use super::{QuoteSource, QuoteUpdate};
use crate::{
    entry::{CoinId, PercentChanges, Quote},
    error::QuoteError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use itertools::Itertools;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Quote source backed by a batched HTTP quotes endpoint.
#[derive(Debug, Clone)]
pub struct HttpQuoteSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpQuoteSource {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    /// Reuse an existing client (connection pooling across collaborators).
    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    fn quotes_url(&self, ids: &[CoinId]) -> Result<Url, QuoteError> {
        let mut url = self
            .base
            .join("v1/quotes")
            .map_err(|err| QuoteError::Decode(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("ids", &ids.iter().join(","));
        Ok(url)
    }
}

/// ### Raw Payload Example
/// ```json
/// {
///     "data": {
///         "1": {
///             "price": "65000.12",
///             "market_cap": "1280000000000",
///             "rank": 1,
///             "percent_change_1h": 0.1,
///             "percent_change_24h": -1.2,
///             "percent_change_7d": 3.4,
///             "sparkline": [64800.0, 65100.5, 65000.1],
///             "last_updated": "2024-12-01T10:30:00Z"
///         }
///     }
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
struct QuotesResponse {
    data: FnvHashMap<CoinId, TickerPayload>,
}

#[derive(Clone, PartialEq, Debug, Deserialize)]
struct TickerPayload {
    price: Decimal,
    #[serde(default)]
    market_cap: Option<Decimal>,
    #[serde(default)]
    rank: Option<u32>,
    #[serde(default)]
    percent_change_1h: Option<f64>,
    #[serde(default)]
    percent_change_24h: Option<f64>,
    #[serde(default)]
    percent_change_7d: Option<f64>,
    #[serde(default)]
    percent_change_30d: Option<f64>,
    #[serde(default)]
    percent_change_1y: Option<f64>,
    #[serde(default)]
    sparkline: Vec<f64>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl From<TickerPayload> for QuoteUpdate {
    fn from(payload: TickerPayload) -> Self {
        Self {
            quote: Quote {
                price: payload.price,
                market_cap: payload.market_cap,
                percent_change: PercentChanges {
                    h1: payload.percent_change_1h,
                    h24: payload.percent_change_24h,
                    d7: payload.percent_change_7d,
                    d30: payload.percent_change_30d,
                    y1: payload.percent_change_1y,
                },
                sparkline: payload.sparkline,
                time: payload.last_updated.unwrap_or_else(Utc::now),
            },
            rank: payload.rank,
        }
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn fetch(&self, ids: &[CoinId]) -> Result<FnvHashMap<CoinId, QuoteUpdate>, QuoteError> {
        let url = self.quotes_url(ids)?;
        debug!(requested = ids.len(), %url, "fetching batched quotes");

        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(QuoteError::RateLimited),
            status if !status.is_success() => return Err(QuoteError::Status(status.as_u16())),
            _ => {}
        }

        let payload = response.json::<QuotesResponse>().await?;

        Ok(payload
            .data
            .into_iter()
            .map(|(id, ticker)| (id, QuoteUpdate::from(ticker)))
            .collect())
    }
}
