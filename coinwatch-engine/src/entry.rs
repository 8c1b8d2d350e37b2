use crate::{error::ValidationError, view::PriceChangeWindow};
use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Stable external identifier for a coin, unique across the watchlist.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, Deserialize, Serialize,
)]
pub struct CoinId(pub u64);

/// Descriptor for a coin being added to the watchlist.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Coin {
    pub id: CoinId,
    pub symbol: SmolStr,
    pub name: SmolStr,
    pub rank: u32,
    pub logo_url: Option<String>,
}

impl Coin {
    pub fn new<Id, S, N>(id: Id, symbol: S, name: N, rank: u32) -> Self
    where
        Id: Into<CoinId>,
        S: Into<SmolStr>,
        N: Into<SmolStr>,
    {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: name.into(),
            rank,
            logo_url: None,
        }
    }

    pub fn with_logo_url<Url>(self, logo_url: Url) -> Self
    where
        Url: Into<String>,
    {
        Self {
            logo_url: Some(logo_url.into()),
            ..self
        }
    }

    /// Validate the invariants enforced on insert (non-empty symbol and name).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }
}

/// Percent changes over the supported windows, as reported by the quote source.
///
/// Windows the source did not report are `None` and render as "unchanged" downstream.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default, Deserialize, Serialize)]
pub struct PercentChanges {
    pub h1: Option<f64>,
    pub h24: Option<f64>,
    pub d7: Option<f64>,
    pub d30: Option<f64>,
    pub y1: Option<f64>,
}

impl PercentChanges {
    /// Percent change for the requested window, if the source reported one.
    pub fn for_window(&self, window: PriceChangeWindow) -> Option<f64> {
        match window {
            PriceChangeWindow::H1 => self.h1,
            PriceChangeWindow::H24 => self.h24,
            PriceChangeWindow::D7 => self.d7,
            PriceChangeWindow::D30 => self.d30,
            PriceChangeWindow::Y1 => self.y1,
        }
    }
}

/// Live market data for a coin. Replaced wholesale on each refresh tick.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Quote {
    pub price: Decimal,
    pub market_cap: Option<Decimal>,
    pub percent_change: PercentChanges,
    pub sparkline: Vec<f64>,
    pub time: DateTime<Utc>,
}

impl Quote {
    /// Value comparison ignoring the source timestamp.
    ///
    /// Every refresh carries a fresh `time`, so change detection must not treat a
    /// re-delivery of identical market data as a change.
    pub fn materially_differs(&self, other: &Quote) -> bool {
        self.price != other.price
            || self.market_cap != other.market_cap
            || self.percent_change != other.percent_change
            || self.sparkline != other.sparkline
    }
}

/// One coin present in the watchlist.
///
/// Created by an add operation, mutated only by the refresh loop (quote and rank) or
/// removed wholesale by a remove operation. `added_at` is set once at insertion.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct WatchlistEntry {
    pub id: CoinId,
    pub symbol: SmolStr,
    pub name: SmolStr,
    pub rank: u32,
    pub logo_url: Option<String>,
    pub added_at: DateTime<Utc>,
    pub latest_quote: Option<Quote>,
}

impl WatchlistEntry {
    pub fn new(coin: Coin, added_at: DateTime<Utc>) -> Self {
        Self {
            id: coin.id,
            symbol: coin.symbol,
            name: coin.name,
            rank: coin.rank,
            logo_url: coin.logo_url,
            added_at,
            latest_quote: None,
        }
    }

    pub fn price(&self) -> Option<Decimal> {
        self.latest_quote.as_ref().map(|quote| quote.price)
    }

    pub fn market_cap(&self) -> Option<Decimal> {
        self.latest_quote.as_ref().and_then(|quote| quote.market_cap)
    }

    pub fn percent_change(&self, window: PriceChangeWindow) -> Option<f64> {
        self.latest_quote
            .as_ref()
            .and_then(|quote| quote.percent_change.for_window(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(price: Decimal) -> Quote {
        Quote {
            price,
            market_cap: Some(dec!(1_000_000)),
            percent_change: PercentChanges {
                h24: Some(2.5),
                ..Default::default()
            },
            sparkline: vec![1.0, 2.0, 3.0],
            time: Utc::now(),
        }
    }

    #[test]
    fn test_coin_validate() {
        struct TestCase {
            input: Coin,
            expected: Result<(), ValidationError>,
        }

        let tests = vec![
            // TC0: valid coin passes
            TestCase {
                input: Coin::new(1u64, "BTC", "Bitcoin", 1),
                expected: Ok(()),
            },
            // TC1: empty symbol is rejected
            TestCase {
                input: Coin::new(2u64, "", "Ethereum", 2),
                expected: Err(ValidationError::EmptySymbol),
            },
            // TC2: whitespace-only name is rejected
            TestCase {
                input: Coin::new(3u64, "SOL", "   ", 5),
                expected: Err(ValidationError::EmptyName),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.validate(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_quote_materially_differs_ignores_time() {
        let base = quote(dec!(65000));
        let mut same_later = base.clone();
        same_later.time = Utc::now() + chrono::Duration::seconds(60);
        assert!(!base.materially_differs(&same_later));

        let mut moved = base.clone();
        moved.price = dec!(65001);
        assert!(base.materially_differs(&moved));
    }

    #[test]
    fn test_percent_changes_for_window() {
        let changes = PercentChanges {
            h1: Some(0.1),
            h24: Some(-1.2),
            ..Default::default()
        };
        assert_eq!(changes.for_window(PriceChangeWindow::H1), Some(0.1));
        assert_eq!(changes.for_window(PriceChangeWindow::H24), Some(-1.2));
        assert_eq!(changes.for_window(PriceChangeWindow::D7), None);
    }

    #[test]
    fn test_entry_accessors_without_quote() {
        let entry = WatchlistEntry::new(Coin::new(1u64, "BTC", "Bitcoin", 1), Utc::now());
        assert_eq!(entry.price(), None);
        assert_eq!(entry.market_cap(), None);
        assert_eq!(entry.percent_change(PriceChangeWindow::H24), None);
    }
}
