use crate::entry::WatchlistEntry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Price-change window used for filtering and percent-change sorting.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize,
)]
pub enum PriceChangeWindow {
    H1,
    #[default]
    H24,
    D7,
    D30,
    Y1,
}

impl PriceChangeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceChangeWindow::H1 => "1h",
            PriceChangeWindow::H24 => "24h",
            PriceChangeWindow::D7 => "7d",
            PriceChangeWindow::D30 => "30d",
            PriceChangeWindow::Y1 => "1y",
        }
    }
}

impl std::fmt::Display for PriceChangeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column an ordered watchlist projection is sorted by.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize,
)]
pub enum SortColumn {
    #[default]
    Rank,
    Name,
    Price,
    PercentChange,
    MarketCap,
}

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize,
)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filter/sort state for an ordered watchlist projection.
///
/// `Copy + Eq + Hash`, so it doubles as the memoization key for
/// [`WatchlistCache::snapshot`](crate::cache::WatchlistCache::snapshot): a projection is
/// recomputed only when the view or the underlying map changed.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Deserialize, Serialize,
)]
pub struct ViewSpec {
    pub window: PriceChangeWindow,
    pub column: SortColumn,
    pub order: SortOrder,
}

impl ViewSpec {
    pub fn new(window: PriceChangeWindow, column: SortColumn, order: SortOrder) -> Self {
        Self {
            window,
            column,
            order,
        }
    }

    /// Ordering of two entries under this view.
    ///
    /// The base ordering ranks entries by market standing for `Rank` (rank 1 is the
    /// greatest value, so `Descending` puts the market leader first), by natural value
    /// for every other column. Entries without a quote sort below entries with one.
    /// Ties break on coin id so projections are deterministic.
    pub fn compare(&self, a: &WatchlistEntry, b: &WatchlistEntry) -> Ordering {
        let base = match self.column {
            SortColumn::Rank => b.rank.cmp(&a.rank),
            SortColumn::Name => a.name.cmp(&b.name),
            SortColumn::Price => a.price().cmp(&b.price()),
            SortColumn::PercentChange => cmp_option_f64(
                a.percent_change(self.window),
                b.percent_change(self.window),
            ),
            SortColumn::MarketCap => a.market_cap().cmp(&b.market_cap()),
        };

        let ordered = match self.order {
            SortOrder::Ascending => base,
            SortOrder::Descending => base.reverse(),
        };

        ordered.then_with(|| a.id.cmp(&b.id))
    }
}

fn cmp_option_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Coin, PercentChanges, Quote};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn entry(id: u64, symbol: &str, rank: u32, price: Option<Decimal>, h24: Option<f64>) -> WatchlistEntry {
        let mut entry = WatchlistEntry::new(Coin::new(id, symbol, symbol, rank), Utc::now());
        entry.latest_quote = price.map(|price| Quote {
            price,
            market_cap: None,
            percent_change: PercentChanges {
                h24,
                ..Default::default()
            },
            sparkline: Vec::new(),
            time: Utc::now(),
        });
        entry
    }

    fn sorted_ids(view: ViewSpec, entries: &[WatchlistEntry]) -> Vec<u64> {
        let mut rows: Vec<_> = entries.to_vec();
        rows.sort_unstable_by(|a, b| view.compare(a, b));
        rows.into_iter().map(|entry| entry.id.0).collect()
    }

    #[test]
    fn test_rank_ordering_puts_market_leader_first_when_descending() {
        let entries = vec![
            entry(1, "A", 10, None, None),
            entry(2, "B", 3, None, None),
            entry(3, "C", 7, None, None),
        ];

        let desc = ViewSpec::new(
            PriceChangeWindow::H24,
            SortColumn::Rank,
            SortOrder::Descending,
        );
        assert_eq!(sorted_ids(desc, &entries), vec![2, 3, 1]);

        let asc = ViewSpec::new(
            PriceChangeWindow::H24,
            SortColumn::Rank,
            SortOrder::Ascending,
        );
        assert_eq!(sorted_ids(asc, &entries), vec![1, 3, 2]);
    }

    #[test]
    fn test_percent_change_ordering_respects_window_and_missing_quotes() {
        let entries = vec![
            entry(1, "A", 1, Some(dec!(10)), Some(-2.0)),
            entry(2, "B", 2, Some(dec!(20)), Some(5.0)),
            entry(3, "C", 3, None, None),
        ];

        let view = ViewSpec::new(
            PriceChangeWindow::H24,
            SortColumn::PercentChange,
            SortOrder::Descending,
        );
        // Biggest gainer first, quote-less entries last.
        assert_eq!(sorted_ids(view, &entries), vec![2, 1, 3]);
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let entries = vec![
            entry(9, "X", 5, None, None),
            entry(4, "X", 5, None, None),
        ];
        let view = ViewSpec::new(
            PriceChangeWindow::H24,
            SortColumn::Name,
            SortOrder::Ascending,
        );
        assert_eq!(sorted_ids(view, &entries), vec![4, 9]);
    }
}
