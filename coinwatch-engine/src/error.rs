use thiserror::Error;

/// Per-entry validation failures, rejected before any write reaches the store.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
pub enum ValidationError {
    #[error("coin symbol is empty")]
    EmptySymbol,

    #[error("coin name is empty")]
    EmptyName,

    #[error("duplicate coin id within the batch")]
    DuplicateInBatch,
}

/// Failures raised by a [`WatchlistStore`](crate::store::WatchlistStore) backend.
///
/// A hard storage failure aborts the batch write entirely, leaving the cache untouched.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
pub enum StorageError {
    #[error("storage io failure: {0}")]
    Io(String),

    #[error("storage serialization failure: {0}")]
    Serialize(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value.to_string())
    }
}

/// Failures raised by a [`QuoteSource`](crate::quote::QuoteSource).
///
/// Quote failures are never returned synchronously to a caller - the refresh loop logs them
/// and surfaces a non-fatal event on the notification bus, then continues on the next tick.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Network(String),

    #[error("quote source rate limited")]
    RateLimited,

    #[error("quote response invalid: {0}")]
    Decode(String),

    #[error("quote source responded with status: {0}")]
    Status(u16),
}

impl From<reqwest::Error> for QuoteError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

/// Reason an individual entry of a batch mutation failed while the rest of the batch
/// committed.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MutationError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("rejected by storage backend")]
    Rejected,

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// All errors returned synchronously by the engine.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum WatchlistError {
    #[error("StorageError: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let actual = StorageError::from(io);
        assert!(matches!(actual, StorageError::Io(_)));
    }

    #[test]
    fn test_watchlist_error_from_storage() {
        let actual = WatchlistError::from(StorageError::Backend("closed".to_string()));
        assert_eq!(
            actual,
            WatchlistError::Storage(StorageError::Backend("closed".to_string()))
        );
    }
}
