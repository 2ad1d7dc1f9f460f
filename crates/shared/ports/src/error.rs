use papertrade_core::Symbol;
use thiserror::Error;

/// Failures talking to an upstream market-data feed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("failed to connect to feed: {0}")]
    Connect(String),

    #[error("feed protocol error: {0}")]
    Protocol(String),

    #[error("no symbols to subscribe to")]
    NoSymbols,
}

/// Failures fetching a price for trading or valuation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("quote wait cancelled")]
    Cancelled,

    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),

    #[error("quote unavailable: {0}")]
    Unavailable(String),
}

/// Failures from the persistent store or the cache in front of it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The record changed since it was read
    #[error("version conflict on {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("invalid token")]
    InvalidToken,
}
