use async_trait::async_trait;
use papertrade_core::Amount;
use std::time::Duration;

use crate::error::QuoteError;

/// Port for pricing trades and valuations.
///
/// Implementations return a price observed less than `max_age` ago and may
/// wait for one. Callers bound the wait by dropping the future.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fresh_quote(&self, symbol: &str, max_age: Duration) -> Result<Amount, QuoteError>;
}
