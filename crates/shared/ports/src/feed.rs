use async_trait::async_trait;
use papertrade_core::{Symbol, Timestamp};
use tokio::sync::mpsc;

use crate::error::FeedError;

/// Undecoded tick as delivered by a feed adapter.
///
/// The price is kept as the feed's decimal string so that parsing into an
/// exact amount happens in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTick {
    pub symbol: Symbol,
    pub price: String,
    pub timestamp: Timestamp,
}

pub type TickReceiver = mpsc::Receiver<RawTick>;

/// Port for a streaming market-data provider.
///
/// One call opens one upstream connection. The receiver yields ticks until
/// the connection ends for any reason, at which point it returns `None`.
/// Dropping the receiver closes the connection.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    async fn connect(&self, symbols: &[Symbol]) -> Result<TickReceiver, FeedError>;

    fn name(&self) -> &str {
        "QuoteFeed"
    }
}
