//! Paper-trading service
//!
//! Wires the quote pipeline and the ledger into one process:
//!
//! ```text
//!   QuoteFeed ──► QuoteIngestor ──► QuoteFanout / QuoteBus ──┬──► QuoteCache ──► TradeEngine
//!                                                           │                └─► ValuationJob
//!                                                           └──► watch() (filtered, throttled)
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod identity;
pub mod service;

pub use bootstrap::{PaperTrade, feed_for};
pub use config::{ConfigError, FeedConfig, FeedProvider, IdentityEntry, QuoteConfig, ServerConfig};
pub use error::ServiceError;
pub use identity::StaticIdentityProvider;
pub use service::{PaperTradeService, PricePoint};
