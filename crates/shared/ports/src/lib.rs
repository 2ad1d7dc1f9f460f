//! Paper-trading Ports
//!
//! Port definitions (traits) for the paper-trading core.
//! These define the boundaries between domain logic and infrastructure:
//! the market-data feed, the quote source used for pricing, the persistent
//! store, the trade-history cache and the identity provider.

mod cache;
mod clock;
mod error;
mod feed;
mod identity;
mod quotes;
mod shutdown;
mod store;

pub use cache::{HistoryLookup, TradeHistoryCache};
pub use clock::Clock;
pub use error::{AuthError, FeedError, QuoteError, StoreError};
pub use feed::{QuoteFeed, RawTick, TickReceiver};
pub use identity::{AuthenticatedUser, IdentityProvider, StaticUser};
pub use quotes::QuoteSource;
pub use shutdown::{Shutdown, ShutdownHandle};
pub use store::{TradeLogRepository, UserRepository, ValuationRepository, Versioned};
