//! Paper-trading Quotes
//!
//! Live market data for the paper-trading core:
//!
//! ```text
//!   QuoteFeed (Coinbase / Binance / channel)
//!         │ RawTick
//!    ┌────▼─────────┐
//!    │ QuoteIngestor│  reconnects forever, drops undecodable ticks
//!    └────┬─────────┘
//!         │ Quote
//!    ┌────▼────┐
//!    │QuoteBus │  one upstream, N subscribers, never blocks
//!    └─┬─────┬─┘
//!      │     └──► Throttled<Subscription> ──► watchers
//!      ▼
//!   QuoteCache  (point lookups with staleness for trade pricing)
//! ```
//!
//! [`QuoteFanout`] owns the bus lifecycle: it opens the upstream on the first
//! subscriber and closes it after the last one leaves.

pub mod bus;
pub mod cache;
pub mod fanout;
pub mod feeds;
pub mod ingestor;
pub mod throttle;

pub use bus::{QuoteBus, Subscription};
pub use cache::QuoteCache;
pub use fanout::{IngestorUpstream, QuoteFanout, UpstreamFactory};
pub use feeds::{BinanceFeed, ChannelFeed, CoinbaseFeed, FeedController};
pub use ingestor::{IngestorConfig, IngestorState, IngestorStats, IngestorStream, QuoteIngestor};
pub use throttle::{ThrottleExt, Throttled};
