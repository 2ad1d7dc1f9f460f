//! Feed adapters implementing [`papertrade_ports::QuoteFeed`]

mod binance;
mod channel;
mod coinbase;
mod ws;

pub use binance::{BINANCE_STREAM_URL, BinanceFeed};
pub use channel::{ChannelFeed, FeedController};
pub use coinbase::{COINBASE_FEED_URL, CoinbaseFeed};
