//! Game constants shared by every component.

use crate::amount::Amount;

/// Tickers the feed is subscribed to and users may trade.
pub const SUPPORTED_SYMBOLS: [&str; 3] = ["BTC", "ETH", "DOGE"];

/// Cash every new portfolio starts with.
pub const DEFAULT_STARTING_CASH: Amount = Amount::from_units(100_000);

/// Check whether `symbol` is in `supported`
pub fn is_supported<S: AsRef<str>>(supported: &[S], symbol: &str) -> bool {
    supported.iter().any(|s| s.as_ref() == symbol)
}
