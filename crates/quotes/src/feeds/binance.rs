//! Binance combined `aggTrade` streams

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use papertrade_core::Symbol;
use papertrade_ports::{FeedError, QuoteFeed, RawTick, TickReceiver};
use serde::Deserialize;

use super::ws::stream_ticks;

pub const BINANCE_STREAM_URL: &str = "wss://stream.binance.com:9443";

const QUOTE_CURRENCY: &str = "USDT";

#[derive(Deserialize)]
struct CombinedFrame {
    data: AggTrade,
}

#[derive(Deserialize)]
struct AggTrade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    /// Trade time, epoch millis
    #[serde(rename = "T")]
    trade_time: i64,
}

pub struct BinanceFeed {
    base_url: String,
    buffer: usize,
}

impl BinanceFeed {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            buffer: 1024,
        }
    }

    /// Symbols are subscribed through the URL, no request frame needed
    fn stream_url(&self, symbols: &[Symbol]) -> String {
        let streams: Vec<String> = symbols
            .iter()
            .map(|s| format!("{}{}@aggTrade", s.to_lowercase(), QUOTE_CURRENCY.to_lowercase()))
            .collect();
        format!(
            "{}/stream?streams={}",
            self.base_url.trim_end_matches('/'),
            streams.join("/")
        )
    }
}

impl Default for BinanceFeed {
    fn default() -> Self {
        Self::new(BINANCE_STREAM_URL)
    }
}

fn parse_agg_trade(text: &str) -> Result<Option<RawTick>, serde_json::Error> {
    let frame: CombinedFrame = serde_json::from_str(text)?;
    let trade = frame.data;
    let Some(symbol) = trade.symbol.strip_suffix(QUOTE_CURRENCY) else {
        return Ok(None);
    };
    Ok(Some(RawTick {
        symbol: symbol.to_string(),
        price: trade.price,
        timestamp: DateTime::from_timestamp_millis(trade.trade_time).unwrap_or_else(Utc::now),
    }))
}

#[async_trait]
impl QuoteFeed for BinanceFeed {
    async fn connect(&self, symbols: &[Symbol]) -> Result<TickReceiver, FeedError> {
        if symbols.is_empty() {
            return Err(FeedError::NoSymbols);
        }
        stream_ticks(&self.stream_url(symbols), None, self.buffer, parse_agg_trade).await
    }

    fn name(&self) -> &str {
        "binance"
    }
}
