//! Coinbase Exchange `ticker` channel

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use papertrade_core::Symbol;
use papertrade_ports::{FeedError, QuoteFeed, RawTick, TickReceiver};
use serde::{Deserialize, Serialize};

use super::ws::stream_ticks;

pub const COINBASE_FEED_URL: &str = "wss://ws-feed.exchange.coinbase.com";

const QUOTE_CURRENCY: &str = "-USD";

#[derive(Serialize)]
struct SubscribeRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    product_ids: Vec<String>,
    channels: [&'static str; 1],
}

#[derive(Deserialize)]
struct TickerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    product_id: String,
    #[serde(default)]
    price: String,
    time: Option<DateTime<Utc>>,
}

pub struct CoinbaseFeed {
    url: String,
    buffer: usize,
}

impl CoinbaseFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            buffer: 1024,
        }
    }

    fn subscribe_request(symbols: &[Symbol]) -> Result<String, FeedError> {
        let request = SubscribeRequest {
            kind: "subscribe",
            product_ids: symbols
                .iter()
                .map(|s| format!("{}{}", s, QUOTE_CURRENCY))
                .collect(),
            channels: ["ticker"],
        };
        serde_json::to_string(&request).map_err(|e| FeedError::Protocol(e.to_string()))
    }
}

impl Default for CoinbaseFeed {
    fn default() -> Self {
        Self::new(COINBASE_FEED_URL)
    }
}

/// `ticker` frame to tick; everything else (subscriptions, heartbeats) is skipped
fn parse_ticker(text: &str) -> Result<Option<RawTick>, serde_json::Error> {
    let msg: TickerMessage = serde_json::from_str(text)?;
    if msg.kind != "ticker" {
        return Ok(None);
    }
    let Some(symbol) = msg.product_id.strip_suffix(QUOTE_CURRENCY) else {
        return Ok(None);
    };
    Ok(Some(RawTick {
        symbol: symbol.to_string(),
        price: msg.price,
        timestamp: msg.time.unwrap_or_else(Utc::now),
    }))
}

#[async_trait]
impl QuoteFeed for CoinbaseFeed {
    async fn connect(&self, symbols: &[Symbol]) -> Result<TickReceiver, FeedError> {
        if symbols.is_empty() {
            return Err(FeedError::NoSymbols);
        }
        let request = Self::subscribe_request(symbols)?;
        stream_ticks(&self.url, Some(request), self.buffer, parse_ticker).await
    }

    fn name(&self) -> &str {
        "coinbase"
    }
}
