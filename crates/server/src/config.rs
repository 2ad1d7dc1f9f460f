//! Process configuration
//!
//! Everything has a default, so an empty JSON object is a valid config file.
//! `FEED` and `SYMBOLS` in the environment override the feed provider and the
//! traded symbol list.

use papertrade_quotes::feeds::{BINANCE_STREAM_URL, COINBASE_FEED_URL};
use papertrade_trading::{TradeEngineConfig, ValuationConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Unknown feed provider: {0}")]
    UnknownProvider(String),
    #[error("No supported symbols configured")]
    NoSymbols,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedProvider {
    #[default]
    Coinbase,
    Binance,
}

impl FeedProvider {
    pub fn default_url(&self) -> &'static str {
        match self {
            FeedProvider::Coinbase => COINBASE_FEED_URL,
            FeedProvider::Binance => BINANCE_STREAM_URL,
        }
    }
}

impl FromStr for FeedProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coinbase" => Ok(FeedProvider::Coinbase),
            "binance" => Ok(FeedProvider::Binance),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for FeedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedProvider::Coinbase => write!(f, "coinbase"),
            FeedProvider::Binance => write!(f, "binance"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub provider: FeedProvider,
    /// Overrides the provider's public endpoint
    pub url: Option<String>,
    pub reconnect_backoff_ms: u64,
    /// Quotes buffered between the ingestor and the bus
    pub buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            provider: FeedProvider::default(),
            url: None,
            reconnect_backoff_ms: 100,
            buffer: 256,
        }
    }
}

impl FeedConfig {
    pub fn url(&self) -> &str {
        self.url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_url())
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Per-subscriber buffer on the shared bus
    pub bus_capacity: usize,
    /// Minimum spacing between prices sent to one watcher
    pub watch_max_rate_ms: u64,
    /// A watch stream ends after this long
    pub session_secs: u64,
    /// Pause before the cache resubscribes after losing its stream
    pub resubscribe_backoff_ms: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 64,
            watch_max_rate_ms: 100,
            session_secs: 15 * 60,
            resubscribe_backoff_ms: 1_000,
        }
    }
}

impl QuoteConfig {
    pub fn watch_max_rate(&self) -> Duration {
        Duration::from_millis(self.watch_max_rate_ms)
    }

    pub fn session(&self) -> Duration {
        Duration::from_secs(self.session_secs)
    }

    pub fn resubscribe_backoff(&self) -> Duration {
        Duration::from_millis(self.resubscribe_backoff_ms)
    }
}

/// Token accepted by the static identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub token: String,
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub feed: FeedConfig,
    pub quotes: QuoteConfig,
    pub trading: TradeEngineConfig,
    pub valuation: ValuationConfig,
    pub identities: Vec<IdentityEntry>,
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FEED` and `SYMBOLS` from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    pub fn with_overrides<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = var("FEED") {
            self.feed.provider = provider.parse()?;
        }
        if let Some(symbols) = var("SYMBOLS") {
            self.trading.supported_symbols = symbols
                .split(',')
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trading.supported_symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papertrade_core::Amount;

    #[test]
    fn test_empty_object_is_all_defaults() {
        let config = ServerConfig::from_json("{}").unwrap();
        assert_eq!(config.feed.provider, FeedProvider::Coinbase);
        assert_eq!(config.feed.url(), COINBASE_FEED_URL);
        assert_eq!(config.quotes.session(), Duration::from_secs(900));
        assert_eq!(config.trading.supported_symbols, vec!["BTC", "ETH", "DOGE"]);
        assert_eq!(config.trading.starting_cash, Amount::from_units(100_000));
        assert!(config.identities.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let json = r#"{
            "feed": { "provider": "binance" },
            "quotes": { "watch_max_rate_ms": 250 },
            "identities": [
                { "token": "t0k3n", "key": "local_1", "display_name": "alice" }
            ]
        }"#;
        let config = ServerConfig::from_json(json).unwrap();
        assert_eq!(config.feed.provider, FeedProvider::Binance);
        assert_eq!(config.feed.url(), BINANCE_STREAM_URL);
        assert_eq!(config.feed.reconnect_backoff(), Duration::from_millis(100));
        assert_eq!(config.quotes.watch_max_rate(), Duration::from_millis(250));
        assert_eq!(config.quotes.bus_capacity, 64);
        assert_eq!(config.identities[0].profile_url, "");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = ServerConfig::from_json(r#"{ "feed": { "provider": "kraken" } }"#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));

        let result = ServerConfig::default().with_overrides(|name| {
            (name == "FEED").then(|| "kraken".to_string())
        });
        assert!(matches!(result, Err(ConfigError::UnknownProvider(_))));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::default()
            .with_overrides(|name| match name {
                "FEED" => Some("Binance".to_string()),
                "SYMBOLS" => Some("btc, eth,".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.feed.provider, FeedProvider::Binance);
        assert_eq!(config.trading.supported_symbols, vec!["BTC", "ETH"]);
    }

    #[test]
    fn test_empty_symbol_list_is_rejected() {
        let result = ServerConfig::default().with_overrides(|name| {
            (name == "SYMBOLS").then(|| " ,".to_string())
        });
        assert!(matches!(result, Err(ConfigError::NoSymbols)));
    }
}
