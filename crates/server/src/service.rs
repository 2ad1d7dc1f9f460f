use futures_util::stream::BoxStream;
use futures_util::{StreamExt, future};
use log::info;
use papertrade_clock::SystemClock;
use papertrade_core::{
    Amount, Portfolio, Symbol, Timestamp, TradeAction, TradeRecord, User, ValuationHistory,
    is_supported,
};
use papertrade_ports::{AuthenticatedUser, IdentityProvider};
use papertrade_quotes::{IngestorUpstream, QuoteCache, QuoteFanout, ThrottleExt};
use papertrade_trading::{
    AccountService, InMemoryStore, InMemoryTradeHistoryCache, TradeEngine, TradeOutcome,
    TradeRequest,
};
use serde::Serialize;
use std::sync::Arc;

use crate::config::QuoteConfig;
use crate::error::ServiceError;

pub type Engine =
    TradeEngine<SystemClock, InMemoryStore, InMemoryStore, QuoteCache, InMemoryTradeHistoryCache>;
pub type Accounts = AccountService<
    SystemClock,
    InMemoryStore,
    InMemoryStore,
    InMemoryStore,
    InMemoryTradeHistoryCache,
>;
pub type Fanout = QuoteFanout<IngestorUpstream>;

/// One price on a watch stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricePoint {
    pub timestamp: Timestamp,
    pub price: Amount,
}

/// Caller-facing operations of the paper-trading service
pub struct PaperTradeService {
    identities: Arc<dyn IdentityProvider>,
    accounts: Arc<Accounts>,
    engine: Arc<Engine>,
    fanout: Arc<Fanout>,
    quotes: QuoteConfig,
}

impl PaperTradeService {
    pub fn new(
        identities: Arc<dyn IdentityProvider>,
        accounts: Arc<Accounts>,
        engine: Arc<Engine>,
        fanout: Arc<Fanout>,
        quotes: QuoteConfig,
    ) -> Self {
        Self {
            identities,
            accounts,
            engine,
            fanout,
            quotes,
        }
    }

    /// Resolve a token and make sure the caller has an account
    pub async fn authenticate(&self, token: &str) -> Result<User, ServiceError> {
        let identity = self.identities.authenticate(token).await?;
        self.ensure_account(identity.as_ref()).await
    }

    pub async fn ensure_account(&self, identity: &dyn AuthenticatedUser) -> Result<User, ServiceError> {
        Ok(self.accounts.ensure_account(identity).await?)
    }

    pub async fn portfolio(&self, user_id: &str) -> Result<Portfolio, ServiceError> {
        Ok(self.accounts.portfolio(user_id).await?)
    }

    pub async fn trade(
        &self,
        user_id: &str,
        action: TradeAction,
        symbol: &str,
        quantity: Option<Amount>,
    ) -> Result<TradeOutcome, ServiceError> {
        let request = TradeRequest {
            action,
            symbol: normalize_symbol(symbol),
            quantity,
        };
        Ok(self.engine.execute(user_id, request).await?)
    }

    pub async fn trade_history(&self, user_id: &str) -> Result<Vec<TradeRecord>, ServiceError> {
        Ok(self.accounts.trade_history(user_id).await?)
    }

    pub async fn valuation_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<ValuationHistory>, ServiceError> {
        Ok(self.accounts.valuation_history(user_id).await?)
    }

    /// Live prices of one symbol, at most one per `watch_max_rate` and ending
    /// after the session duration. Dropping the stream unsubscribes.
    pub async fn watch(&self, symbol: &str) -> Result<BoxStream<'static, PricePoint>, ServiceError> {
        let symbol = normalize_symbol(symbol);
        let supported = &self.engine.config().supported_symbols;
        if !is_supported(supported, &symbol) {
            return Err(ServiceError::Validation(format!(
                "only supported tickers are {:?}",
                supported
            )));
        }

        let subscription = self.fanout.subscribe().await?;
        info!("Watch on {} started (subscriber {})", symbol, subscription.id());

        let session = tokio::time::sleep(self.quotes.session());
        let stream = subscription
            .filter(move |quote| future::ready(quote.symbol == symbol))
            .throttle(self.quotes.watch_max_rate())
            .map(|quote| PricePoint {
                timestamp: quote.observed_at,
                price: quote.price,
            })
            .take_until(session);
        Ok(stream.boxed())
    }
}

/// Tickers are bare symbols; a trailing `-USD` is accepted from older clients
fn normalize_symbol(symbol: &str) -> Symbol {
    let symbol = symbol.trim();
    symbol.strip_suffix("-USD").unwrap_or(symbol).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("BTC-USD"), "BTC");
        assert_eq!(normalize_symbol(" ETH "), "ETH");
        assert_eq!(normalize_symbol("DOGE"), "DOGE");
    }
}
