use log::{debug, error, info, warn};
use papertrade_core::{Amount, Portfolio, Symbol, Timestamp, TradeAction, TradeRecord};
use papertrade_ports::{Clock, QuoteSource, TradeHistoryCache, TradeLogRepository, UserRepository};
use std::sync::Arc;
use tokio::time::timeout;

use crate::config::TradeEngineConfig;
use crate::error::TradeError;
use crate::validation::validate_trade;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    pub action: TradeAction,
    pub symbol: Symbol,
    pub quantity: Option<Amount>,
}

impl TradeRequest {
    pub fn buy(symbol: impl Into<Symbol>, quantity: Amount) -> Self {
        Self {
            action: TradeAction::Buy,
            symbol: symbol.into(),
            quantity: Some(quantity),
        }
    }

    pub fn sell(symbol: impl Into<Symbol>, quantity: Amount) -> Self {
        Self {
            action: TradeAction::Sell,
            symbol: symbol.into(),
            quantity: Some(quantity),
        }
    }
}

/// Result of an executed trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    pub action: TradeAction,
    pub symbol: Symbol,
    pub quantity: Amount,
    pub executed_price: Amount,
    pub timestamp: Timestamp,
    /// Portfolio as committed
    pub portfolio: Portfolio,
}

/// Executes single trades against a user's portfolio.
///
/// Each trade is one optimistic read-modify-write of the user document. A
/// version conflict fails the trade instead of retrying it, so a trade is
/// never applied against a portfolio the caller did not see priced.
pub struct TradeEngine<K, U, L, Q, H>
where
    K: Clock,
    U: UserRepository,
    L: TradeLogRepository,
    Q: QuoteSource,
    H: TradeHistoryCache,
{
    clock: Arc<K>,
    users: Arc<U>,
    trade_log: Arc<L>,
    quotes: Arc<Q>,
    history_cache: Arc<H>,
    config: TradeEngineConfig,
}

impl<K, U, L, Q, H> TradeEngine<K, U, L, Q, H>
where
    K: Clock,
    U: UserRepository,
    L: TradeLogRepository,
    Q: QuoteSource,
    H: TradeHistoryCache,
{
    pub fn new(
        clock: Arc<K>,
        users: Arc<U>,
        trade_log: Arc<L>,
        quotes: Arc<Q>,
        history_cache: Arc<H>,
        config: TradeEngineConfig,
    ) -> Self {
        Self {
            clock,
            users,
            trade_log,
            quotes,
            history_cache,
            config,
        }
    }

    pub fn config(&self) -> &TradeEngineConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        user_id: &str,
        request: TradeRequest,
    ) -> Result<TradeOutcome, TradeError> {
        let quantity = validate_trade(&request, &self.config.supported_symbols)?;
        let price = self.quote(&request.symbol).await?;
        let now = self.clock.now();

        let portfolio = match timeout(
            self.config.trade_deadline(),
            self.commit(user_id, &request, price, quantity, now),
        )
        .await
        {
            Ok(committed) => committed?,
            Err(_) => {
                warn!("Trade for {} hit the {:?} deadline", user_id, self.config.trade_deadline());
                return Err(TradeError::Unavailable(
                    "trade could not be completed in time".into(),
                ));
            }
        };

        info!(
            "{} {} {} {} @ {}",
            user_id, request.action, quantity, request.symbol, price
        );

        let record = TradeRecord {
            timestamp: now,
            symbol: request.symbol.clone(),
            action: request.action,
            size: quantity,
            price,
        };
        self.bookkeep(user_id, record).await;

        Ok(TradeOutcome {
            action: request.action,
            symbol: request.symbol,
            quantity,
            executed_price: price,
            timestamp: now,
            portfolio,
        })
    }

    async fn quote(&self, symbol: &str) -> Result<Amount, TradeError> {
        let fetch = self
            .quotes
            .fresh_quote(symbol, self.config.max_quote_age());
        match timeout(self.config.quote_deadline(), fetch).await {
            Ok(Ok(price)) => Ok(price),
            Ok(Err(e)) => {
                error!("Quote lookup for {} failed: {}", symbol, e);
                Err(e.into())
            }
            Err(_) => {
                warn!("No fresh {} quote within {:?}", symbol, self.config.quote_deadline());
                Err(TradeError::Unavailable(format!(
                    "could not get a fresh {} quote in time",
                    symbol
                )))
            }
        }
    }

    /// Read, apply and compare-and-set. Nothing is written on any error.
    async fn commit(
        &self,
        user_id: &str,
        request: &TradeRequest,
        price: Amount,
        quantity: Amount,
        now: Timestamp,
    ) -> Result<Portfolio, TradeError> {
        let current = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| TradeError::Internal(format!("user {} not found", user_id)))?;

        let mut user = current.value;
        user.portfolio
            .apply_trade(request.action, &request.symbol, price, quantity)?;
        user.trade_stats.record(now);

        let stored = self
            .users
            .compare_and_set(user_id, current.version, user)
            .await?;
        Ok(stored.value.portfolio)
    }

    /// Post-commit housekeeping. Failures are logged and never undo the trade.
    async fn bookkeep(&self, user_id: &str, record: TradeRecord) {
        if let Err(e) = self.trade_log.append_trade(user_id, record).await {
            error!("Failed to record trade for {}: {}", user_id, e);
        }
        if let Err(e) = self.history_cache.invalidate(user_id).await {
            warn!("Failed to invalidate trade history cache for {}: {}", user_id, e);
        }

        if !self.should_prune() {
            return;
        }
        match self
            .trade_log
            .prune_trades(user_id, self.config.max_trade_history)
            .await
        {
            Ok(0) => {}
            Ok(removed) => debug!("Pruned {} old trades of {}", removed, user_id),
            Err(e) => warn!("Failed to prune trade history of {}: {}", user_id, e),
        }
    }

    fn should_prune(&self) -> bool {
        rand::random::<f64>() < self.config.history_prune_probability
    }
}
