use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use super::TradeAction;
use crate::amount::{Amount, AmountError};
use crate::values::Symbol;

/// Reasons a trade cannot be applied to a portfolio
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortfolioError {
    #[error("don't have a {0} position in portfolio")]
    NoPosition(Symbol),

    #[error("insufficient cash after transaction ({0})")]
    InsufficientCash(Decimal),

    #[error("insufficient {symbol} positions ({resulting}) after transaction (current: {current})")]
    InsufficientPosition {
        symbol: Symbol,
        resulting: Decimal,
        current: Decimal,
    },

    #[error("trade action not specified")]
    UnspecifiedAction,

    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Cash balance and per-symbol holdings of one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Amount,
    pub positions: BTreeMap<Symbol, Amount>,
}

impl Portfolio {
    /// Portfolio with `cash` and a zero position for each symbol
    pub fn seeded<S: AsRef<str>>(cash: Amount, symbols: &[S]) -> Self {
        let positions = symbols
            .iter()
            .map(|s| (s.as_ref().to_string(), Amount::ZERO))
            .collect();
        Self { cash, positions }
    }

    pub fn position(&self, symbol: &str) -> Option<Amount> {
        self.positions.get(symbol).copied()
    }

    /// Apply a BUY or SELL of `quantity` at `price`.
    ///
    /// The portfolio is left untouched when an error is returned.
    pub fn apply_trade(
        &mut self,
        action: TradeAction,
        symbol: &str,
        price: Amount,
        quantity: Amount,
    ) -> Result<(), PortfolioError> {
        let current = self
            .position(symbol)
            .ok_or_else(|| PortfolioError::NoPosition(symbol.to_string()))?
            .to_decimal();

        let mut cost = quantity
            .to_decimal()
            .checked_mul(price.to_decimal())
            .ok_or(AmountError::Overflow)?;
        let mut delta = quantity.to_decimal();
        match action {
            TradeAction::Buy => {}
            TradeAction::Sell => {
                cost = -cost;
                delta = -delta;
            }
            TradeAction::Unspecified => return Err(PortfolioError::UnspecifiedAction),
        }

        let final_cash = self
            .cash
            .to_decimal()
            .checked_sub(cost)
            .ok_or(AmountError::Overflow)?;
        let final_position = current.checked_add(delta).ok_or(AmountError::Overflow)?;

        if final_cash < Decimal::ZERO {
            return Err(PortfolioError::InsufficientCash(final_cash));
        }
        if final_position < Decimal::ZERO {
            return Err(PortfolioError::InsufficientPosition {
                symbol: symbol.to_string(),
                resulting: final_position,
                current,
            });
        }

        let cash = Amount::from_decimal(final_cash)?;
        let position = Amount::from_decimal(final_position)?;
        self.cash = cash;
        self.positions.insert(symbol.to_string(), position);
        Ok(())
    }

    /// Cash plus every position marked at `quotes`.
    ///
    /// Positions without a quote count as zero.
    pub fn valuation(&self, quotes: &HashMap<Symbol, Amount>) -> Result<Amount, AmountError> {
        let mut total = self.cash.to_decimal();
        for (symbol, size) in &self.positions {
            let Some(quote) = quotes.get(symbol) else {
                continue;
            };
            let value = size
                .to_decimal()
                .checked_mul(quote.to_decimal())
                .ok_or(AmountError::Overflow)?;
            total = total.checked_add(value).ok_or(AmountError::Overflow)?;
        }
        Amount::from_decimal(total)
    }
}
