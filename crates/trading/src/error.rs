//! Error taxonomy surfaced to callers

use papertrade_core::{AmountError, PortfolioError};
use papertrade_ports::{QuoteError, StoreError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeError {
    /// Bad request or a trade the portfolio cannot cover; never retried
    #[error("{0}")]
    Validation(String),

    /// Transient; the caller may retry
    #[error("{0}")]
    Unavailable(String),

    /// Logged in full, surfaced opaquely
    #[error("{0}")]
    Internal(String),
}

impl TradeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradeError::Unavailable(_))
    }
}

impl From<PortfolioError> for TradeError {
    fn from(e: PortfolioError) -> Self {
        match e {
            PortfolioError::Amount(inner) => TradeError::Internal(inner.to_string()),
            other => TradeError::Validation(other.to_string()),
        }
    }
}

impl From<AmountError> for TradeError {
    fn from(e: AmountError) -> Self {
        TradeError::Internal(e.to_string())
    }
}

impl From<StoreError> for TradeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => {
                TradeError::Unavailable("concurrent trade in progress, try again".to_string())
            }
            other => TradeError::Internal(other.to_string()),
        }
    }
}

impl From<QuoteError> for TradeError {
    fn from(e: QuoteError) -> Self {
        TradeError::Internal(format!("failed to get a quote: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_classification() {
        let conflict: TradeError = StoreError::Conflict("alice".into()).into();
        assert!(conflict.is_retryable());

        let cash: TradeError = PortfolioError::InsufficientCash(Decimal::from(-5)).into();
        assert_eq!(
            cash,
            TradeError::Validation("insufficient cash after transaction (-5)".into())
        );

        let backend: TradeError = StoreError::Backend("down".into()).into();
        assert!(matches!(backend, TradeError::Internal(_)));
        assert!(!backend.is_retryable());
    }
}
