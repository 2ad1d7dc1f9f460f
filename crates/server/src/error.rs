use papertrade_ports::{AuthError, FeedError};
use papertrade_trading::TradeError;
use thiserror::Error;

/// Errors surfaced to callers of [`crate::PaperTradeService`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(#[from] AuthError),

    /// Bad request; retrying it unchanged fails again
    #[error("invalid request: {0}")]
    Validation(String),

    /// Transient; the caller may retry
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal(String),
}

impl From<TradeError> for ServiceError {
    fn from(err: TradeError) -> Self {
        match err {
            TradeError::Validation(msg) => ServiceError::Validation(msg),
            TradeError::Unavailable(msg) => ServiceError::Unavailable(msg),
            TradeError::Internal(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<FeedError> for ServiceError {
    fn from(err: FeedError) -> Self {
        ServiceError::Unavailable(format!("failed to register quote watch: {}", err))
    }
}
