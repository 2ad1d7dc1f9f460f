//! Request checks that run before any quote or store access

use papertrade_core::{Amount, Symbol, TradeAction, is_supported};

use crate::engine::TradeRequest;
use crate::error::TradeError;

/// Check action, quantity, then symbol. Returns the quantity to trade.
pub fn validate_trade(request: &TradeRequest, supported: &[Symbol]) -> Result<Amount, TradeError> {
    if request.action == TradeAction::Unspecified {
        return Err(TradeError::Validation("trade action not specified".into()));
    }

    let quantity = request
        .quantity
        .ok_or_else(|| TradeError::Validation("quantity not specified".into()))?;
    if quantity.is_zero() {
        return Err(TradeError::Validation("quantity cannot be zero".into()));
    }
    if quantity.units < 0 || quantity.nanos < 0 {
        return Err(TradeError::Validation("quantity cannot be negative".into()));
    }
    if !quantity.is_valid() {
        return Err(TradeError::Validation("malformed quantity".into()));
    }

    if request.symbol.is_empty() {
        return Err(TradeError::Validation("ticker not specified".into()));
    }
    if !is_supported(supported, &request.symbol) {
        return Err(TradeError::Validation(format!(
            "ticker {} is not supported (try: {})",
            request.symbol,
            supported.join(", ")
        )));
    }

    Ok(quantity)
}
