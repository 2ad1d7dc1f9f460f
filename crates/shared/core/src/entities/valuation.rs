use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::values::Timestamp;

/// Hourly snapshot of a user's total portfolio value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationHistory {
    pub timestamp: Timestamp,
    pub value: Amount,
}
