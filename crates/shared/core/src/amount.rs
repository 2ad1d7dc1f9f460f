//! Exact fixed-point amounts
//!
//! An [`Amount`] is stored as an integer part (`units`) and a fractional part in
//! billionths (`nanos`). All arithmetic goes through [`rust_decimal::Decimal`] and
//! is converted back by truncating toward zero at 9 fractional digits, so no
//! binary floating point is ever involved.
//!
//! Both components carry the sign of the value. An amount whose integer part is
//! zero keeps its sign in `nanos` alone, e.g. `-0.5` is `{units: 0, nanos: -500_000_000}`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;
use thiserror::Error;

/// Number of nanos in one unit
pub const NANOS_PER_UNIT: i32 = 1_000_000_000;

const NANO_DIGITS: usize = 9;
const NANO_SCALE: u32 = 9;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("malformed decimal amount: {0:?}")]
    Parse(String),

    #[error("amount out of range")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,
}

/// Exact decimal amount with 9 fractional digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Amount {
    pub units: i64,
    pub nanos: i32,
}

impl Amount {
    pub const ZERO: Amount = Amount { units: 0, nanos: 0 };

    pub const fn new(units: i64, nanos: i32) -> Self {
        Amount { units, nanos }
    }

    pub const fn from_units(units: i64) -> Self {
        Amount { units, nanos: 0 }
    }

    /// Parse a plain decimal string such as `"57469.71"`, `"-0.5"`, `"3."` or `".3"`.
    ///
    /// Fractional digits past the ninth are truncated.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let malformed = || AmountError::Parse(input.to_string());

        let (negative, digits) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input.strip_prefix('+').unwrap_or(input)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(malformed());
        }
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(malformed());
        }

        let units: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| AmountError::Overflow)?
        };

        let frac = &frac_part[..frac_part.len().min(NANO_DIGITS)];
        let nanos: i32 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = NANO_DIGITS)
                .parse()
                .map_err(|_| malformed())?
        };

        if negative {
            Ok(Amount::new(-units, -nanos))
        } else {
            Ok(Amount::new(units, nanos))
        }
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::from(self.units) + Decimal::new(i64::from(self.nanos), NANO_SCALE)
    }

    /// Convert from the decimal domain, truncating toward zero at 9 fractional digits.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        let truncated = value.round_dp_with_strategy(NANO_SCALE, RoundingStrategy::ToZero);
        let whole = truncated.trunc();
        let units = whole.to_i64().ok_or(AmountError::Overflow)?;
        let nanos = ((truncated - whole) * Decimal::from(NANOS_PER_UNIT))
            .to_i32()
            .ok_or(AmountError::Overflow)?;
        Ok(Amount::new(units, nanos))
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        let sum = self
            .to_decimal()
            .checked_add(rhs.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Amount::from_decimal(sum)
    }

    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, AmountError> {
        let diff = self
            .to_decimal()
            .checked_sub(rhs.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Amount::from_decimal(diff)
    }

    pub fn checked_mul(self, rhs: Amount) -> Result<Amount, AmountError> {
        let product = self
            .to_decimal()
            .checked_mul(rhs.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Amount::from_decimal(product)
    }

    pub fn checked_div(self, rhs: Amount) -> Result<Amount, AmountError> {
        if rhs.is_zero() {
            return Err(AmountError::DivisionByZero);
        }
        let quotient = self
            .to_decimal()
            .checked_div(rhs.to_decimal())
            .ok_or(AmountError::Overflow)?;
        Amount::from_decimal(quotient)
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0 && self.nanos == 0
    }

    pub fn is_negative(&self) -> bool {
        self.units < 0 || self.nanos < 0
    }

    /// `nanos` is in range and both parts agree on the sign
    pub fn is_valid(&self) -> bool {
        if self.nanos.unsigned_abs() >= NANOS_PER_UNIT as u32 {
            return false;
        }
        !((self.units > 0 && self.nanos < 0) || (self.units < 0 && self.nanos > 0))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Decimal {
        amount.to_decimal()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::from_decimal(value)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Amount::new(-self.units, -self.nanos)
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_decimal().cmp(&other.to_decimal())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(
            f,
            "{}{}.{:09}",
            sign,
            self.units.unsigned_abs(),
            self.nanos.unsigned_abs()
        )
    }
}
