use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const PESO_CURRENCY_CODE: &str = "PHP";
pub const PESO_SYMBOL: &str = "₱";

const CENTAVOS_PER_PESO: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// A fixed-point monetary amount, held as a whole number of centavos.
///
/// All ledger arithmetic happens on the integer representation, so equality checks such as "total paid equals the
/// order total" are exact. Amounts are signed: refunds are recorded as negative values.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a peso amount: {0}")]
pub struct MoneyConversionError(String);

/// Interprets the value as a number of centavos.
impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let pesos = abs / CENTAVOS_PER_PESO as u64;
        let centavos = abs % CENTAVOS_PER_PESO as u64;
        write!(f, "{sign}{PESO_SYMBOL}{pesos}.{centavos:02}")
    }
}

/// Parses decimal strings such as `"1000"`, `"600.5"`, `"-12.34"` or `"₱1,000.00"`.
///
/// More than two fractional digits is an error. Amounts are never rounded.
impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MoneyConversionError(s.to_string());
        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rest = rest.strip_prefix(PESO_SYMBOL).unwrap_or(rest).replace(',', "");
        let (whole, frac) = match rest.split_once('.') {
            Some((w, f)) => (w, f),
            None => (rest.as_str(), ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(err());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let pesos = whole.parse::<i64>().map_err(|_| err())?;
        let centavos = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse::<i64>().map_err(|_| err())?,
        };
        let value = pesos.checked_mul(CENTAVOS_PER_PESO).and_then(|v| v.checked_add(centavos)).ok_or_else(err)?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    /// The amount in centavos.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_centavos(centavos: i64) -> Self {
        Self(centavos)
    }

    pub fn from_pesos(pesos: i64) -> Self {
        Self(pesos * CENTAVOS_PER_PESO)
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Self)
    }

    pub fn abs(self) -> Money {
        Self(self.0.abs())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}
