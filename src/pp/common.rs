//! Common types shared across the portfolio data model.

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Factor for converting shares (shares are stored * 10^8)
pub const SHARES_FACTOR: i64 = 100_000_000;

/// Factor for converting amounts (amounts are stored in cents)
pub const AMOUNT_FACTOR: i64 = 100;

/// Decimal places of a stored share count
pub const SHARES_SCALE: u32 = 8;

/// Decimal places of a stored amount
pub const AMOUNT_SCALE: u32 = 2;

// =============================================================================
// Money
// =============================================================================

/// Monetary amount with currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Amount in smallest currency units (e.g., cents for EUR)
    pub amount: i64,
    /// ISO 4217 currency code (e.g., "EUR", "USD")
    pub currency: String,
}

impl Money {
    pub fn new(amount: i64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    /// Create a zero-value Money in the given currency
    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(0, currency)
    }

    /// Convert to decimal representation (e.g., cents to euros)
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount, AMOUNT_SCALE)
    }

    /// Create from decimal representation, rounding half away from zero.
    /// Returns `None` if the value does not fit into minor units.
    pub fn from_decimal(value: Decimal, currency: impl Into<String>) -> Option<Self> {
        let minor = value
            .checked_mul(Decimal::from(AMOUNT_FACTOR))?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()?;
        Some(Self::new(minor, currency))
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Add another Money (must be same currency)
    pub fn add(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(
            self.amount.checked_add(other.amount)?,
            self.currency.clone(),
        ))
    }

    /// Subtract another Money (must be same currency)
    pub fn sub(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(
            self.amount.checked_sub(other.amount)?,
            self.currency.clone(),
        ))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.to_decimal())
    }
}

/// Forex conversion information
///
/// `exchange_rate` is quoted as domestic units per foreign unit, so
/// `domestic = amount * exchange_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForexInfo {
    /// Amount in foreign currency (smallest units)
    pub amount: Money,
    /// Exchange rate used for conversion
    pub exchange_rate: Decimal,
}

impl ForexInfo {
    pub fn new(amount: Money, exchange_rate: Decimal) -> Self {
        Self {
            amount,
            exchange_rate,
        }
    }

    /// Domestic value of the foreign amount, rounded half-even to minor units
    pub fn domestic_value(&self, currency: &str) -> Option<Money> {
        let value = self
            .amount
            .to_decimal()
            .checked_mul(self.exchange_rate)?
            .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven);
        Money::from_decimal(value, currency)
    }
}

// =============================================================================
// Provenance
// =============================================================================

/// Set of source document labels a record was built from.
///
/// Rendered as the sorted, deduplicated labels joined with `"; "`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Provenance(BTreeSet<String>);

impl Provenance {
    pub fn new(label: impl Into<String>) -> Self {
        let mut labels = BTreeSet::new();
        labels.insert(label.into());
        Self(labels)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add all labels of `other`
    pub fn extend(&mut self, other: &Provenance) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Is every label of `other` already part of this provenance?
    pub fn contains_all(&self, other: &Provenance) -> bool {
        other.0.is_subset(&self.0)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.labels().collect();
        f.write_str(&joined.join("; "))
    }
}

impl From<String> for Provenance {
    fn from(value: String) -> Self {
        Self(
            value
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl From<Provenance> for String {
    fn from(value: Provenance) -> Self {
        value.to_string()
    }
}

/// Helper functions for share conversions
pub mod shares {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;

    use super::{SHARES_FACTOR, SHARES_SCALE};

    /// Convert from internal format (shares * 10^8) to decimal
    pub fn to_decimal(shares: i64) -> Decimal {
        Decimal::new(shares, SHARES_SCALE)
    }

    /// Convert from decimal to internal format (shares * 10^8).
    /// Returns `None` when the count has more than eight fractional digits
    /// or does not fit.
    pub fn from_decimal(shares: Decimal) -> Option<i64> {
        let scaled = shares.checked_mul(Decimal::from(SHARES_FACTOR))?;
        if scaled.fract() != Decimal::ZERO {
            return None;
        }
        scaled.to_i64()
    }
}
