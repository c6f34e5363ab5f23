//! Transaction types produced by the document import.
//!
//! Transactions belong either to accounts (AccountTransaction) or to
//! portfolios (PortfolioTransaction). A buy or sell always creates both
//! sides at once, see [`BuySellEntry`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::common::{ForexInfo, Money, Provenance};

/// Unit type for transaction components (fees, taxes, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitType {
    /// Broker/transaction fee
    Fee,
    /// Tax amount
    Tax,
    /// Gross transaction value (before fees/taxes)
    GrossValue,
}

/// A single unit (component) of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUnit {
    pub unit_type: UnitType,
    pub amount: Money,
    /// Forex information if the unit was in a different currency
    pub forex: Option<ForexInfo>,
    /// Kind of tax or fee as printed on the document (e.g. "Provision")
    pub label: Option<String>,
}

impl TransactionUnit {
    pub fn new(unit_type: UnitType, amount: Money) -> Self {
        Self {
            unit_type,
            amount,
            forex: None,
            label: None,
        }
    }

    pub fn with_forex(mut self, forex: ForexInfo) -> Self {
        self.forex = Some(forex);
        self
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Create a fee unit
    pub fn fee(amount: Money) -> Self {
        Self::new(UnitType::Fee, amount)
    }

    /// Create a tax unit
    pub fn tax(amount: Money) -> Self {
        Self::new(UnitType::Tax, amount)
    }

    /// Create a gross value unit
    pub fn gross_value(amount: Money) -> Self {
        Self::new(UnitType::GrossValue, amount)
    }
}

/// Link between the portfolio and the account side of a buy/sell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossEntry {
    /// UUID of the portfolio transaction
    pub portfolio_uuid: String,
    /// UUID of the account transaction
    pub account_uuid: String,
}

impl CrossEntry {
    pub fn buy_sell(portfolio_uuid: String, account_uuid: String) -> Self {
        Self {
            portfolio_uuid,
            account_uuid,
        }
    }
}

/// Account transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountTransactionType {
    /// Cash deposit
    Deposit,
    /// Cash withdrawal
    Removal,
    /// Interest income
    Interest,
    /// Interest charge (negative)
    InterestCharge,
    /// Dividend payment
    Dividends,
    /// Fee charge
    Fees,
    /// Tax charge
    Taxes,
    /// Tax refund
    TaxRefund,
    /// Buy (debit when paying from cash)
    Buy,
    /// Sell (credit when receiving cash)
    Sell,
}

impl AccountTransactionType {
    /// Is this a credit (money coming in)?
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::Deposit | Self::Interest | Self::Dividends | Self::TaxRefund | Self::Sell
        )
    }

    /// Tax bookings carry their tax components as units summing to the amount
    pub fn is_tax_booking(&self) -> bool {
        matches!(self, Self::Taxes | Self::TaxRefund)
    }

    /// Income postings a later tax booking can be merged into
    pub fn is_income(&self) -> bool {
        matches!(self, Self::Dividends | Self::Interest)
    }
}

/// Portfolio transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioTransactionType {
    /// Purchase of securities
    Buy,
    /// Sale of securities
    Sell,
}

impl PortfolioTransactionType {
    /// Is this a purchase (shares coming in)?
    pub fn is_purchase(&self) -> bool {
        matches!(self, Self::Buy)
    }

    /// Type of the mirrored account posting
    pub fn account_type(&self) -> AccountTransactionType {
        match self {
            Self::Buy => AccountTransactionType::Buy,
            Self::Sell => AccountTransactionType::Sell,
        }
    }
}

fn sum_units(units: &[TransactionUnit], unit_type: UnitType) -> i64 {
    units
        .iter()
        .filter(|u| u.unit_type == unit_type)
        .map(|u| u.amount.amount)
        .sum()
}

fn gross_unit(units: &[TransactionUnit]) -> Option<&TransactionUnit> {
    units.iter().find(|u| u.unit_type == UnitType::GrossValue)
}

/// Account transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTransaction {
    pub uuid: String,
    pub date: NaiveDateTime,
    pub transaction_type: AccountTransactionType,
    pub amount: Money,
    /// Number of shares (for dividends) - stored as shares * 10^8, zero for cash postings
    pub shares: i64,
    /// Reference to security (for dividends, taxes on securities)
    pub security_uuid: Option<String>,
    /// Transaction units (fees, taxes, forex)
    pub units: Vec<TransactionUnit>,
    /// Cross-entry for the account side of a buy/sell
    pub cross_entry: Option<CrossEntry>,
    pub note: Option<String>,
    /// Source documents
    pub source: Provenance,
    /// Set when the posting was extracted but cannot be imported as-is
    pub failure: Option<String>,
}

impl AccountTransaction {
    pub fn new(
        date: NaiveDateTime,
        transaction_type: AccountTransactionType,
        amount: Money,
        source: Provenance,
    ) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            date,
            transaction_type,
            amount,
            shares: 0,
            security_uuid: None,
            units: Vec::new(),
            cross_entry: None,
            note: None,
            source,
            failure: None,
        }
    }

    /// Calculate total fees from units
    pub fn total_fees(&self) -> i64 {
        sum_units(&self.units, UnitType::Fee)
    }

    /// Calculate total taxes from units
    pub fn total_taxes(&self) -> i64 {
        sum_units(&self.units, UnitType::Tax)
    }

    /// Gross value in the transaction currency
    pub fn gross_value(&self) -> i64 {
        if let Some(unit) = gross_unit(&self.units) {
            return unit.amount.amount;
        }
        if self.transaction_type.is_tax_booking() {
            return self.amount.amount;
        }
        let charges = self.total_fees() + self.total_taxes();
        if self.transaction_type.is_credit() {
            self.amount.amount + charges
        } else {
            self.amount.amount - charges
        }
    }

    /// Does the amount reconcile with its units within `tolerance` minor units?
    pub fn units_reconcile(&self, tolerance: i64) -> bool {
        if self.transaction_type.is_tax_booking() {
            let taxes = self.total_taxes();
            return self.units.is_empty() || (self.amount.amount - taxes).abs() <= tolerance;
        }
        let charges = self.total_fees() + self.total_taxes();
        let expected = if self.transaction_type.is_credit() {
            self.gross_value() - charges
        } else {
            self.gross_value() + charges
        };
        (self.amount.amount - expected).abs() <= tolerance
    }
}

/// Portfolio transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioTransaction {
    pub uuid: String,
    pub date: NaiveDateTime,
    pub transaction_type: PortfolioTransactionType,
    pub amount: Money,
    /// Number of shares - stored as shares * 10^8
    pub shares: i64,
    /// Reference to security
    pub security_uuid: String,
    /// Transaction units (fees, taxes, forex)
    pub units: Vec<TransactionUnit>,
    pub cross_entry: Option<CrossEntry>,
    pub note: Option<String>,
    /// Source documents
    pub source: Provenance,
}

impl PortfolioTransaction {
    /// Calculate total fees from units
    pub fn total_fees(&self) -> i64 {
        sum_units(&self.units, UnitType::Fee)
    }

    /// Calculate total taxes from units
    pub fn total_taxes(&self) -> i64 {
        sum_units(&self.units, UnitType::Tax)
    }

    /// Gross value (market value of the shares) in the transaction currency
    pub fn gross_value(&self) -> i64 {
        if let Some(unit) = gross_unit(&self.units) {
            return unit.amount.amount;
        }
        let charges = self.total_fees() + self.total_taxes();
        if self.transaction_type.is_purchase() {
            self.amount.amount - charges
        } else {
            self.amount.amount + charges
        }
    }

    /// Does the amount reconcile with its units within `tolerance` minor units?
    pub fn units_reconcile(&self, tolerance: i64) -> bool {
        let charges = self.total_fees() + self.total_taxes();
        let expected = if self.transaction_type.is_purchase() {
            self.gross_value() + charges
        } else {
            self.gross_value() - charges
        };
        (self.amount.amount - expected).abs() <= tolerance
    }
}

/// A buy or sell: the portfolio side and its mirrored account posting.
///
/// Both sides share date, shares, amount, units, note and source and are
/// only ever created together through [`BuySellEntry::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuySellEntry {
    pub portfolio: PortfolioTransaction,
    pub account: AccountTransaction,
}

impl BuySellEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transaction_type: PortfolioTransactionType,
        date: NaiveDateTime,
        security_uuid: String,
        shares: i64,
        amount: Money,
        units: Vec<TransactionUnit>,
        note: Option<String>,
        source: Provenance,
    ) -> Self {
        let portfolio_uuid = uuid::Uuid::new_v4().to_string();
        let account_uuid = uuid::Uuid::new_v4().to_string();
        let cross_entry = CrossEntry::buy_sell(portfolio_uuid.clone(), account_uuid.clone());

        let account = AccountTransaction {
            uuid: account_uuid,
            date,
            transaction_type: transaction_type.account_type(),
            amount: amount.clone(),
            shares,
            security_uuid: Some(security_uuid.clone()),
            units: units.clone(),
            cross_entry: Some(cross_entry.clone()),
            note: note.clone(),
            source: source.clone(),
            failure: None,
        };
        let portfolio = PortfolioTransaction {
            uuid: portfolio_uuid,
            date,
            transaction_type,
            amount,
            shares,
            security_uuid,
            units,
            cross_entry: Some(cross_entry),
            note,
            source,
        };

        Self { portfolio, account }
    }
}
