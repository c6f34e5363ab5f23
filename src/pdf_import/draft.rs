//! Raw values collected from one block before records are built.

use chrono::NaiveDateTime;

use super::units::ExchangeRate;
use crate::pp::{AccountTransactionType, Money, PortfolioTransactionType};

/// Which record a draft turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftKind {
    BuySell(PortfolioTransactionType),
    Account(AccountTransactionType),
}

impl DraftKind {
    /// Money flows into the account (sale, dividend, deposit, ...)
    pub fn is_credit(&self) -> bool {
        match self {
            Self::BuySell(t) => !t.is_purchase(),
            Self::Account(t) => t.is_credit(),
        }
    }

    pub fn is_tax_booking(&self) -> bool {
        matches!(self, Self::Account(t) if t.is_tax_booking())
    }
}

/// Security as printed on the document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRef {
    pub name: Option<String>,
    pub isin: Option<String>,
    pub wkn: Option<String>,
    /// Quotation currency stated on the document
    pub currency: Option<String>,
}

impl SecurityRef {
    pub fn identifier(&self) -> Option<&str> {
        self.isin.as_deref().or(self.wkn.as_deref())
    }
}

/// A tax or fee line with the name it was printed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub label: Option<String>,
    pub amount: Money,
}

/// Values extracted from one block by a shape
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    /// Name of the shape that produced the draft
    pub shape: &'static str,
    pub kind: DraftKind,
    pub date: Option<NaiveDateTime>,
    /// Shares * 10^8
    pub shares: Option<i64>,
    pub security: Option<SecurityRef>,
    /// Booked amount (what hit the account)
    pub amount: Option<Money>,
    /// Gross value in the booking currency
    pub gross: Option<Money>,
    /// Gross value in the security currency
    pub forex_gross: Option<Money>,
    pub exchange_rate: Option<ExchangeRate>,
    pub taxes: Vec<Charge>,
    pub fees: Vec<Charge>,
    pub notes: Vec<String>,
    /// Reason the record cannot be imported as-is
    pub failure: Option<String>,
}

impl TransactionDraft {
    pub fn new(shape: &'static str, kind: DraftKind) -> Self {
        Self {
            shape,
            kind,
            date: None,
            shares: None,
            security: None,
            amount: None,
            gross: None,
            forex_gross: None,
            exchange_rate: None,
            taxes: Vec::new(),
            fees: Vec::new(),
            notes: Vec::new(),
            failure: None,
        }
    }

    pub fn security_mut(&mut self) -> &mut SecurityRef {
        self.security.get_or_insert_with(SecurityRef::default)
    }

    /// Append a part of the security name (names often span two lines)
    pub fn append_name(&mut self, part: &str) {
        let part = part.trim();
        if part.is_empty() {
            return;
        }
        let security = self.security_mut();
        security.name = Some(match security.name.take() {
            Some(name) => format!("{} {}", name, part),
            None => part.to_string(),
        });
    }

    /// Record a tax line; zero amounts are not components
    pub fn add_tax(&mut self, label: &str, amount: Money) {
        if !amount.is_zero() {
            self.taxes.push(Charge {
                label: Some(label.trim().to_string()),
                amount,
            });
        }
    }

    /// Record a fee line; zero amounts are not components
    pub fn add_fee(&mut self, label: &str, amount: Money) {
        if !amount.is_zero() {
            self.fees.push(Charge {
                label: Some(label.trim().to_string()),
                amount,
            });
        }
    }

    pub fn add_note(&mut self, note: &str) {
        let note = note.trim();
        if !note.is_empty() {
            self.notes.push(note.to_string());
        }
    }

    /// Note parts joined with " | "
    pub fn note(&self) -> Option<String> {
        if self.notes.is_empty() {
            None
        } else {
            Some(self.notes.join(" | "))
        }
    }

    /// Currency of the booking: the amount's, else the gross value's
    pub fn booking_currency(&self) -> Option<&str> {
        self.amount
            .as_ref()
            .or(self.gross.as_ref())
            .map(|m| m.currency.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_spans_lines() {
        let mut draft = TransactionDraft::new(
            "test",
            DraftKind::BuySell(PortfolioTransactionType::Buy),
        );
        draft.append_name("Boeing Co.");
        draft.append_name(" Registered Shares DL 5 ");
        assert_eq!(
            draft.security.unwrap().name.as_deref(),
            Some("Boeing Co. Registered Shares DL 5")
        );
    }

    #[test]
    fn test_zero_charges_are_skipped() {
        let mut draft = TransactionDraft::new(
            "test",
            DraftKind::Account(AccountTransactionType::Dividends),
        );
        draft.add_tax("Kapitalertragsteuer", Money::zero("EUR"));
        draft.add_fee("Provision", Money::new(990, "EUR"));
        assert!(draft.taxes.is_empty());
        assert_eq!(draft.fees.len(), 1);
    }

    #[test]
    fn test_note_joined() {
        let mut draft = TransactionDraft::new(
            "test",
            DraftKind::Account(AccountTransactionType::Dividends),
        );
        assert_eq!(draft.note(), None);
        draft.add_note("Ref.-Nr.: 1AB2");
        draft.add_note("Quartalsdividende");
        assert_eq!(draft.note().as_deref(), Some("Ref.-Nr.: 1AB2 | Quartalsdividende"));
    }

    #[test]
    fn test_kind_direction() {
        assert!(!DraftKind::BuySell(PortfolioTransactionType::Buy).is_credit());
        assert!(DraftKind::BuySell(PortfolioTransactionType::Sell).is_credit());
        assert!(DraftKind::Account(AccountTransactionType::TaxRefund).is_tax_booking());
    }
}
