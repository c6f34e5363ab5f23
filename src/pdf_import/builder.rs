//! Turning drafts into records.
//!
//! Runs in the sequential pass of a batch: it is the only place that reads
//! from and writes to the security registry.

use super::draft::{DraftKind, SecurityRef, TransactionDraft};
use super::registry::SecurityRegistry;
use super::units::UnitReconciler;
use super::Item;
use crate::config::ExtractorConfig;
use crate::error::ExtractionError;
use crate::pp::{AccountTransaction, AccountTransactionType, BuySellEntry, Provenance, Security};

/// Security a draft refers to and whether it still has to be registered
enum ResolvedSecurity {
    Known(Security),
    New(Security),
}

impl ResolvedSecurity {
    fn security(&self) -> &Security {
        match self {
            Self::Known(s) | Self::New(s) => s,
        }
    }
}

pub struct RecordBuilder<'r> {
    registry: &'r dyn SecurityRegistry,
    reconciler: UnitReconciler,
    default_currency: String,
}

impl<'r> RecordBuilder<'r> {
    pub fn new(registry: &'r dyn SecurityRegistry, config: &ExtractorConfig) -> Self {
        Self {
            registry,
            reconciler: UnitReconciler::new(config.tolerance_minor_units),
            default_currency: config.default_currency.clone(),
        }
    }

    /// Build the items of one draft. A security first seen here is
    /// registered and returned ahead of the record.
    pub fn build(
        &self,
        draft: &TransactionDraft,
        source: &Provenance,
    ) -> Result<Vec<Item>, ExtractionError> {
        let date = draft
            .date
            .ok_or_else(|| ExtractionError::required(draft.shape, "date", "no date found"))?;
        let shares = match (draft.kind, draft.shares) {
            (DraftKind::BuySell(_), None) => {
                return Err(ExtractionError::required(draft.shape, "shares", "no shares found"))
            }
            (_, shares) => shares.unwrap_or(0),
        };

        let resolved = match &draft.security {
            Some(reference) => Some(self.resolve_security(draft, reference)?),
            None => None,
        };

        if resolved.is_none() && requires_security(draft.kind) {
            return Err(ExtractionError::required(
                draft.shape,
                "isin",
                "no security found",
            ));
        }

        let reconciled = self
            .reconciler
            .reconcile(draft, resolved.as_ref().map(ResolvedSecurity::security))?;

        // register only once the record is known to be valid
        let mut items = Vec::new();
        let security = match resolved {
            Some(ResolvedSecurity::Known(security)) => Some(security),
            Some(ResolvedSecurity::New(security)) => {
                let stored = self.registry.insert(security.clone());
                if stored.uuid == security.uuid {
                    items.push(Item::Security(stored.clone()));
                }
                Some(stored)
            }
            None => None,
        };

        let record = match (draft.kind, security) {
            (DraftKind::BuySell(transaction_type), Some(security)) => {
                Item::BuySellEntry(BuySellEntry::new(
                    transaction_type,
                    date,
                    security.uuid,
                    shares,
                    reconciled.amount,
                    reconciled.units,
                    draft.note(),
                    source.clone(),
                ))
            }
            (DraftKind::BuySell(_), None) => {
                return Err(ExtractionError::required(draft.shape, "isin", "no security found"))
            }
            (DraftKind::Account(transaction_type), security) => {
                let mut transaction = AccountTransaction::new(
                    date,
                    transaction_type,
                    reconciled.amount,
                    source.clone(),
                );
                transaction.shares = shares;
                transaction.security_uuid = security.map(|s| s.uuid);
                transaction.units = reconciled.units;
                transaction.note = draft.note();
                transaction.failure = draft.failure.clone();
                Item::Transaction(transaction)
            }
        };

        items.push(record);
        Ok(items)
    }

    fn resolve_security(
        &self,
        draft: &TransactionDraft,
        reference: &SecurityRef,
    ) -> Result<ResolvedSecurity, ExtractionError> {
        let known = [reference.isin.as_deref(), reference.wkn.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|id| self.registry.lookup_by_identifier(id));
        if let Some(security) = known {
            return Ok(ResolvedSecurity::Known(security));
        }

        let identifier = reference.identifier().ok_or_else(|| {
            ExtractionError::required(draft.shape, "isin", "security without ISIN or WKN")
        })?;

        let currency = reference
            .currency
            .as_deref()
            .or(draft.booking_currency())
            .unwrap_or(&self.default_currency);
        let name = reference.name.as_deref().unwrap_or(identifier);

        let mut security = Security::new(name, currency);
        security.isin = reference.isin.clone();
        security.wkn = reference.wkn.clone();
        Ok(ResolvedSecurity::New(security))
    }
}

fn requires_security(kind: DraftKind) -> bool {
    matches!(
        kind,
        DraftKind::BuySell(_) | DraftKind::Account(AccountTransactionType::Dividends)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_import::registry::InMemorySecurityRegistry;
    use crate::pp::{Money, PortfolioTransactionType, SHARES_FACTOR};
    use chrono::NaiveDate;

    fn purchase() -> TransactionDraft {
        let mut draft =
            TransactionDraft::new("purchase", DraftKind::BuySell(PortfolioTransactionType::Buy));
        draft.date = NaiveDate::from_ymd_opt(2020, 1, 7).and_then(|d| d.and_hms_opt(9, 4, 0));
        draft.shares = Some(160 * SHARES_FACTOR);
        draft.append_name("Vanguard FTSE All-World");
        draft.security_mut().isin = Some("IE00B3RBWM25".to_string());
        draft.security_mut().wkn = Some("A1JX52".to_string());
        draft.gross = Some(Money::new(1930352, "EUR"));
        draft.add_fee("Provision", Money::new(5316, "EUR"));
        draft
    }

    #[test]
    fn test_new_security_is_emitted_once() {
        let registry = InMemorySecurityRegistry::new();
        let builder = RecordBuilder::new(&registry, &ExtractorConfig::default());

        let first = builder.build(&purchase(), &Provenance::new("Kauf01.txt")).unwrap();
        assert_eq!(first.len(), 2);
        let Item::Security(security) = &first[0] else {
            panic!("expected a security first");
        };
        assert_eq!(security.name, "Vanguard FTSE All-World");
        assert_eq!(security.currency, "EUR");

        let second = builder.build(&purchase(), &Provenance::new("Kauf02.txt")).unwrap();
        assert_eq!(second.len(), 1);
        let Item::BuySellEntry(entry) = &second[0] else {
            panic!("expected a buy/sell entry");
        };
        assert_eq!(entry.portfolio.security_uuid, security.uuid);
        assert_eq!(entry.account.amount, Money::new(1935668, "EUR"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_known_security_is_looked_up_by_wkn() {
        let existing = Security::new("FTSE All-World", "EUR").with_wkn("A1JX52");
        let registry = InMemorySecurityRegistry::with_securities(vec![existing.clone()]);
        let builder = RecordBuilder::new(&registry, &ExtractorConfig::default());

        let items = builder.build(&purchase(), &Provenance::new("Kauf01.txt")).unwrap();
        assert_eq!(items.len(), 1);
        let Item::BuySellEntry(entry) = &items[0] else {
            panic!("expected a buy/sell entry");
        };
        assert_eq!(entry.account.security_uuid.as_deref(), Some(existing.uuid.as_str()));
    }

    #[test]
    fn test_failed_reconciliation_does_not_register() {
        let registry = InMemorySecurityRegistry::new();
        let builder = RecordBuilder::new(&registry, &ExtractorConfig::default());

        let mut draft = purchase();
        draft.amount = Some(Money::new(100, "EUR"));
        let err = builder.build(&draft, &Provenance::new("Kauf01.txt")).unwrap_err();
        assert!(matches!(err, ExtractionError::UnitReconciliationMismatch { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_purchase_requires_shares_and_date() {
        let registry = InMemorySecurityRegistry::new();
        let builder = RecordBuilder::new(&registry, &ExtractorConfig::default());

        let mut draft = purchase();
        draft.shares = None;
        let err = builder.build(&draft, &Provenance::new("Kauf01.txt")).unwrap_err();
        assert_eq!(err, ExtractionError::required("purchase", "shares", "no shares found"));
        assert!(registry.is_empty());

        let mut draft = purchase();
        draft.date = None;
        let err = builder.build(&draft, &Provenance::new("Kauf01.txt")).unwrap_err();
        assert_eq!(err, ExtractionError::required("purchase", "date", "no date found"));
        assert!(registry.is_empty());

        // the security is still announced by the first record that succeeds
        let items = builder.build(&purchase(), &Provenance::new("Kauf02.txt")).unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Item::Security(_)));
    }

    #[test]
    fn test_cash_posting_without_security() {
        let registry = InMemorySecurityRegistry::new();
        let builder = RecordBuilder::new(&registry, &ExtractorConfig::default());

        let mut draft =
            TransactionDraft::new("deposit", DraftKind::Account(AccountTransactionType::Deposit));
        draft.date = NaiveDate::from_ymd_opt(2019, 10, 2).and_then(|d| d.and_hms_opt(0, 0, 0));
        draft.amount = Some(Money::new(20000, "EUR"));
        draft.add_note("Übertrag");

        let items = builder.build(&draft, &Provenance::new("Finanzreport.txt")).unwrap();
        let Item::Transaction(transaction) = &items[0] else {
            panic!("expected an account transaction");
        };
        assert_eq!(transaction.shares, 0);
        assert_eq!(transaction.security_uuid, None);
        assert_eq!(transaction.note.as_deref(), Some("Übertrag"));
        assert_eq!(transaction.source.to_string(), "Finanzreport.txt");
    }
}
