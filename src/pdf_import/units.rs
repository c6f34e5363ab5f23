//! Currency conversion and unit reconciliation.
//!
//! Turns the charges and gross values of a draft into the amount and units
//! of a record and checks that they add up. Exchange rates only ever come
//! from the document itself.

use rust_decimal::{Decimal, RoundingStrategy};

use super::draft::{Charge, TransactionDraft};
use crate::error::ExtractionError;
use crate::pp::common::AMOUNT_SCALE;
use crate::pp::{ForexInfo, Money, Security, TransactionUnit};

/// Exchange rate as quoted on a document: 1 `base` = `rate` `term`.
///
/// "EUR/USD 1,0806" is `ExchangeRate::new("EUR", "USD", 1.0806)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRate {
    pub base: String,
    pub term: String,
    pub rate: Decimal,
}

impl ExchangeRate {
    pub fn new(base: impl Into<String>, term: impl Into<String>, rate: Decimal) -> Self {
        Self {
            base: base.into(),
            term: term.into(),
            rate,
        }
    }

    /// Units of `to` per unit of `from`, if this rate links the two currencies
    pub fn factor(&self, from: &str, to: &str) -> Option<Decimal> {
        if from == to {
            Some(Decimal::ONE)
        } else if from == self.base && to == self.term {
            Some(self.rate)
        } else if from == self.term && to == self.base {
            Decimal::ONE.checked_div(self.rate)
        } else {
            None
        }
    }

    /// Convert `money` into `to`, rounding half-even to minor units
    pub fn convert(&self, money: &Money, to: &str) -> Option<Money> {
        let value = money.to_decimal();
        let converted = if money.currency == to {
            value
        } else if money.currency == self.base && to == self.term {
            value.checked_mul(self.rate)?
        } else if money.currency == self.term && to == self.base {
            value.checked_div(self.rate)?
        } else {
            return None;
        };
        Money::from_decimal(
            converted.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven),
            to,
        )
    }
}

/// Amount and units of a record after reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub amount: Money,
    pub units: Vec<TransactionUnit>,
}

/// Checks drafts against the unit-sum invariant
#[derive(Debug, Clone, Copy)]
pub struct UnitReconciler {
    tolerance: i64,
}

impl UnitReconciler {
    pub fn new(tolerance: i64) -> Self {
        Self { tolerance }
    }

    fn within(&self, a: i64, b: i64) -> bool {
        a.checked_sub(b)
            .and_then(i64::checked_abs)
            .is_some_and(|difference| difference <= self.tolerance)
    }

    /// Reconcile `draft`; `security` is the registry entry it refers to, whose
    /// currency wins over the document.
    pub fn reconcile(
        &self,
        draft: &TransactionDraft,
        security: Option<&Security>,
    ) -> Result<Reconciled, ExtractionError> {
        let currency = draft
            .booking_currency()
            .ok_or_else(|| ExtractionError::required(draft.shape, "amount", "no amount found"))?
            .to_string();

        let taxes = self.convert_charges(draft, &draft.taxes, &currency, TransactionUnit::tax)?;
        let fees = self.convert_charges(draft, &draft.fees, &currency, TransactionUnit::fee)?;

        if draft.kind.is_tax_booking() {
            return self.reconcile_tax_booking(draft, taxes, &currency);
        }

        let charges = total(taxes.iter().chain(fees.iter()))
            .ok_or_else(|| out_of_range("charges", &currency))?;
        let credit = draft.kind.is_credit();

        // gross stated in another currency counts as foreign gross
        let (declared_gross, foreign_gross) = match &draft.gross {
            Some(g) if g.currency != currency => (None, Some(g.clone())),
            Some(g) => (Some(g.clone()), draft.forex_gross.clone()),
            None => (None, draft.forex_gross.clone()),
        };
        let declared_gross = declared_gross.or_else(|| {
            let foreign = foreign_gross.as_ref()?;
            draft.exchange_rate.as_ref()?.convert(foreign, &currency)
        });

        let amount = match (&draft.amount, &declared_gross) {
            (Some(amount), Some(gross)) => {
                let expected = net(gross.amount, charges, credit)
                    .ok_or_else(|| out_of_range("amount", &currency))?;
                if !self.within(amount.amount, expected) {
                    return Err(ExtractionError::mismatch(
                        "amount",
                        amount,
                        Money::new(expected, currency.as_str()),
                    ));
                }
                amount.clone()
            }
            (Some(amount), None) => amount.clone(),
            (None, Some(gross)) => {
                let computed = net(gross.amount, charges, credit)
                    .ok_or_else(|| out_of_range("amount", &currency))?;
                Money::new(computed, currency.as_str())
            }
            (None, None) => {
                return Err(ExtractionError::required(
                    draft.shape,
                    "amount",
                    "neither amount nor gross value found",
                ))
            }
        };

        let gross = net(amount.amount, charges, !credit)
            .ok_or_else(|| out_of_range("gross value", &currency))?;
        if amount.amount < 0 || gross < 0 {
            return Err(ExtractionError::mismatch(
                "gross value",
                declared_gross.map(|g| g.to_string()).unwrap_or_default(),
                Money::new(gross, currency.as_str()),
            ));
        }

        let mut units = taxes;
        units.extend(fees);

        if let Some(security) = security.filter(|s| s.currency != currency) {
            let unit = self.forex_gross_unit(
                draft,
                security,
                Money::new(gross, currency.as_str()),
                foreign_gross.as_ref(),
            )?;
            units.insert(0, unit);
        }

        Ok(Reconciled { amount, units })
    }

    fn reconcile_tax_booking(
        &self,
        draft: &TransactionDraft,
        taxes: Vec<TransactionUnit>,
        currency: &str,
    ) -> Result<Reconciled, ExtractionError> {
        let total = total(taxes.iter()).ok_or_else(|| out_of_range("tax total", currency))?;
        let amount = match &draft.amount {
            Some(amount) => {
                if !taxes.is_empty() && !self.within(amount.amount, total) {
                    return Err(ExtractionError::mismatch(
                        "tax total",
                        amount,
                        Money::new(total, currency),
                    ));
                }
                amount.clone()
            }
            None if !taxes.is_empty() => Money::new(total, currency),
            None => {
                return Err(ExtractionError::required(
                    draft.shape,
                    "amount",
                    "no tax amount found",
                ))
            }
        };
        Ok(Reconciled {
            amount,
            units: taxes,
        })
    }

    fn forex_gross_unit(
        &self,
        draft: &TransactionDraft,
        security: &Security,
        gross: Money,
        foreign_gross: Option<&Money>,
    ) -> Result<TransactionUnit, ExtractionError> {
        let conflict = || ExtractionError::RegistryConflict {
            identifier: security
                .identifier()
                .unwrap_or(security.name.as_str())
                .to_string(),
            registry_currency: security.currency.clone(),
            document_currency: gross.currency.clone(),
        };

        let rate = draft.exchange_rate.as_ref().ok_or_else(conflict)?;
        let factor = rate
            .factor(&security.currency, &gross.currency)
            .ok_or_else(conflict)?;

        let foreign = match foreign_gross.filter(|f| f.currency == security.currency) {
            Some(foreign) => {
                let domestic = rate.convert(foreign, &gross.currency).ok_or_else(conflict)?;
                if !self.within(domestic.amount, gross.amount) {
                    return Err(ExtractionError::mismatch(
                        "forex gross value",
                        &gross,
                        domestic,
                    ));
                }
                foreign.clone()
            }
            None => rate.convert(&gross, &security.currency).ok_or_else(conflict)?,
        };

        Ok(TransactionUnit::gross_value(gross).with_forex(ForexInfo::new(foreign, factor)))
    }

    fn convert_charges(
        &self,
        draft: &TransactionDraft,
        charges: &[Charge],
        currency: &str,
        make: fn(Money) -> TransactionUnit,
    ) -> Result<Vec<TransactionUnit>, ExtractionError> {
        charges
            .iter()
            .map(|charge| {
                if charge.amount.currency == currency {
                    return Ok(make(charge.amount.clone()).with_label(charge.label.clone()));
                }
                let rate = draft.exchange_rate.as_ref();
                let converted = rate.and_then(|r| r.convert(&charge.amount, currency));
                let factor = rate.and_then(|r| r.factor(&charge.amount.currency, currency));
                match (converted, factor) {
                    (Some(converted), Some(factor)) => Ok(make(converted)
                        .with_label(charge.label.clone())
                        .with_forex(ForexInfo::new(charge.amount.clone(), factor))),
                    _ => Err(ExtractionError::required(
                        draft.shape,
                        "exchange_rate",
                        format!(
                            "{} stated in {} without rate to {}",
                            charge.label.as_deref().unwrap_or("charge"),
                            charge.amount.currency,
                            currency
                        ),
                    )),
                }
            })
            .collect()
    }
}

/// Sum of unit amounts, `None` on overflow
fn total<'a>(mut units: impl Iterator<Item = &'a TransactionUnit>) -> Option<i64> {
    units.try_fold(0i64, |sum, unit| sum.checked_add(unit.amount.amount))
}

/// `value` less the charges for credits, plus the charges for debits
fn net(value: i64, charges: i64, credit: bool) -> Option<i64> {
    if credit {
        value.checked_sub(charges)
    } else {
        value.checked_add(charges)
    }
}

fn out_of_range(what: &str, currency: &str) -> ExtractionError {
    ExtractionError::mismatch(what, currency, "value out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_import::draft::DraftKind;
    use crate::pp::{AccountTransactionType, PortfolioTransactionType, UnitType};
    use rust_decimal_macros::dec;

    fn purchase() -> TransactionDraft {
        TransactionDraft::new("purchase", DraftKind::BuySell(PortfolioTransactionType::Buy))
    }

    #[test]
    fn test_exchange_rate_conversion() {
        let rate = ExchangeRate::new("EUR", "USD", dec!(1.0806));
        assert_eq!(
            rate.convert(&Money::new(476800, "USD"), "EUR"),
            Some(Money::new(441236, "EUR"))
        );
        assert_eq!(
            rate.convert(&Money::new(1390, "USD"), "EUR"),
            Some(Money::new(1286, "EUR"))
        );
        assert_eq!(rate.convert(&Money::new(100, "CHF"), "EUR"), None);
        assert_eq!(rate.factor("EUR", "USD"), Some(dec!(1.0806)));
    }

    #[test]
    fn test_purchase_amount_from_gross_and_fees() {
        let mut draft = purchase();
        draft.gross = Some(Money::new(1930352, "EUR"));
        draft.add_fee("Provision", Money::new(5316, "EUR"));
        draft.add_fee("Börsenplatzabhängiges Entgelt", Money::new(250, "EUR"));
        draft.add_tax("Kapitalertragsteuer", Money::zero("EUR"));

        let result = UnitReconciler::new(1).reconcile(&draft, None).unwrap();
        assert_eq!(result.amount, Money::new(1935918, "EUR"));
        assert_eq!(result.units.len(), 2);
        assert!(result.units.iter().all(|u| u.unit_type == UnitType::Fee));
    }

    #[test]
    fn test_declared_amount_must_match() {
        let mut draft = purchase();
        draft.gross = Some(Money::new(1930352, "EUR"));
        draft.amount = Some(Money::new(1935920, "EUR"));
        draft.add_fee("Provision", Money::new(5316, "EUR"));
        draft.add_fee("Entgelt", Money::new(250, "EUR"));

        let err = UnitReconciler::new(1).reconcile(&draft, None).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::mismatch("amount", "EUR 19359.20", "EUR 19359.18")
        );

        // within one cent is accepted and the declared amount kept
        draft.amount = Some(Money::new(1935919, "EUR"));
        let result = UnitReconciler::new(1).reconcile(&draft, None).unwrap();
        assert_eq!(result.amount.amount, 1935919);
    }

    #[test]
    fn test_forex_purchase_converts_fees_and_adds_gross_unit() {
        let mut draft = purchase();
        draft.exchange_rate = Some(ExchangeRate::new("EUR", "USD", dec!(1.0806)));
        draft.gross = Some(Money::new(441236, "EUR"));
        draft.forex_gross = Some(Money::new(476800, "USD"));
        draft.amount = Some(Money::new(444415, "EUR"));
        draft.add_fee("Provision", Money::new(1893, "EUR"));
        draft.add_fee("Fremde Spesen", Money::new(1390, "USD"));

        let security = Security::new("Amazon.com Inc.", "USD").with_isin("US0231351067");
        let result = UnitReconciler::new(1).reconcile(&draft, Some(&security)).unwrap();

        assert_eq!(result.amount, Money::new(444415, "EUR"));
        let gross = &result.units[0];
        assert_eq!(gross.unit_type, UnitType::GrossValue);
        assert_eq!(gross.amount, Money::new(441236, "EUR"));
        let forex = gross.forex.as_ref().unwrap();
        assert_eq!(forex.amount, Money::new(476800, "USD"));
        assert_eq!(forex.domestic_value("EUR"), Some(Money::new(441236, "EUR")));

        let spesen = &result.units[2];
        assert_eq!(spesen.amount, Money::new(1286, "EUR"));
        assert_eq!(spesen.forex.as_ref().unwrap().amount, Money::new(1390, "USD"));
    }

    #[test]
    fn test_forex_gross_mismatch_detected() {
        let mut draft = purchase();
        draft.exchange_rate = Some(ExchangeRate::new("EUR", "USD", dec!(1.0806)));
        draft.gross = Some(Money::new(441240, "EUR"));
        draft.forex_gross = Some(Money::new(476800, "USD"));

        let security = Security::new("Amazon.com Inc.", "USD");
        let err = UnitReconciler::new(1).reconcile(&draft, Some(&security)).unwrap_err();
        assert!(matches!(err, ExtractionError::UnitReconciliationMismatch { .. }));
    }

    #[test]
    fn test_security_in_other_currency_without_rate() {
        let mut draft = purchase();
        draft.amount = Some(Money::new(10000, "EUR"));

        let security = Security::new("Apple Inc.", "USD").with_isin("US0378331005");
        let err = UnitReconciler::new(1).reconcile(&draft, Some(&security)).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::RegistryConflict {
                identifier: "US0378331005".to_string(),
                registry_currency: "USD".to_string(),
                document_currency: "EUR".to_string(),
            }
        );
    }

    #[test]
    fn test_security_in_booking_currency_has_no_forex_unit() {
        let mut draft = purchase();
        draft.exchange_rate = Some(ExchangeRate::new("EUR", "USD", dec!(1.0806)));
        draft.gross = Some(Money::new(441236, "EUR"));
        draft.forex_gross = Some(Money::new(476800, "USD"));

        let security = Security::new("Amazon.com Inc.", "EUR");
        let result = UnitReconciler::new(1).reconcile(&draft, Some(&security)).unwrap();
        assert!(result.units.is_empty());
        assert_eq!(result.amount, Money::new(441236, "EUR"));
    }

    #[test]
    fn test_dividend_gross_from_foreign_amount() {
        let mut draft = TransactionDraft::new(
            "dividend",
            DraftKind::Account(AccountTransactionType::Dividends),
        );
        draft.exchange_rate = Some(ExchangeRate::new("EUR", "USD", dec!(1.1679)));
        draft.gross = Some(Money::new(1600, "USD"));
        draft.amount = Some(Money::new(1370, "EUR"));

        let security = Security::new("CVS Health", "USD");
        let result = UnitReconciler::new(1).reconcile(&draft, Some(&security)).unwrap();
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].amount, Money::new(1370, "EUR"));
        assert_eq!(result.units[0].forex.as_ref().unwrap().amount, Money::new(1600, "USD"));
    }

    #[test]
    fn test_tax_booking_components() {
        let mut draft = TransactionDraft::new(
            "tax",
            DraftKind::Account(AccountTransactionType::Taxes),
        );
        draft.add_tax("Kapitalertragsteuer", Money::new(331, "EUR"));
        draft.add_tax("Solidaritätszuschlag", Money::new(18, "EUR"));
        draft.amount = Some(Money::new(349, "EUR"));

        let result = UnitReconciler::new(1).reconcile(&draft, None).unwrap();
        assert_eq!(result.amount, Money::new(349, "EUR"));
        assert_eq!(result.units.len(), 2);

        draft.amount = Some(Money::new(400, "EUR"));
        let err = UnitReconciler::new(1).reconcile(&draft, None).unwrap_err();
        assert!(matches!(err, ExtractionError::UnitReconciliationMismatch { .. }));
    }

    #[test]
    fn test_out_of_range_values_are_errors() {
        let rate = ExchangeRate::new("EUR", "USD", dec!(1.0806));
        assert_eq!(rate.convert(&Money::new(i64::MAX, "EUR"), "USD"), None);

        let mut draft = purchase();
        draft.gross = Some(Money::new(i64::MAX, "EUR"));
        draft.add_fee("Provision", Money::new(i64::MAX, "EUR"));
        let err = UnitReconciler::new(1).reconcile(&draft, None).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::mismatch("amount", "EUR", "value out of range")
        );
    }

    #[test]
    fn test_missing_amount() {
        let draft = purchase();
        let err = UnitReconciler::new(1).reconcile(&draft, None).unwrap_err();
        assert!(matches!(err, ExtractionError::RequiredFieldMissing { .. }));
    }
}
