//! Combining income postings with the tax notices issued for them.
//!
//! Some issuers send the taxes of a dividend or interest payment as a
//! separate document. Both records share security, payment date and number
//! of shares; the tax notice is folded into the income posting so that one
//! record carries the net amount and the tax units.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::Item;
use crate::error::{ExtractionError, ImportError};
use crate::pp::common::shares;
use crate::pp::{AccountTransaction, AccountTransactionType, Money, TransactionUnit, UnitType};

/// (security uuid, payment date, shares * 10^8)
type MergeKey = (String, NaiveDate, i64);

fn merge_key(transaction: &AccountTransaction) -> Option<MergeKey> {
    let security = transaction.security_uuid.clone()?;
    let kind = transaction.transaction_type;
    (kind.is_income() || kind.is_tax_booking())
        .then(|| (security, transaction.date.date(), transaction.shares))
}

fn describe(key: &MergeKey) -> String {
    format!(
        "{} {} {}",
        key.0,
        key.1.format("%Y-%m-%d"),
        shares::to_decimal(key.2).normalize()
    )
}

/// Fold tax bookings into the income posting with the same key.
///
/// Returns the items with merged records at the position of their earliest
/// input, plus every ambiguity found on the way.
pub fn merge(items: Vec<Item>) -> (Vec<Item>, Vec<ImportError>) {
    let mut groups: BTreeMap<MergeKey, Vec<usize>> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        if let Item::Transaction(transaction) = item {
            if let Some(key) = merge_key(transaction) {
                groups.entry(key).or_default().push(index);
            }
        }
    }

    let mut slots: Vec<Option<Item>> = items.into_iter().map(Some).collect();
    let mut errors = Vec::new();

    for (key, indexes) in &groups {
        if indexes.len() > 1 {
            merge_group(&describe(key), indexes, &mut slots, &mut errors);
        }
    }

    (slots.into_iter().flatten().collect(), errors)
}

fn merge_group(
    key: &str,
    indexes: &[usize],
    slots: &mut [Option<Item>],
    errors: &mut Vec<ImportError>,
) {
    let entries: Vec<(usize, AccountTransaction)> = indexes
        .iter()
        .filter_map(|&index| match &slots[index] {
            Some(Item::Transaction(t)) => Some((index, t.clone())),
            _ => None,
        })
        .collect();

    let (bases, corrections): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|(_, t)| t.transaction_type.is_income());

    let mut bases = drop_duplicates(bases, slots);
    let mut corrections = drop_duplicates(corrections, slots);
    // notices that could not be read completely are left alone
    corrections.retain(|(_, t)| t.failure.is_none());

    if bases.is_empty() || corrections.is_empty() {
        return;
    }
    if bases.len() > 1 {
        let source = bases
            .iter()
            .map(|(_, t)| t.source.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        errors.push(ImportError::new(
            source,
            None,
            ExtractionError::MergeAmbiguity {
                key: key.to_string(),
                reason: format!("{} income records share the key", bases.len()),
            },
        ));
        return;
    }

    let (base_index, base) = bases.remove(0);
    corrections.sort_by(|(_, a), (_, b)| {
        a.source
            .to_string()
            .cmp(&b.source.to_string())
            .then(a.amount.amount.cmp(&b.amount.amount))
            .then(a.note.cmp(&b.note))
    });

    let mut merged = base.clone();
    let mut folded: Vec<AccountTransaction> = Vec::new();
    let mut position = base_index;
    for (index, correction) in corrections {
        folded.push(correction);
        match merge_pair(key, &base, &merged, &folded) {
            Ok((result, warning)) => {
                if let Some(warning) = warning {
                    errors.push(ImportError::new(result.source.to_string(), None, warning));
                }
                log::debug!("Merged {} into {}", result.source, base.source);
                merged = result;
                slots[index] = None;
                position = position.min(index);
            }
            Err(e) => {
                if let Some(rejected) = folded.pop() {
                    errors.push(ImportError::new(rejected.source.to_string(), None, e));
                }
            }
        }
    }

    slots[base_index] = None;
    slots[position] = Some(Item::Transaction(merged));
}

/// Remove records that stem from the same document with the same amount
fn drop_duplicates(
    entries: Vec<(usize, AccountTransaction)>,
    slots: &mut [Option<Item>],
) -> Vec<(usize, AccountTransaction)> {
    let mut unique: Vec<(usize, AccountTransaction)> = Vec::with_capacity(entries.len());
    for (index, transaction) in entries {
        let duplicate = unique.iter().any(|(_, kept)| {
            kept.transaction_type == transaction.transaction_type
                && kept.amount == transaction.amount
                && kept.source.contains_all(&transaction.source)
        });
        if duplicate {
            log::debug!("Dropping duplicate record from {}", transaction.source);
            slots[index] = None;
        } else {
            unique.push((index, transaction));
        }
    }
    unique
}

/// Fold the last of `folded` into `merged`, the income posting `base` with
/// the earlier corrections already applied.
///
/// Returns the merged record and, when neither side carried a note, an
/// ambiguity to report alongside it.
fn merge_pair(
    key: &str,
    base: &AccountTransaction,
    merged: &AccountTransaction,
    folded: &[AccountTransaction],
) -> Result<(AccountTransaction, Option<ExtractionError>), ExtractionError> {
    let ambiguity = |reason: &str| ExtractionError::MergeAmbiguity {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    let Some(correction) = folded.last() else {
        return Ok((merged.clone(), None));
    };

    if base.amount.currency != correction.amount.currency {
        return Err(ambiguity("tax notice is booked in another currency"));
    }

    let (note, warning) = match (&merged.note, &correction.note) {
        (Some(_), Some(_)) => return Err(ambiguity("both records carry a note")),
        (Some(note), None) | (None, Some(note)) => (Some(note.clone()), None),
        (None, None) => (None, Some(ambiguity("neither record carries a note"))),
    };

    let units = fold_taxes(base, folded).map_err(|reason| ambiguity(reason))?;
    let amount = booked_amount(base, &units).map_err(|reason| ambiguity(reason))?;

    let mut source = merged.source.clone();
    source.extend(&correction.source);

    let result = AccountTransaction {
        amount: Money::new(amount, base.amount.currency.as_str()),
        units,
        note,
        source,
        ..base.clone()
    };
    Ok((result, warning))
}

/// Units of `base` after applying all corrections.
///
/// The components of the tax notices are authoritative: they replace the
/// base's tax units of the same label, and a notice stating only a total
/// replaces all of them. Refunds are then deducted label by label.
fn fold_taxes(
    base: &AccountTransaction,
    corrections: &[AccountTransaction],
) -> Result<Vec<TransactionUnit>, &'static str> {
    let (refunds, notices): (Vec<&AccountTransaction>, Vec<&AccountTransaction>) = corrections
        .iter()
        .partition(|t| t.transaction_type == AccountTransactionType::TaxRefund);

    let mut stated: Vec<TransactionUnit> = Vec::new();
    for notice in notices {
        for component in tax_components(notice) {
            add_tax(&mut stated, component)?;
        }
    }
    let covers_all = stated.iter().any(|u| u.label.is_none());

    let mut units: Vec<TransactionUnit> = base
        .units
        .iter()
        .filter(|u| {
            u.unit_type != UnitType::Tax
                || !(covers_all || stated.iter().any(|s| s.label == u.label))
        })
        .cloned()
        .collect();
    for component in stated {
        add_tax(&mut units, component)?;
    }

    for refund in refunds {
        for component in tax_components(refund) {
            deduct_tax(&mut units, &component).ok_or("refund exceeds the withheld tax")?;
        }
    }

    units.sort_by(|a, b| {
        unit_rank(a.unit_type)
            .cmp(&unit_rank(b.unit_type))
            .then_with(|| a.label.cmp(&b.label))
    });
    Ok(units)
}

/// Tax lines of a correction; a correction without lines counts as one
/// unlabelled component
fn tax_components(correction: &AccountTransaction) -> Vec<TransactionUnit> {
    let mut components: Vec<TransactionUnit> = correction
        .units
        .iter()
        .filter(|u| u.unit_type == UnitType::Tax)
        .cloned()
        .collect();
    if components.is_empty() && !correction.amount.is_zero() {
        components.push(TransactionUnit::tax(correction.amount.clone()));
    }
    components
}

/// Amount credited for `base` once its taxes are `units`
fn booked_amount(base: &AccountTransaction, units: &[TransactionUnit]) -> Result<i64, &'static str> {
    let out_of_range = "amounts out of range";
    let gross = match units.iter().find(|u| u.unit_type == UnitType::GrossValue) {
        Some(unit) => unit.amount.amount,
        None => base
            .amount
            .amount
            .checked_add(sum(&base.units, UnitType::Fee).ok_or(out_of_range)?)
            .and_then(|v| v.checked_add(sum(&base.units, UnitType::Tax)?))
            .ok_or(out_of_range)?,
    };
    let charges = sum(units, UnitType::Fee)
        .zip(sum(units, UnitType::Tax))
        .and_then(|(fees, taxes)| fees.checked_add(taxes))
        .ok_or(out_of_range)?;
    let amount = gross.checked_sub(charges).ok_or(out_of_range)?;
    if amount < 0 {
        return Err("taxes exceed the booked amount");
    }
    Ok(amount)
}

fn sum(units: &[TransactionUnit], unit_type: UnitType) -> Option<i64> {
    units
        .iter()
        .filter(|u| u.unit_type == unit_type)
        .try_fold(0i64, |total, u| total.checked_add(u.amount.amount))
}

fn unit_rank(unit_type: UnitType) -> u8 {
    match unit_type {
        UnitType::GrossValue => 0,
        UnitType::Tax => 1,
        UnitType::Fee => 2,
    }
}

fn same_tax<'a>(
    units: &'a mut [TransactionUnit],
    component: &TransactionUnit,
) -> Option<&'a mut TransactionUnit> {
    units.iter_mut().find(|u| {
        u.unit_type == UnitType::Tax
            && u.label == component.label
            && u.amount.currency == component.amount.currency
    })
}

fn add_tax(units: &mut Vec<TransactionUnit>, component: TransactionUnit) -> Result<(), &'static str> {
    match same_tax(units, &component) {
        Some(existing) => {
            existing.amount.amount = existing
                .amount
                .amount
                .checked_add(component.amount.amount)
                .ok_or("amounts out of range")?;
            // the foreign amount no longer matches the sum
            existing.forex = None;
        }
        None => units.push(component),
    }
    Ok(())
}

fn deduct_tax(units: &mut Vec<TransactionUnit>, component: &TransactionUnit) -> Option<()> {
    let existing = same_tax(units, component)?;
    let remaining = existing.amount.amount.checked_sub(component.amount.amount)?;
    if remaining < 0 {
        return None;
    }
    existing.amount.amount = remaining;
    existing.forex = None;
    units.retain(|u| !(u.unit_type == UnitType::Tax && u.amount.is_zero()));
    Some(())
}
