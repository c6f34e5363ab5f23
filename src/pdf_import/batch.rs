//! Batch driver
//!
//! Runs a set of documents through the whole import: drafts are read per
//! document (optionally in parallel), records are built in one sequential
//! pass over the registry, and tax notices are merged last.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::builder::RecordBuilder;
use super::normalizer::normalize_text;
use super::registry::SecurityRegistry;
use super::shape::BlockOutcome;
use super::{detect_parser, get_parsers, merger, BankParser, InputDocument, Item};
use crate::config::ExtractorConfig;
use crate::error::{ExtractionError, ImportError};
use crate::pp::{Provenance, Security};

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Pending,
    Extracting,
    Merging,
    Done,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Merging => "merging",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Records of a batch and the errors collected on the way
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub items: Vec<Item>,
    pub errors: Vec<ImportError>,
}

pub struct BatchExtractor {
    parsers: Vec<Box<dyn BankParser>>,
    registry: Arc<dyn SecurityRegistry>,
    config: ExtractorConfig,
    state: BatchState,
}

impl BatchExtractor {
    /// Extractor with all built-in bank parsers
    pub fn new(
        registry: Arc<dyn SecurityRegistry>,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractionError> {
        Self::with_parsers(get_parsers(), registry, config)
    }

    /// Extractor with the given parsers. Fails if any shape is broken.
    pub fn with_parsers(
        parsers: Vec<Box<dyn BankParser>>,
        registry: Arc<dyn SecurityRegistry>,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractionError> {
        for parser in &parsers {
            for document_type in parser.document_types() {
                document_type.validate()?;
            }
        }
        Ok(Self {
            parsers,
            registry,
            config,
            state: BatchState::Pending,
        })
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn transition(&mut self, next: BatchState) {
        log::info!("Import batch: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Extract all documents.
    ///
    /// Failures of single blocks or documents are collected in the result;
    /// only a broken shape definition aborts the batch.
    pub fn extract(
        &mut self,
        documents: &[InputDocument],
    ) -> Result<ExtractionResult, ExtractionError> {
        self.transition(BatchState::Extracting);

        let parsers = &self.parsers;
        let outcomes: Vec<Vec<BlockOutcome>> = if self.config.parallel {
            documents
                .par_iter()
                .map(|document| read_document(parsers, document))
                .collect()
        } else {
            documents
                .iter()
                .map(|document| read_document(parsers, document))
                .collect()
        };

        let built = build_records(documents, outcomes, self.registry.as_ref(), &self.config);
        let mut result = match built {
            Ok(result) => result,
            Err(e) => {
                self.transition(BatchState::Done);
                return Err(e);
            }
        };

        self.transition(BatchState::Merging);
        if self.config.merge_tax_documents {
            let (items, errors) = merger::merge(std::mem::take(&mut result.items));
            for error in &errors {
                log::warn!("{}", error);
            }
            result.items = items;
            result.errors.extend(errors);
        }

        self.transition(BatchState::Done);
        log::info!(
            "Imported {} documents: {} items, {} errors",
            documents.len(),
            result.items.len(),
            result.errors.len()
        );
        Ok(result)
    }
}

/// Read the blocks of one document. Never touches the registry.
fn read_document(parsers: &[Box<dyn BankParser>], document: &InputDocument) -> Vec<BlockOutcome> {
    let text = normalize_text(&document.text);

    let outcomes = match detect_parser(parsers, &text) {
        Some(parser) => {
            log::debug!("{}: detected {}", document.name, parser.bank_name());
            parser.read_blocks(&text)
        }
        None => {
            log::warn!("{}: no bank parser recognizes the document", document.name);
            Vec::new()
        }
    };

    if !outcomes.is_empty() {
        return outcomes;
    }

    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();
    vec![BlockOutcome {
        start_line: 0,
        first_line: line.clone(),
        result: Err(ExtractionError::NoShapeMatched { line }),
    }]
}

/// Sequential pass: build records in document order.
///
/// Drafts that state the currency of their security are built first, so a
/// new security gets that currency no matter where its documents sit in the
/// batch. Items and errors are still returned in document order.
fn build_records(
    documents: &[InputDocument],
    outcomes: Vec<Vec<BlockOutcome>>,
    registry: &dyn SecurityRegistry,
    config: &ExtractorConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let builder = RecordBuilder::new(registry, config);

    let blocks: Vec<(&InputDocument, BlockOutcome)> = documents
        .iter()
        .zip(outcomes)
        .flat_map(|(document, blocks)| blocks.into_iter().map(move |block| (document, block)))
        .collect();

    let mut order: Vec<usize> = (0..blocks.len()).collect();
    order.sort_by_key(|&index| !states_security_currency(&blocks[index].1));

    let mut built: Vec<Option<Result<Vec<Item>, ImportError>>> =
        (0..blocks.len()).map(|_| None).collect();
    for index in order {
        let (document, block) = &blocks[index];
        let source = Provenance::new(document.name.as_str());
        let outcome = match &block.result {
            Ok(draft) => builder.build(draft, &source),
            Err(e) => Err(e.clone()),
        };
        built[index] = Some(match outcome {
            Ok(items) => Ok(items),
            Err(e) if e.is_defect() => return Err(e),
            Err(e) => {
                log::warn!("{} (line {}): {}", document.name, block.start_line + 1, e);
                Err(ImportError::new(
                    document.name.as_str(),
                    Some(block.first_line.clone()),
                    e,
                ))
            }
        });
    }

    let mut result = ExtractionResult::default();
    for outcome in built.into_iter().flatten() {
        match outcome {
            Ok(items) => result.items.extend(items),
            Err(e) => result.errors.push(e),
        }
    }
    result.items = announce_securities(result.items);
    Ok(result)
}

fn states_security_currency(block: &BlockOutcome) -> bool {
    block
        .result
        .as_ref()
        .ok()
        .and_then(|draft| draft.security.as_ref())
        .is_some_and(|security| security.currency.is_some())
}

/// Move every new security directly in front of the first record using it
fn announce_securities(items: Vec<Item>) -> Vec<Item> {
    let mut pending: Vec<Security> = Vec::new();
    let mut records: Vec<Item> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Item::Security(security) => pending.push(security),
            record => records.push(record),
        }
    }

    let mut ordered = Vec::with_capacity(records.len() + pending.len());
    for record in records {
        let first_use = record
            .security_uuid()
            .and_then(|uuid| pending.iter().position(|s| s.uuid == uuid));
        if let Some(position) = first_use {
            ordered.push(Item::Security(pending.remove(position)));
        }
        ordered.push(record);
    }
    ordered.extend(pending.into_iter().map(Item::Security));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_import::comdirect::fixtures::*;
    use crate::pdf_import::registry::InMemorySecurityRegistry;
    use crate::pp::{AccountTransaction, AccountTransactionType, Money, UnitType};
    use pretty_assertions::assert_eq;

    fn extractor(config: ExtractorConfig) -> BatchExtractor {
        BatchExtractor::new(Arc::new(InMemorySecurityRegistry::new()), config).unwrap()
    }

    fn run(documents: &[InputDocument]) -> ExtractionResult {
        let mut extractor = extractor(ExtractorConfig::default());
        let result = extractor.extract(documents).unwrap();
        assert_eq!(extractor.state(), BatchState::Done);
        result
    }

    fn transactions(result: &ExtractionResult) -> Vec<&AccountTransaction> {
        result
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Transaction(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Order-independent view of a result without generated uuids
    fn summary(result: &ExtractionResult) -> Vec<String> {
        result
            .items
            .iter()
            .map(|item| match item {
                Item::Security(s) => format!("security {} {}", s.name, s.currency),
                Item::BuySellEntry(e) => format!(
                    "{:?} {} {} [{}]",
                    e.portfolio.transaction_type,
                    e.portfolio.date,
                    e.portfolio.amount,
                    e.portfolio.source
                ),
                Item::Transaction(t) => format!(
                    "{:?} {} {} [{}]",
                    t.transaction_type,
                    t.date,
                    t.amount,
                    t.source
                ),
            })
            .collect()
    }

    #[test]
    fn test_purchase() {
        let result = run(&[InputDocument::new("Kauf.txt", PURCHASE)]);
        assert!(result.errors.is_empty());
        assert_eq!(result.items.len(), 2);

        let Item::Security(security) = &result.items[0] else {
            panic!("expected the new security first");
        };
        assert_eq!(security.isin.as_deref(), Some("IE00B3RBWM25"));

        let Item::BuySellEntry(entry) = &result.items[1] else {
            panic!("expected a buy/sell entry");
        };
        assert_eq!(entry.portfolio.amount, Money::new(1935918, "EUR"));
        assert_eq!(entry.portfolio.shares, 16_000_000_000);
        assert_eq!(entry.portfolio.total_fees(), 5566);
        assert!(entry.portfolio.units.iter().all(|u| u.unit_type != UnitType::Tax));
        assert!(entry.portfolio.units_reconcile(1));
        assert!(entry.account.units_reconcile(1));
        assert_eq!(entry.account.source.to_string(), "Kauf.txt");
    }

    #[test]
    fn test_forex_purchase_carries_gross_value_unit() {
        let result = run(&[InputDocument::new("Amazon.txt", FOREX_PURCHASE)]);
        assert!(result.errors.is_empty());
        let Item::BuySellEntry(entry) = &result.items[1] else {
            panic!("expected a buy/sell entry");
        };
        assert_eq!(entry.portfolio.amount, Money::new(444415, "EUR"));

        let gross = entry
            .portfolio
            .units
            .iter()
            .find(|u| u.unit_type == UnitType::GrossValue)
            .unwrap();
        assert_eq!(gross.amount, Money::new(441236, "EUR"));
        assert_eq!(
            gross.forex.as_ref().map(|f| f.amount.clone()),
            Some(Money::new(476800, "USD"))
        );
        assert!(entry.portfolio.units_reconcile(1));
    }

    #[test]
    fn test_dividend_and_tax_notice_are_merged() {
        let forward = run(&[
            InputDocument::new("Dividende.txt", DIVIDEND),
            InputDocument::new("Steuern.txt", DIVIDEND_TAXES),
        ]);
        let backward = run(&[
            InputDocument::new("Steuern.txt", DIVIDEND_TAXES),
            InputDocument::new("Dividende.txt", DIVIDEND),
        ]);

        for result in [&forward, &backward] {
            assert!(result.errors.is_empty(), "{:?}", result.errors);
            let merged = transactions(result);
            assert_eq!(merged.len(), 1);

            let dividend = merged[0];
            assert_eq!(dividend.transaction_type, AccountTransactionType::Dividends);
            assert_eq!(dividend.amount, Money::new(1019, "EUR"));
            assert_eq!(dividend.total_taxes(), 351);
            assert_eq!(dividend.gross_value(), 1370);
            assert!(dividend.units_reconcile(0));

            let Item::Security(security) = &result.items[0] else {
                panic!("expected the security ahead of the dividend");
            };
            assert_eq!(security.currency, "USD");
            assert_eq!(dividend.security_uuid.as_deref(), Some(security.uuid.as_str()));
            assert_eq!(dividend.source.to_string(), "Dividende.txt; Steuern.txt");
            assert_eq!(
                dividend.note.as_deref(),
                Some("Ref.-Nr.: 1N3KLMTB5RC00123 | Quartalsdividende")
            );
        }

        let a = transactions(&forward)[0];
        let b = transactions(&backward)[0];
        assert_eq!(
            (a.date, &a.amount, a.shares, &a.source, &a.units, &a.note),
            (b.date, &b.amount, b.shares, &b.source, &b.units, &b.note)
        );
    }

    #[test]
    fn test_tax_notice_stays_separate_without_merging() {
        let mut extractor = extractor(ExtractorConfig {
            merge_tax_documents: false,
            ..ExtractorConfig::default()
        });
        let result = extractor
            .extract(&[
                InputDocument::new("Dividende.txt", DIVIDEND),
                InputDocument::new("Steuern.txt", DIVIDEND_TAXES),
            ])
            .unwrap();
        assert_eq!(transactions(&result).len(), 2);
    }

    #[test]
    fn test_statement_lines() {
        let result = run(&[InputDocument::new("Finanzreport.txt", STATEMENT)]);
        assert!(result.errors.is_empty());

        let postings = transactions(&result);
        assert_eq!(postings.len(), 4);
        for posting in &postings {
            assert_eq!(posting.source.to_string(), "Finanzreport.txt");
            assert_eq!(posting.amount.currency, "EUR");
            assert_eq!(posting.security_uuid, None);
        }
        assert_eq!(postings[0].transaction_type, AccountTransactionType::Removal);
        assert_eq!(postings[3].amount, Money::new(490, "EUR"));
    }

    #[test]
    fn test_malformed_document_adds_one_error() {
        let valid = [InputDocument::new("Kauf.txt", PURCHASE)];
        let baseline = run(&valid);

        let broken = PURCHASE.replace("EUR 19.359,18", "EUR 19.999,18");
        let result = run(&[
            InputDocument::new("Kauf.txt", PURCHASE),
            InputDocument::new("Kaputt.txt", broken.as_str()),
        ]);
        assert_eq!(result.errors.len(), baseline.errors.len() + 1);
        assert_eq!(result.items.len(), baseline.items.len());
        assert_eq!(result.errors[0].document, "Kaputt.txt");
        assert!(matches!(
            result.errors[0].error,
            ExtractionError::UnitReconciliationMismatch { .. }
        ));
    }

    #[test]
    fn test_oversized_number_is_collected() {
        let huge = PURCHASE.replace("St. 160 EUR", "St. 9.999.999.999.999.999.999.999 EUR");
        let result = run(&[
            InputDocument::new("Kauf.txt", PURCHASE),
            InputDocument::new("Riesig.txt", huge.as_str()),
        ]);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].document, "Riesig.txt");
        assert!(matches!(
            result.errors[0].error,
            ExtractionError::RequiredFieldMissing { ref field, .. } if field == "shares"
        ));
    }

    #[test]
    fn test_failed_trade_does_not_hide_its_security() {
        let without_shares = PURCHASE.replace("St. 160 EUR 120,647", "");
        let result = run(&[
            InputDocument::new("Kaputt.txt", without_shares.as_str()),
            InputDocument::new("Kauf.txt", PURCHASE),
        ]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.items.len(), 2);
        assert!(matches!(result.items[0], Item::Security(_)));
    }

    #[test]
    fn test_unknown_document() {
        let result = run(&[InputDocument::new("Brief.txt", "\n  Sehr geehrte Damen und Herren,\n")]);
        assert!(result.items.is_empty());
        assert_eq!(
            result.errors,
            vec![ImportError::new(
                "Brief.txt",
                Some("Sehr geehrte Damen und Herren,".to_string()),
                ExtractionError::NoShapeMatched {
                    line: "Sehr geehrte Damen und Herren,".to_string()
                },
            )]
        );
    }

    #[test]
    fn test_same_security_in_two_documents_is_registered_once() {
        let result = run(&[
            InputDocument::new("Kauf01.txt", PURCHASE),
            InputDocument::new("Kauf02.txt", PURCHASE),
        ]);
        let securities = result
            .items
            .iter()
            .filter(|item| matches!(item, Item::Security(_)))
            .count();
        assert_eq!(securities, 1);
        assert_eq!(result.items.len(), 3);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let documents = vec![
            InputDocument::new("Kauf.txt", PURCHASE),
            InputDocument::new("Amazon.txt", FOREX_PURCHASE),
            InputDocument::new("Dividende.txt", DIVIDEND),
            InputDocument::new("Steuern.txt", DIVIDEND_TAXES),
            InputDocument::new("Finanzreport.txt", STATEMENT),
            InputDocument::new("Brief.txt", "Sehr geehrte Damen und Herren,"),
        ];

        let sequential = extractor(ExtractorConfig::default())
            .extract(&documents)
            .unwrap();
        let parallel = extractor(ExtractorConfig {
            parallel: true,
            ..ExtractorConfig::default()
        })
        .extract(&documents)
        .unwrap();

        assert_eq!(summary(&parallel), summary(&sequential));
        assert_eq!(parallel.errors, sequential.errors);
    }

    #[test]
    fn test_state_transitions() {
        let mut extractor = extractor(ExtractorConfig::default());
        assert_eq!(extractor.state(), BatchState::Pending);
        extractor.extract(&[]).unwrap();
        assert_eq!(extractor.state(), BatchState::Done);
    }
}
