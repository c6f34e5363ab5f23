//! Bank document import
//!
//! Reads the text of bank documents (trade confirmations, dividend notices,
//! tax treatment notices and account statements) and turns it into portfolio
//! records. Each supported bank registers its document layouts as
//! [`DocumentType`]s through the [`BankParser`] trait; the
//! [`BatchExtractor`] drives normalization, matching, record building and the
//! merge of related documents.

pub mod batch;
pub mod builder;
pub mod comdirect;
pub mod consorsbank;
pub mod dkb;
pub mod draft;
pub mod merger;
pub mod normalizer;
pub mod registry;
pub mod segmenter;
pub mod shape;
pub mod units;
pub mod values;

use serde::{Deserialize, Serialize};

use crate::pp::{AccountTransaction, BuySellEntry, Security};

pub use batch::{BatchExtractor, BatchState, ExtractionResult};
pub use registry::{InMemorySecurityRegistry, SecurityRegistry};
pub use shape::{Block, BlockOutcome, DocumentType, Section, Shape};

/// A document to import: its name (used as provenance label) and its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDocument {
    pub name: String,
    pub text: String,
}

impl InputDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// One extracted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Item {
    /// A security seen for the first time
    Security(Security),
    /// A buy or sell with its account side
    BuySellEntry(BuySellEntry),
    /// Any other account posting
    Transaction(AccountTransaction),
}

impl Item {
    /// Security a record refers to
    pub fn security_uuid(&self) -> Option<&str> {
        match self {
            Self::Security(_) => None,
            Self::BuySellEntry(entry) => Some(entry.portfolio.security_uuid.as_str()),
            Self::Transaction(transaction) => transaction.security_uuid.as_deref(),
        }
    }
}

/// Bank parser trait
pub trait BankParser: Send + Sync {
    /// Check if this parser can handle the given document text
    fn detect(&self, content: &str) -> bool;

    /// Document layouts of this bank, tried in order
    fn document_types(&self) -> &[DocumentType];

    /// Get the bank name
    fn bank_name(&self) -> &'static str;

    /// Read every block of a normalized document, in document order
    fn read_blocks(&self, text: &str) -> Vec<BlockOutcome> {
        let lines: Vec<&str> = text.lines().collect();
        let mut outcomes: Vec<BlockOutcome> = self
            .document_types()
            .iter()
            .filter(|document_type| document_type.matches(text))
            .flat_map(|document_type| document_type.extract(&lines))
            .collect();
        outcomes.sort_by_key(|outcome| outcome.start_line);
        outcomes
    }
}

/// All available bank parsers
pub fn get_parsers() -> Vec<Box<dyn BankParser>> {
    vec![
        Box::new(comdirect::ComdirectParser::new()),
        Box::new(consorsbank::ConsorsbankParser::new()),
        Box::new(dkb::DkbParser::new()),
    ]
}

/// The first parser that recognizes `content`
pub fn detect_parser<'p>(
    parsers: &'p [Box<dyn BankParser>],
    content: &str,
) -> Option<&'p dyn BankParser> {
    parsers
        .iter()
        .find(|parser| parser.detect(content))
        .map(|parser| &**parser)
}
