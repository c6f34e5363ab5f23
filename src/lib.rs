//! Portfolio document import
//!
//! Turns the text of bank and broker documents into portfolio records
//! (securities, buy/sell entries, account postings) and merges tax notices
//! into the income postings they belong to.

pub mod config;
pub mod error;
pub mod pdf_import;
pub mod pp;

pub use config::ExtractorConfig;
pub use error::{ExtractionError, ImportError, ValueError};
pub use pdf_import::{
    BankParser, BatchExtractor, BatchState, ExtractionResult, InMemorySecurityRegistry,
    InputDocument, Item, SecurityRegistry,
};
