//! Portfolio data model.
//!
//! The records produced by the document import: securities, account and
//! portfolio transactions and their units.

pub mod common;
pub mod security;
pub mod transaction;

// Re-export main types for convenience
pub use common::{ForexInfo, Money, Provenance, AMOUNT_FACTOR, SHARES_FACTOR};
pub use security::Security;
pub use transaction::{
    AccountTransaction, AccountTransactionType, BuySellEntry, CrossEntry, PortfolioTransaction,
    PortfolioTransactionType, TransactionUnit, UnitType,
};
