//! Balanced multi-line postings.
//!
//! A posting is a set of signed lines that nets to zero per currency.
//! Lines target either GL accounts in the chart or customer accounts in
//! the ledger; the coordinator applies them atomically by compensation
//! and keeps the receipt journal for reversals.

pub mod book;
pub mod coordinator;
pub mod error;
pub mod types;
pub mod validation;

#[cfg(test)]
mod validation_props;

pub use book::{GlBalanceBook, GlRunningBalance, RecordedPosting};
pub use coordinator::PostingCoordinator;
pub use error::PostingError;
pub use types::{LedgerLine, LineResult, LineTarget, Posting, PostingReceipt};
pub use validation::validate_lines;
