//! Customer accounts: balances, holds, captures, and lifecycle.

pub mod error;
pub mod ledger;
pub mod types;

#[cfg(test)]
mod ledger_props;

pub use error::AccountError;
pub use ledger::AccountLedger;
pub use types::{
    Account, AccountStatus, AccountView, CaptureReceipt, CaptureRecord, Hold, HoldReceipt,
    HoldStatus, OpenAccountInput,
};
