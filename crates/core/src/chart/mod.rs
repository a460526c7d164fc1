//! Chart of accounts: the GL account hierarchy and its invariants.

pub mod error;
pub mod tree;
pub mod types;

#[cfg(test)]
mod tree_props;

pub use error::ChartError;
pub use tree::ChartOfAccounts;
pub use types::{
    AccountType, CODE_MAX_LEN, CreateGlAccountInput, GlAccount, NormalBalance,
    UpdateGlAccountInput,
};
