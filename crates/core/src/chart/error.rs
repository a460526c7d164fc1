//! Error types for chart-of-accounts operations.

use meridian_shared::types::{Currency, GlAccountId};
use thiserror::Error;

/// Errors that can occur while building or editing the chart of accounts.
#[derive(Debug, Error)]
pub enum ChartError {
    // ========== Validation Errors ==========
    /// Account code cannot be empty.
    #[error("Account code cannot be empty")]
    EmptyCode,

    /// Account code exceeds the maximum length.
    #[error("Account code '{code}' exceeds {max} characters")]
    CodeTooLong {
        /// The offending code.
        code: String,
        /// The maximum accepted length.
        max: usize,
    },

    /// Account name cannot be empty.
    #[error("Account name cannot be empty")]
    EmptyName,

    // ========== Conflict Errors ==========
    /// Another account already uses this code.
    #[error("Account code '{0}' already exists")]
    DuplicateCode(String),

    // ========== Hierarchy Errors ==========
    /// Referenced parent account does not exist.
    #[error("Parent account not found: {0}")]
    ParentNotFound(GlAccountId),

    /// Re-parenting would create a cycle.
    #[error("Moving account {account} under {parent} would create a cycle")]
    CycleDetected {
        /// The account being moved.
        account: GlAccountId,
        /// The requested parent.
        parent: GlAccountId,
    },

    /// Child and parent currencies do not agree.
    #[error("Currency mismatch: expected {expected:?}, got {actual:?}")]
    CurrencyMismatch {
        /// Currency required by the hierarchy position.
        expected: Option<Currency>,
        /// Currency that was supplied.
        actual: Option<Currency>,
    },

    /// Control accounts aggregate only and must not allow direct posting.
    #[error("Control account '{code}' must not allow direct posting")]
    ControlAccountMustNotPost {
        /// Code of the offending account.
        code: String,
    },

    /// Only root accounts may be currency-neutral.
    #[error("Account '{code}' must carry a currency because it is not a root")]
    NeutralCurrencyNotRoot {
        /// Code of the offending account.
        code: String,
    },

    // ========== Lookup Errors ==========
    /// Account not found.
    #[error("GL account not found: {0}")]
    AccountNotFound(GlAccountId),

    // ========== Removal Guards ==========
    /// Account still has children.
    #[error("Account {0} cannot be removed because it has children")]
    HasChildren(GlAccountId),

    /// Account has recorded postings and may only be deactivated.
    #[error("Account {0} cannot be removed because it has recorded postings")]
    HasPostings(GlAccountId),

    // ========== Concurrency Errors ==========
    /// Stale version supplied; re-read and retry.
    #[error("Version mismatch for account {account}: expected {expected}, got {actual}")]
    ConcurrentModification {
        /// The account being edited.
        account: GlAccountId,
        /// The version the caller read.
        expected: u64,
        /// The version currently stored.
        actual: u64,
    },
}

impl ChartError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyCode => "EMPTY_CODE",
            Self::CodeTooLong { .. } => "CODE_TOO_LONG",
            Self::EmptyName => "EMPTY_NAME",
            Self::DuplicateCode(_) => "DUPLICATE_CODE",
            Self::ParentNotFound(_) => "PARENT_NOT_FOUND",
            Self::CycleDetected { .. } => "CYCLE_DETECTED",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::ControlAccountMustNotPost { .. } => "CONTROL_ACCOUNT_MUST_NOT_POST",
            Self::NeutralCurrencyNotRoot { .. } => "NEUTRAL_CURRENCY_NOT_ROOT",
            Self::AccountNotFound(_) => "GL_ACCOUNT_NOT_FOUND",
            Self::HasChildren(_) => "HAS_CHILDREN",
            Self::HasPostings(_) => "HAS_POSTINGS",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation and hierarchy errors
            Self::EmptyCode
            | Self::CodeTooLong { .. }
            | Self::EmptyName
            | Self::CycleDetected { .. }
            | Self::CurrencyMismatch { .. }
            | Self::ControlAccountMustNotPost { .. }
            | Self::NeutralCurrencyNotRoot { .. }
            | Self::HasChildren(_)
            | Self::HasPostings(_) => 400,

            // 404 Not Found
            Self::ParentNotFound(_) | Self::AccountNotFound(_) => 404,

            // 409 Conflict
            Self::DuplicateCode(_) | Self::ConcurrentModification { .. } => 409,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
