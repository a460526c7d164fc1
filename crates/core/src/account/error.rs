//! Errors for customer account operations.

use chrono::{DateTime, Utc};
use meridian_shared::types::{AccountId, Currency, HoldId, IdempotencyKey, PostingId};
use rust_decimal::Decimal;
use thiserror::Error;

use super::types::{AccountStatus, HoldStatus};

/// Errors from customer account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    // ========== Validation ==========
    /// Money movements must carry a non-zero amount.
    #[error("Amount must not be zero")]
    ZeroAmount,

    /// Holds are always authorized for a positive amount.
    #[error("Amount must be positive")]
    NegativeAmount,

    /// Account numbers must be non-empty.
    #[error("Account number must not be empty")]
    EmptyAccountNumber,

    /// The money's currency does not match the account currency.
    #[error("Currency mismatch: account is {expected}, got {actual}")]
    CurrencyMismatch {
        /// Account currency.
        expected: Currency,
        /// Currency of the offered amount.
        actual: Currency,
    },

    // ========== Lookup ==========
    /// Another account already uses this account number.
    #[error("Account number already in use: {0}")]
    DuplicateAccountNumber(String),

    /// No account with this id.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// No such hold on this account.
    #[error("Hold {hold} not found on account {account}")]
    HoldNotFound {
        /// Account searched.
        account: AccountId,
        /// Requested hold.
        hold: HoldId,
    },

    /// No capture recorded under this posting id.
    #[error("No capture recorded for posting {posting}")]
    CaptureNotFound {
        /// Requested posting.
        posting: PostingId,
    },

    // ========== Account state ==========
    /// Holds require an active or dormant account.
    #[error("Account {account} is {status} and cannot take holds")]
    NotActive {
        /// Account in the wrong state.
        account: AccountId,
        /// Its current status.
        status: AccountStatus,
    },

    /// Frozen accounts reject every mutation until unfrozen.
    #[error("Account {0} is frozen")]
    Frozen(AccountId),

    /// Closed accounts reject every mutation, permanently.
    #[error("Account {0} is closed")]
    Closed(AccountId),

    /// The requested status change is not on the allowed chain.
    #[error("Cannot transition account from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: AccountStatus,
        /// Requested status.
        to: AccountStatus,
    },

    /// Closure requires a zero balance and no active holds.
    #[error(
        "Account {account} cannot close: balance {balance}, available {available}"
    )]
    NonZeroBalance {
        /// Account being closed.
        account: AccountId,
        /// Settled balance.
        balance: Decimal,
        /// Available balance.
        available: Decimal,
    },

    // ========== Funds ==========
    /// The movement would push available funds below the floor.
    #[error(
        "Insufficient funds on account {account}: requested {requested}, available {available}"
    )]
    InsufficientFunds {
        /// Account short of funds.
        account: AccountId,
        /// Amount asked for.
        requested: Decimal,
        /// Available balance before the movement.
        available: Decimal,
    },

    /// The withdrawal would exceed the account's daily cap.
    #[error(
        "Daily withdrawal limit exceeded on account {account}: requested {requested}, remaining {remaining}"
    )]
    DailyWithdrawalLimitExceeded {
        /// Account at its cap.
        account: AccountId,
        /// Amount asked for.
        requested: Decimal,
        /// Headroom left today.
        remaining: Decimal,
    },

    // ========== Holds ==========
    /// The hold exists but is no longer active.
    #[error("Hold {hold} is {status:?} and cannot be settled")]
    HoldNotActive {
        /// The hold.
        hold: HoldId,
        /// Its current status.
        status: HoldStatus,
    },

    /// Expiry was requested before the hold's TTL ran out.
    #[error("Hold {hold} does not expire until {expires_at}")]
    HoldNotExpired {
        /// The hold.
        hold: HoldId,
        /// When the sweeper may expire it.
        expires_at: DateTime<Utc>,
    },

    // ========== Reversal ==========
    /// Each capture may be reversed at most once.
    #[error("Posting {posting} was already reversed")]
    AlreadyReversed {
        /// The posting.
        posting: PostingId,
    },

    /// The reversal policy window has closed.
    #[error("Reversal window for posting {posting} elapsed at {deadline}")]
    ReversalWindowElapsed {
        /// The posting.
        posting: PostingId,
        /// Last instant a reversal was allowed.
        deadline: DateTime<Utc>,
    },

    // ========== Idempotency ==========
    /// The token was seen before with a different request.
    #[error("Idempotency key {key} was already used for a different capture")]
    IdempotencyConflict {
        /// The conflicting token.
        key: IdempotencyKey,
    },

    // ========== Concurrency ==========
    /// Someone else changed the account first. Re-read and retry.
    #[error(
        "Concurrent modification on account {account}: expected version {expected}, found {actual}"
    )]
    ConcurrentModification {
        /// Contended account.
        account: AccountId,
        /// Version the caller read.
        expected: u64,
        /// Version actually stored.
        actual: u64,
    },
}

impl AccountError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "ZERO_AMOUNT",
            Self::NegativeAmount => "NEGATIVE_AMOUNT",
            Self::EmptyAccountNumber => "EMPTY_ACCOUNT_NUMBER",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::DuplicateAccountNumber(_) => "DUPLICATE_ACCOUNT_NUMBER",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::HoldNotFound { .. } => "HOLD_NOT_FOUND",
            Self::CaptureNotFound { .. } => "CAPTURE_NOT_FOUND",
            Self::NotActive { .. } => "ACCOUNT_NOT_ACTIVE",
            Self::Frozen(_) => "ACCOUNT_FROZEN",
            Self::Closed(_) => "ACCOUNT_CLOSED",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::NonZeroBalance { .. } => "NON_ZERO_BALANCE",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::DailyWithdrawalLimitExceeded { .. } => "DAILY_WITHDRAWAL_LIMIT_EXCEEDED",
            Self::HoldNotActive { .. } => "HOLD_NOT_ACTIVE",
            Self::HoldNotExpired { .. } => "HOLD_NOT_EXPIRED",
            Self::AlreadyReversed { .. } => "ALREADY_REVERSED",
            Self::ReversalWindowElapsed { .. } => "REVERSAL_WINDOW_ELAPSED",
            Self::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
        }
    }

    /// HTTP status the API layer should map this error to.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::ZeroAmount
            | Self::NegativeAmount
            | Self::EmptyAccountNumber
            | Self::CurrencyMismatch { .. }
            | Self::NotActive { .. }
            | Self::Closed(_)
            | Self::InvalidTransition { .. }
            | Self::NonZeroBalance { .. }
            | Self::InsufficientFunds { .. }
            | Self::DailyWithdrawalLimitExceeded { .. }
            | Self::HoldNotActive { .. }
            | Self::HoldNotExpired { .. }
            | Self::ReversalWindowElapsed { .. } => 400,
            Self::Frozen(_) => 403,
            Self::AccountNotFound(_) | Self::HoldNotFound { .. } | Self::CaptureNotFound { .. } => {
                404
            }
            Self::DuplicateAccountNumber(_)
            | Self::AlreadyReversed { .. }
            | Self::IdempotencyConflict { .. }
            | Self::ConcurrentModification { .. } => 409,
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only version conflicts are worth retrying; everything else needs a
    /// different request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
