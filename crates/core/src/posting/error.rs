//! Errors for posting validation and coordination.

use chrono::{DateTime, Utc};
use meridian_shared::types::{Currency, GlAccountId, PostingId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::AccountError;
use crate::chart::ChartError;

/// Errors from posting validation and coordination.
#[derive(Debug, Error)]
pub enum PostingError {
    // ========== Validation ==========
    /// A posting needs at least one line.
    #[error("Posting must have at least one line")]
    Empty,

    /// The configured per-posting line cap.
    #[error("Posting has {count} lines, maximum is {max}")]
    TooManyLines {
        /// Lines in the posting.
        count: usize,
        /// Configured cap.
        max: usize,
    },

    /// Zero-amount lines carry no information and are rejected.
    #[error("Line {index} has a zero amount")]
    ZeroLineAmount {
        /// Offending line, by input position.
        index: usize,
    },

    /// The amount has more decimal places than the currency allows.
    #[error("Line {index} exceeds the {currency} scale of {scale} decimal places")]
    InvalidScale {
        /// Offending line, by input position.
        index: usize,
        /// Line currency.
        currency: Currency,
        /// Decimal places that currency allows.
        scale: u32,
    },

    /// Each account may appear at most once per posting, keeping the
    /// application order and reversals unambiguous.
    #[error("Line {index} repeats the target of line {first}")]
    DuplicateTarget {
        /// Offending line, by input position.
        index: usize,
        /// Line that used the target first.
        first: usize,
    },

    /// Lines grouped by currency must each net to exactly zero.
    #[error("Posting does not net to zero for {currency}: off by {net}")]
    Unbalanced {
        /// Currency group that failed.
        currency: Currency,
        /// Its non-zero net.
        net: Decimal,
    },

    // ========== Preflight ==========
    /// Control accounts, inactive accounts, and accounts with posting
    /// disabled reject direct lines.
    #[error("GL account {0} does not accept direct postings")]
    NotAllowed(GlAccountId),

    // ========== Reversal ==========
    /// No posting recorded under this id.
    #[error("No posting recorded under {0}")]
    UnknownPosting(PostingId),

    /// Each posting may be reversed at most once.
    #[error("Posting {0} was already reversed")]
    AlreadyReversed(PostingId),

    /// Reversals are terminal; re-posting is the way to redo one.
    #[error("Posting {0} is itself a reversal and cannot be reversed")]
    ReversalOfReversal(PostingId),

    /// The reversal policy window has closed.
    #[error("Reversal window for posting {posting} elapsed at {deadline}")]
    ReversalWindowElapsed {
        /// The posting.
        posting: PostingId,
        /// Last instant a reversal was allowed.
        deadline: DateTime<Utc>,
    },

    // ========== Application ==========
    /// A line failed mid-apply; every line applied before it was
    /// compensated, so no partial posting remains.
    #[error("Posting aborted after compensating {compensated} applied lines: {cause}")]
    Aborted {
        /// Lines rolled back.
        compensated: usize,
        /// What stopped the posting: an account error on a customer
        /// leg, or `NotAllowed` when a GL target lost postability
        /// between preflight and apply.
        #[source]
        cause: Box<PostingError>,
    },

    // ========== Wrapped domains ==========
    /// Chart-side failure during preflight.
    #[error(transparent)]
    Chart(#[from] ChartError),

    /// Account-side failure during preflight or reversal.
    #[error(transparent)]
    Account(#[from] AccountError),
}

impl PostingError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Empty => "EMPTY_POSTING",
            Self::TooManyLines { .. } => "TOO_MANY_LINES",
            Self::ZeroLineAmount { .. } => "ZERO_LINE_AMOUNT",
            Self::InvalidScale { .. } => "INVALID_SCALE",
            Self::DuplicateTarget { .. } => "DUPLICATE_TARGET",
            Self::Unbalanced { .. } => "UNBALANCED_POSTING",
            Self::NotAllowed(_) => "POSTING_NOT_ALLOWED",
            Self::UnknownPosting(_) => "UNKNOWN_POSTING",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::ReversalOfReversal(_) => "REVERSAL_OF_REVERSAL",
            Self::ReversalWindowElapsed { .. } => "REVERSAL_WINDOW_ELAPSED",
            Self::Aborted { .. } => "POSTING_ABORTED",
            Self::Chart(err) => err.error_code(),
            Self::Account(err) => err.error_code(),
        }
    }

    /// HTTP status the API layer should map this error to.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Empty
            | Self::TooManyLines { .. }
            | Self::ZeroLineAmount { .. }
            | Self::InvalidScale { .. }
            | Self::DuplicateTarget { .. }
            | Self::Unbalanced { .. }
            | Self::ReversalWindowElapsed { .. } => 400,
            Self::NotAllowed(_) => 403,
            Self::UnknownPosting(_) => 404,
            Self::AlreadyReversed(_) | Self::ReversalOfReversal(_) | Self::Aborted { .. } => 409,
            Self::Chart(err) => err.http_status_code(),
            Self::Account(err) => err.http_status_code(),
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// An aborted posting is worth retrying exactly when what stopped it
    /// was a version race.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Aborted { cause, .. } => cause.is_retryable(),
            Self::Chart(err) => err.is_retryable(),
            Self::Account(err) => err.is_retryable(),
            _ => false,
        }
    }
}
