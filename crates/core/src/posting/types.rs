//! Posting types: lines, targets, and receipts.

use chrono::{DateTime, Utc};
use meridian_shared::types::{AccountId, GlAccountId, Money, PostingId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a posting line lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum LineTarget {
    /// A general-ledger account.
    Gl(GlAccountId),
    /// A customer account.
    Customer(AccountId),
}

impl LineTarget {
    /// Deterministic application order: GL accounts first, then customer
    /// accounts, each group ascending by id. Concurrent postings that
    /// touch the same accounts contend in the same order.
    #[must_use]
    pub fn sort_key(&self) -> (u8, Uuid) {
        match self {
            Self::Gl(id) => (0, id.into_inner()),
            Self::Customer(id) => (1, id.into_inner()),
        }
    }
}

/// One signed movement on a target account.
///
/// Positive amounts raise the target balance, negative ones lower it;
/// whether that reads as a debit or a credit is a presentation concern
/// driven by the account type's normal balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLine {
    /// Account the movement lands on.
    pub target: LineTarget,
    /// Signed amount.
    pub amount: Money,
}

impl LedgerLine {
    /// Line against a GL account.
    #[must_use]
    pub fn gl(id: GlAccountId, amount: Money) -> Self {
        Self {
            target: LineTarget::Gl(id),
            amount,
        }
    }

    /// Line against a customer account.
    #[must_use]
    pub fn customer(id: AccountId, amount: Money) -> Self {
        Self {
            target: LineTarget::Customer(id),
            amount,
        }
    }
}

/// A multi-line posting. Lines must net to zero within each currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Movements to apply atomically.
    pub lines: Vec<LedgerLine>,
    /// Free-form description.
    pub memo: Option<String>,
}

impl Posting {
    /// Posting without a memo.
    #[must_use]
    pub fn new(lines: Vec<LedgerLine>) -> Self {
        Self { lines, memo: None }
    }

    /// Posting with a memo.
    #[must_use]
    pub fn with_memo(lines: Vec<LedgerLine>, memo: impl Into<String>) -> Self {
        Self {
            lines,
            memo: Some(memo.into()),
        }
    }
}

/// Outcome of one applied line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResult {
    /// Account the line landed on.
    pub target: LineTarget,
    /// Signed amount applied.
    pub amount: Money,
    /// Target balance right after this line.
    pub balance_after: Decimal,
}

/// Outcome of a fully applied posting.
///
/// Lines keep the caller's original order, whatever order they were
/// applied in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostingReceipt {
    /// Id the posting was applied under.
    pub posting_id: PostingId,
    /// When the posting landed.
    pub applied_at: DateTime<Utc>,
    /// Caller's memo.
    pub memo: Option<String>,
    /// Per-line outcomes, in input order.
    pub lines: Vec<LineResult>,
    /// Set when this posting reverses an earlier one.
    pub reversal_of: Option<PostingId>,
}
