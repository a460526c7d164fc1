//! Chart-of-accounts domain types.

use chrono::{DateTime, Utc};
use meridian_shared::types::{ActorId, Currency, GlAccountId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a GL account code, in characters.
pub const CODE_MAX_LEN: usize = 32;

/// Accounting classification of a GL account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Resources owned (cash, receivables, fixed assets).
    Asset,
    /// Obligations owed (payables, customer deposits).
    Liability,
    /// Owner's residual interest.
    Equity,
    /// Revenue earned.
    Income,
    /// Costs incurred.
    Expense,
}

/// Which side increases an account's reported balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalBalance {
    /// Debit-normal accounts (Asset, Expense).
    Debit,
    /// Credit-normal accounts (Liability, Equity, Income).
    Credit,
}

impl AccountType {
    /// Returns the string representation of the type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Parses a type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "asset" => Some(Self::Asset),
            "liability" => Some(Self::Liability),
            "equity" => Some(Self::Equity),
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    /// Returns which side carries this account type's normal balance.
    #[must_use]
    pub const fn normal_balance(self) -> NormalBalance {
        match self {
            Self::Asset | Self::Expense => NormalBalance::Debit,
            Self::Liability | Self::Equity | Self::Income => NormalBalance::Credit,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node in the general-ledger chart of accounts.
///
/// Structural invariants (unique immutable `code`, `level` = parent's
/// level + 1, control accounts never allow posting, currency agreement
/// with the parent, forest shape) are enforced by the chart, never by
/// callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlAccount {
    /// Unique identifier.
    pub id: GlAccountId,
    /// Globally unique account code, immutable after creation.
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Accounting classification.
    pub account_type: AccountType,
    /// Account currency. `None` marks a currency-neutral root.
    pub currency: Option<Currency>,
    /// Control accounts aggregate descendants and never take postings.
    pub is_control: bool,
    /// Whether direct postings are allowed.
    pub allows_posting: bool,
    /// Depth in the tree; roots are level 0. Computed, never client-supplied.
    pub level: u32,
    /// Parent account, if any.
    pub parent_id: Option<GlAccountId>,
    /// Soft-deactivation flag.
    pub active: bool,
    /// Free-form reporting tag.
    pub category: Option<String>,
    /// Caller-owned structured metadata.
    pub metadata: Option<serde_json::Value>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// Who created the account.
    pub created_by: ActorId,
    /// Optimistic concurrency version, starting at 1.
    pub version: u64,
}

impl GlAccount {
    /// Returns whether direct postings may target this account.
    #[must_use]
    pub fn can_post(&self) -> bool {
        self.allows_posting && !self.is_control && self.active
    }

    /// Returns true if this account sits at the root of its tree.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for creating a GL account.
///
/// `level` is always computed from the parent; there is deliberately no
/// field for it here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGlAccountInput {
    /// Unique account code.
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Accounting classification.
    pub account_type: AccountType,
    /// Account currency; `None` only for currency-neutral roots.
    pub currency: Option<Currency>,
    /// Whether this is an aggregation-only control account.
    pub is_control: bool,
    /// Whether direct postings are allowed.
    pub allows_posting: bool,
    /// Parent account, if any.
    pub parent_id: Option<GlAccountId>,
    /// Free-form reporting tag.
    pub category: Option<String>,
    /// Caller-owned structured metadata.
    pub metadata: Option<serde_json::Value>,
    /// Actor recorded in the audit fields.
    pub created_by: ActorId,
}

/// Patch for updating a GL account.
///
/// `code` and `currency` are immutable and have no field here. Outer
/// `None` means "leave unchanged"; for nullable fields the inner option
/// carries the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGlAccountInput {
    /// New name.
    pub name: Option<String>,
    /// New category (`Some(None)` clears it).
    pub category: Option<Option<String>>,
    /// New active flag.
    pub active: Option<bool>,
    /// New posting permission.
    pub allows_posting: Option<bool>,
    /// New control flag.
    pub is_control: Option<bool>,
    /// New parent (`Some(None)` makes the account a root).
    pub parent_id: Option<Option<GlAccountId>>,
    /// New metadata (`Some(None)` clears it).
    pub metadata: Option<Option<serde_json::Value>>,
}
