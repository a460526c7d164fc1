//! Customer account records: balances, holds, and capture history.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use meridian_shared::types::{
    AccountId, ActorId, BranchId, Currency, CustomerId, HoldId, IdempotencyKey, Money, PostingId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a customer account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Fully operational.
    Active,
    /// Long-inactive; reads only until reactivated through dormant.
    Inactive,
    /// Flagged for inactivity; most operations still work.
    Dormant,
    /// Administratively blocked; every mutation is rejected.
    Frozen,
    /// Terminal. A closed account never reopens.
    Closed,
}

impl AccountStatus {
    /// String form used in serialization and errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Dormant => "dormant",
            Self::Frozen => "frozen",
            Self::Closed => "closed",
        }
    }

    /// Parses from the string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "dormant" => Some(Self::Dormant),
            "frozen" => Some(Self::Frozen),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Statuses a plain transition may target from `self`.
    ///
    /// Dormancy sits between active and inactive, so reactivating an
    /// inactive account passes back through dormant. Freezing and closing
    /// go through their dedicated operations, never through here.
    #[must_use]
    pub fn can_transition_to(&self, target: AccountStatus) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Dormant)
                | (Self::Dormant, Self::Active)
                | (Self::Dormant, Self::Inactive)
                | (Self::Inactive, Self::Dormant)
        )
    }

    /// Frozen and closed accounts reject every mutating operation.
    #[must_use]
    pub fn blocks_mutations(&self) -> bool {
        matches!(self, Self::Frozen | Self::Closed)
    }

    /// Holds may only be authorized while active or dormant.
    #[must_use]
    pub fn can_hold(&self) -> bool {
        matches!(self, Self::Active | Self::Dormant)
    }

    /// Closed is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an authorization hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldStatus {
    /// Earmarked against the available balance.
    Active,
    /// Settled by a capture.
    Captured,
    /// Released without settlement.
    Released,
    /// Expired past its TTL and swept.
    Expired,
}

impl HoldStatus {
    /// Only active holds reduce the available balance.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// An authorization hold earmarking funds for a pending capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    /// Hold id, returned to the authorizing caller.
    pub id: HoldId,
    /// Earmarked amount, always positive and in the account currency.
    pub amount: Money,
    /// Current status.
    pub status: HoldStatus,
    /// When the hold was placed.
    pub placed_at: DateTime<Utc>,
    /// Past this instant the sweeper may expire the hold.
    pub expires_at: DateTime<Utc>,
}

/// A settled posting line on this account, kept for idempotent replays
/// and reversals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Posting this capture belongs to.
    pub posting_id: PostingId,
    /// Signed balance delta that was applied.
    pub amount: Money,
    /// Hold settled by this capture, when there was one.
    pub hold_id: Option<HoldId>,
    /// Caller idempotency token, when supplied.
    pub key: Option<IdempotencyKey>,
    /// When the capture was applied.
    pub applied_at: DateTime<Utc>,
    /// Balance right after the capture.
    pub balance_after: Decimal,
    /// Available balance right after the capture.
    pub available_after: Decimal,
    /// Set once a reversal has undone this capture.
    pub reversed: bool,
}

/// A customer account record.
///
/// This is the value stored in the versioned registry; mutation happens
/// by cloning, editing, and compare-and-swapping the clone back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account id.
    pub id: AccountId,
    /// Human-facing account number, unique across the ledger.
    pub account_number: String,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Banking product this account was opened under.
    pub product_code: String,
    /// Branch of record.
    pub branch_id: BranchId,
    /// Account currency. Every money movement must match it.
    pub currency: Currency,
    /// Settled balance.
    pub balance: Decimal,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Balance floor before the overdraft allowance applies.
    pub minimum_balance: Decimal,
    /// How far below the minimum balance withdrawals may go.
    pub overdraft_limit: Decimal,
    /// Cap on total withdrawals per calendar day, if any.
    pub daily_withdrawal_limit: Option<Decimal>,
    /// Every hold ever placed, active ones first-class.
    pub holds: Vec<Hold>,
    /// Capture history by posting id.
    pub captures: HashMap<PostingId, CaptureRecord>,
    /// Idempotency token to posting id, for capture replays.
    pub idempotency: HashMap<IdempotencyKey, PostingId>,
    /// Status to restore on unfreeze.
    pub frozen_from: Option<AccountStatus>,
    /// Withdrawals accumulated on `withdrawal_day`.
    pub withdrawn_today: Decimal,
    /// Calendar day the withdrawal counter belongs to.
    pub withdrawal_day: Option<NaiveDate>,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
    /// Who opened it.
    pub created_by: ActorId,
    /// Set at closure.
    pub closed_at: Option<DateTime<Utc>>,
    /// Who closed it.
    pub closed_by: Option<ActorId>,
    /// Free-form closure reason.
    pub closure_reason: Option<String>,
}

impl Account {
    /// Sum of all active holds.
    #[must_use]
    pub fn active_hold_total(&self) -> Decimal {
        self.holds
            .iter()
            .filter(|hold| hold.status.is_active())
            .map(|hold| hold.amount.amount)
            .sum()
    }

    /// Balance minus active holds. This is what new holds and
    /// withdrawals are checked against.
    #[must_use]
    pub fn available_balance(&self) -> Decimal {
        self.balance - self.active_hold_total()
    }

    /// Lowest value the available balance may reach through holds and
    /// withdrawals. Reversals are exempt.
    #[must_use]
    pub fn available_floor(&self) -> Decimal {
        self.minimum_balance - self.overdraft_limit
    }

    /// Looks up a hold by id.
    #[must_use]
    pub fn hold(&self, id: HoldId) -> Option<&Hold> {
        self.holds.iter().find(|hold| hold.id == id)
    }

    pub(crate) fn hold_mut(&mut self, id: HoldId) -> Option<&mut Hold> {
        self.holds.iter_mut().find(|hold| hold.id == id)
    }

    /// True while any hold is still active.
    #[must_use]
    pub fn has_active_holds(&self) -> bool {
        self.holds.iter().any(|hold| hold.status.is_active())
    }
}

/// Input for opening a customer account.
///
/// Accounts open at zero balance; initial funding arrives as a posting
/// so the books stay balanced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountInput {
    /// Human-facing account number, unique across the ledger.
    pub account_number: String,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Banking product code.
    pub product_code: String,
    /// Branch of record.
    pub branch_id: BranchId,
    /// Account currency.
    pub currency: Currency,
    /// Balance floor before the overdraft allowance applies.
    #[serde(default)]
    pub minimum_balance: Decimal,
    /// How far below the minimum balance withdrawals may go.
    #[serde(default)]
    pub overdraft_limit: Decimal,
    /// Cap on total withdrawals per calendar day, if any.
    #[serde(default)]
    pub daily_withdrawal_limit: Option<Decimal>,
    /// Who is opening the account.
    pub created_by: ActorId,
}

/// Point-in-time read snapshot of an account.
///
/// Carries the registry version so callers can feed it back as
/// `expected_version` on their next edit.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    /// Account id.
    pub id: AccountId,
    /// Account number.
    pub account_number: String,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Banking product code.
    pub product_code: String,
    /// Branch of record.
    pub branch_id: BranchId,
    /// Account currency.
    pub currency: Currency,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Settled balance.
    pub balance: Decimal,
    /// Balance minus active holds.
    pub available_balance: Decimal,
    /// Balance floor before overdraft.
    pub minimum_balance: Decimal,
    /// Overdraft allowance.
    pub overdraft_limit: Decimal,
    /// Daily withdrawal cap, if any.
    pub daily_withdrawal_limit: Option<Decimal>,
    /// Holds still earmarking funds.
    pub active_holds: Vec<Hold>,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
    /// Set at closure.
    pub closed_at: Option<DateTime<Utc>>,
    /// Free-form closure reason.
    pub closure_reason: Option<String>,
    /// Registry version at snapshot time.
    pub version: u64,
}

impl AccountView {
    pub(crate) fn from_versioned(account: &Account, version: u64) -> Self {
        Self {
            id: account.id,
            account_number: account.account_number.clone(),
            customer_id: account.customer_id,
            product_code: account.product_code.clone(),
            branch_id: account.branch_id,
            currency: account.currency,
            status: account.status,
            balance: account.balance,
            available_balance: account.available_balance(),
            minimum_balance: account.minimum_balance,
            overdraft_limit: account.overdraft_limit,
            daily_withdrawal_limit: account.daily_withdrawal_limit,
            active_holds: account
                .holds
                .iter()
                .filter(|hold| hold.status.is_active())
                .cloned()
                .collect(),
            created_at: account.created_at,
            closed_at: account.closed_at,
            closure_reason: account.closure_reason.clone(),
            version,
        }
    }
}

/// Outcome of a successful hold authorization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldReceipt {
    /// Account the hold was placed on.
    pub account_id: AccountId,
    /// The placed hold.
    pub hold: Hold,
    /// Available balance right after placement.
    pub available_after: Decimal,
}

/// Outcome of a settled or replayed capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureReceipt {
    /// Posting id the capture settled under.
    pub posting_id: PostingId,
    /// Account the capture applied to.
    pub account_id: AccountId,
    /// Signed balance delta.
    pub amount: Money,
    /// Hold settled by this capture, when there was one.
    pub hold_id: Option<HoldId>,
    /// Balance right after the capture.
    pub balance_after: Decimal,
    /// Available balance right after the capture.
    pub available_after: Decimal,
    /// When the capture was originally applied.
    pub applied_at: DateTime<Utc>,
    /// True when an idempotent replay returned the recorded outcome
    /// instead of applying anything.
    pub replayed: bool,
}
