//! Running GL balances and the journal of recorded postings.

use std::collections::BTreeMap;

use dashmap::DashMap;
use meridian_shared::types::{Currency, GlAccountId, Money, PostingId};
use rust_decimal::Decimal;
use serde::Serialize;

use super::types::PostingReceipt;

/// Running balance of one GL account in one currency.
///
/// Balances are signed nets. Flipping the sign for presentation is a
/// read-side concern driven by the account type's normal balance, never
/// something stored here. Currency-neutral accounts accumulate one
/// entry per currency they take lines in; amounts never cross between
/// those entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlRunningBalance {
    /// Currency of the accumulated lines.
    pub currency: Currency,
    /// Signed net balance.
    pub balance: Decimal,
    /// Lines ever applied in this currency, net of compensated ones.
    pub postings: u64,
}

/// A recorded posting with its reversal state.
#[derive(Debug, Clone)]
pub struct RecordedPosting {
    /// The receipt as returned to the caller.
    pub receipt: PostingReceipt,
    /// Set once a reversal has been applied.
    pub reversed: bool,
}

/// GL-side state of the posting coordinator: running balances per GL
/// account and currency, and the journal of applied postings.
#[derive(Debug, Default)]
pub struct GlBalanceBook {
    balances: DashMap<(GlAccountId, Currency), GlRunningBalance>,
    /// Lines ever applied per account, across currencies, net of
    /// compensated ones. Feeds `has_postings` without a scan.
    line_counts: DashMap<GlAccountId, u64>,
    postings: DashMap<PostingId, RecordedPosting>,
}

impl GlBalanceBook {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a signed delta and returns the balance after, in the
    /// line's own currency.
    ///
    /// GL balances have no floor and no status, so this cannot fail;
    /// postability checks belong to the coordinator.
    pub(crate) fn apply(&self, account_id: GlAccountId, amount: Money) -> Decimal {
        *self.line_counts.entry(account_id).or_insert(0) += 1;
        let mut entry = self
            .balances
            .entry((account_id, amount.currency))
            .or_insert(GlRunningBalance {
                currency: amount.currency,
                balance: Decimal::ZERO,
                postings: 0,
            });
        entry.balance += amount.amount;
        entry.postings += 1;
        entry.balance
    }

    /// Compensation for [`Self::apply`]. Decrementing the line counts
    /// keeps `has_postings` accurate after an aborted posting.
    pub(crate) fn unapply(&self, account_id: GlAccountId, amount: Money) {
        if let Some(mut count) = self.line_counts.get_mut(&account_id) {
            *count = count.saturating_sub(1);
        }
        if let Some(mut entry) = self.balances.get_mut(&(account_id, amount.currency)) {
            entry.balance -= amount.amount;
            entry.postings = entry.postings.saturating_sub(1);
        }
    }

    /// Whether any posting ever landed on the account, in any currency.
    /// Reversals count as postings, so a reversed account still reports
    /// postings.
    #[must_use]
    pub fn has_postings(&self, account_id: GlAccountId) -> bool {
        self.line_counts
            .get(&account_id)
            .is_some_and(|count| *count > 0)
    }

    /// Running balance of one GL account in one currency, if any line
    /// in that currency landed on it.
    #[must_use]
    pub fn balance(&self, account_id: GlAccountId, currency: Currency) -> Option<GlRunningBalance> {
        self.balances
            .get(&(account_id, currency))
            .map(|entry| *entry)
    }

    /// Every per-currency balance of one GL account, ordered by
    /// currency. One entry for pinned accounts, possibly several for
    /// currency-neutral ones.
    #[must_use]
    pub fn balances(&self, account_id: GlAccountId) -> Vec<GlRunningBalance> {
        let mut entries: Vec<GlRunningBalance> = self
            .balances
            .iter()
            .filter(|entry| entry.key().0 == account_id)
            .map(|entry| *entry.value())
            .collect();
        entries.sort_by_key(|entry| entry.currency);
        entries
    }

    /// Records a freshly applied posting.
    pub(crate) fn record(&self, receipt: PostingReceipt) {
        self.postings.insert(
            receipt.posting_id,
            RecordedPosting {
                receipt,
                reversed: false,
            },
        );
    }

    /// Recorded posting by id.
    #[must_use]
    pub fn recorded(&self, posting_id: PostingId) -> Option<RecordedPosting> {
        self.postings.get(&posting_id).map(|entry| entry.clone())
    }

    /// Claims the reversal of a posting. Exactly one caller gets `true`;
    /// everyone else sees the posting as already reversed.
    pub(crate) fn mark_reversed(&self, posting_id: PostingId) -> bool {
        match self.postings.get_mut(&posting_id) {
            Some(mut entry) if !entry.reversed => {
                entry.reversed = true;
                true
            }
            _ => false,
        }
    }

    /// Releases a reversal claim after the reversal failed to apply.
    pub(crate) fn clear_reversed(&self, posting_id: PostingId) {
        if let Some(mut entry) = self.postings.get_mut(&posting_id) {
            entry.reversed = false;
        }
    }

    /// Net GL balance per currency.
    #[must_use]
    pub fn net_by_currency(&self) -> BTreeMap<Currency, Decimal> {
        let mut totals = BTreeMap::new();
        for entry in &self.balances {
            *totals.entry(entry.currency).or_insert(Decimal::ZERO) += entry.balance;
        }
        totals
    }

    /// Number of recorded postings, reversals included.
    #[must_use]
    pub fn posting_count(&self) -> usize {
        self.postings.len()
    }
}
