//! Multi-line posting coordinator.
//!
//! A posting either lands on every target or on none. There is no
//! cross-account transaction to lean on, so atomicity comes from
//! compensation: lines apply one at a time in a deterministic order,
//! and the first failure unwinds the lines already applied before the
//! error surfaces. GL balances have no floor and no status, but a GL
//! target's postability is re-checked at apply time, so both leg kinds
//! can abort a posting.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Duration;
use meridian_shared::config::LedgerConfig;
use meridian_shared::types::{AccountId, Currency, PostingId};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::account::{AccountError, AccountLedger, AccountStatus};
use crate::chart::{ChartError, ChartOfAccounts};
use crate::clock::{Clock, SystemClock};

use super::book::GlBalanceBook;
use super::error::PostingError;
use super::types::{LedgerLine, LineResult, LineTarget, Posting, PostingReceipt};
use super::validation::validate_lines;

/// Coordinates balanced multi-line postings across the GL book and the
/// customer ledger.
pub struct PostingCoordinator<'a> {
    chart: &'a ChartOfAccounts,
    accounts: &'a AccountLedger,
    book: &'a GlBalanceBook,
    max_lines: usize,
    reversal_window: Duration,
    clock: Arc<dyn Clock>,
}

impl<'a> PostingCoordinator<'a> {
    /// Creates a coordinator using the system clock.
    #[must_use]
    pub fn new(
        chart: &'a ChartOfAccounts,
        accounts: &'a AccountLedger,
        book: &'a GlBalanceBook,
        config: &LedgerConfig,
    ) -> Self {
        Self::with_clock(chart, accounts, book, config, Arc::new(SystemClock))
    }

    /// Creates a coordinator with an injected clock.
    #[must_use]
    pub fn with_clock(
        chart: &'a ChartOfAccounts,
        accounts: &'a AccountLedger,
        book: &'a GlBalanceBook,
        config: &LedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chart,
            accounts,
            book,
            max_lines: config.posting.max_lines,
            reversal_window: Duration::hours(config.reversal.window_hours),
            clock,
        }
    }

    /// Applies a balanced posting to every target it names.
    ///
    /// Lines apply ordered by target id (GL accounts first), never in
    /// input order, so two postings touching the same accounts contend
    /// in the same sequence. The receipt reports lines in input order.
    ///
    /// # Errors
    ///
    /// Returns a validation error before anything is applied, or
    /// [`PostingError::Aborted`] when a line fails mid-way; in the
    /// latter case every applied line has been compensated and the
    /// books are back to their pre-posting state.
    pub fn post(&self, posting: Posting) -> Result<PostingReceipt, PostingError> {
        validate_lines(&posting.lines, self.max_lines)?;
        self.preflight(&posting.lines)?;

        let posting_id = PostingId::new();
        let mut order: Vec<usize> = (0..posting.lines.len()).collect();
        order.sort_by_key(|index| posting.lines[*index].target.sort_key());

        // Indexed by input position; the loop fills every slot or bails.
        let mut balances = vec![Decimal::ZERO; posting.lines.len()];
        let mut applied: Vec<usize> = Vec::with_capacity(posting.lines.len());
        for index in order {
            let line = &posting.lines[index];
            match self.apply_line(line, posting_id) {
                Ok(balance_after) => {
                    balances[index] = balance_after;
                    applied.push(index);
                }
                Err(cause) => {
                    let compensated = applied.len();
                    for undo in applied.into_iter().rev() {
                        self.unapply_line(&posting.lines[undo], posting_id);
                    }
                    warn!(
                        posting_id = %posting_id,
                        line = index,
                        compensated,
                        error = %cause,
                        "Posting aborted"
                    );
                    return Err(PostingError::Aborted {
                        compensated,
                        cause: Box::new(cause),
                    });
                }
            }
        }

        let lines = posting
            .lines
            .iter()
            .zip(balances)
            .map(|(line, balance_after)| LineResult {
                target: line.target,
                amount: line.amount,
                balance_after,
            })
            .collect();
        let receipt = PostingReceipt {
            posting_id,
            applied_at: self.clock.now(),
            memo: posting.memo,
            lines,
            reversal_of: None,
        };
        self.book.record(receipt.clone());

        info!(
            posting_id = %posting_id,
            lines = receipt.lines.len(),
            "Posting applied"
        );
        Ok(receipt)
    }

    /// Rejects lines that are certain to fail before anything applies.
    ///
    /// Advisory only: a target can still change between this check and
    /// the apply loop. Customer legs re-validate inside the account
    /// ledger and GL legs re-check postability in [`Self::apply_line`];
    /// the point here is to skip compensation for predictable failures.
    fn preflight(&self, lines: &[LedgerLine]) -> Result<(), PostingError> {
        for line in lines {
            match line.target {
                LineTarget::Gl(id) => {
                    let account = self.chart.get(id).ok_or(ChartError::AccountNotFound(id))?;
                    if !account.can_post() {
                        return Err(PostingError::NotAllowed(id));
                    }
                    // Currency-neutral accounts take lines in any currency.
                    if let Some(expected) = account.currency {
                        if expected != line.amount.currency {
                            return Err(ChartError::CurrencyMismatch {
                                expected: Some(expected),
                                actual: Some(line.amount.currency),
                            }
                            .into());
                        }
                    }
                }
                LineTarget::Customer(id) => {
                    let view = self
                        .accounts
                        .get(id)
                        .ok_or(AccountError::AccountNotFound(id))?;
                    match view.status {
                        AccountStatus::Frozen => return Err(AccountError::Frozen(id).into()),
                        AccountStatus::Closed => return Err(AccountError::Closed(id).into()),
                        _ => {}
                    }
                    if view.currency != line.amount.currency {
                        return Err(AccountError::CurrencyMismatch {
                            expected: view.currency,
                            actual: line.amount.currency,
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_line(
        &self,
        line: &LedgerLine,
        posting_id: PostingId,
    ) -> Result<Decimal, PostingError> {
        match line.target {
            LineTarget::Gl(id) => {
                // Preflight saw a postable account, but it may have been
                // deactivated or flipped to control since; the chart is
                // the authority at apply time.
                if !self.chart.can_post(id) {
                    return Err(PostingError::NotAllowed(id));
                }
                Ok(self.book.apply(id, line.amount))
            }
            LineTarget::Customer(id) => Ok(self.accounts.apply_line(id, line.amount, posting_id)?),
        }
    }

    fn unapply_line(&self, line: &LedgerLine, posting_id: PostingId) {
        match line.target {
            LineTarget::Gl(id) => self.book.unapply(id, line.amount),
            LineTarget::Customer(id) => self.accounts.unapply_line(id, posting_id),
        }
    }

    /// Reverses a recorded posting by applying its mirror image.
    ///
    /// The reversal is itself a posting, with its own id and receipt,
    /// linked through `reversal_of`. Reversals of reversals are not
    /// accepted; repost instead.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPosting`, `AlreadyReversed`,
    /// `ReversalOfReversal`, or `ReversalWindowElapsed` on the guard
    /// checks, and the underlying account error when a customer leg
    /// cannot be reversed; in that case no leg stays reversed.
    pub fn reverse_posting(&self, posting_id: PostingId) -> Result<PostingReceipt, PostingError> {
        let recorded = self
            .book
            .recorded(posting_id)
            .ok_or(PostingError::UnknownPosting(posting_id))?;
        if recorded.receipt.reversal_of.is_some() {
            return Err(PostingError::ReversalOfReversal(posting_id));
        }
        if recorded.reversed {
            return Err(PostingError::AlreadyReversed(posting_id));
        }
        let deadline = recorded.receipt.applied_at + self.reversal_window;
        if self.clock.now() > deadline {
            return Err(PostingError::ReversalWindowElapsed {
                posting: posting_id,
                deadline,
            });
        }

        // Claim the reversal; losing it means a racing call won between
        // the read above and here.
        if !self.book.mark_reversed(posting_id) {
            return Err(PostingError::AlreadyReversed(posting_id));
        }

        let has_customer_lines = recorded
            .receipt
            .lines
            .iter()
            .any(|line| matches!(line.target, LineTarget::Customer(_)));
        let mut customer_balances: HashMap<AccountId, Decimal> = HashMap::new();
        if has_customer_lines {
            match self.accounts.reverse(posting_id) {
                Ok(reversed) => customer_balances.extend(reversed),
                Err(err) => {
                    // The customer ledger restored its own legs; release
                    // the claim so the reversal can be retried.
                    self.book.clear_reversed(posting_id);
                    return Err(match err {
                        AccountError::AlreadyReversed { posting } => {
                            PostingError::AlreadyReversed(posting)
                        }
                        other => PostingError::Account(other),
                    });
                }
            }
        }

        let reversal_id = PostingId::new();
        let mut lines = Vec::with_capacity(recorded.receipt.lines.len());
        for line in &recorded.receipt.lines {
            let inverse = line.amount.negated();
            let balance_after = match line.target {
                LineTarget::Gl(id) => self.book.apply(id, inverse),
                LineTarget::Customer(id) => {
                    customer_balances.get(&id).copied().unwrap_or_default()
                }
            };
            lines.push(LineResult {
                target: line.target,
                amount: inverse,
                balance_after,
            });
        }

        let receipt = PostingReceipt {
            posting_id: reversal_id,
            applied_at: self.clock.now(),
            memo: recorded
                .receipt
                .memo
                .clone()
                .map(|memo| format!("reversal: {memo}")),
            lines,
            reversal_of: Some(posting_id),
        };
        self.book.record(receipt.clone());

        info!(
            posting_id = %posting_id,
            reversal_id = %reversal_id,
            "Posting reversed"
        );
        Ok(receipt)
    }

    /// Net position per currency across the GL book and the customer
    /// ledger. All zeros when every flow went through balanced postings.
    #[must_use]
    pub fn trial_balance(&self) -> BTreeMap<Currency, Decimal> {
        let mut totals = self.book.net_by_currency();
        for (currency, net) in self.accounts.net_by_currency() {
            *totals.entry(currency).or_insert(Decimal::ZERO) += net;
        }
        totals
    }
}
