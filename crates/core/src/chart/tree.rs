//! Chart-of-accounts tree.
//!
//! Accounts live in an arena keyed by id, with a code index for
//! uniqueness and a child index for traversal. Subtree edits (moves,
//! re-parenting updates) run under one interior write lock so readers
//! never observe a cyclic or orphaned structure. Per-account edits carry
//! a caller-read `expected_version` for optimistic concurrency.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use meridian_shared::types::{Currency, GlAccountId};
use tracing::info;

use super::error::ChartError;
use super::types::{CODE_MAX_LEN, CreateGlAccountInput, GlAccount, UpdateGlAccountInput};
use crate::clock::{Clock, SystemClock};
use crate::hierarchy::{self, HierarchyIter};

#[derive(Debug, Default)]
struct ChartState {
    nodes: HashMap<GlAccountId, GlAccount>,
    by_code: HashMap<String, GlAccountId>,
    children: HashMap<GlAccountId, Vec<GlAccountId>>,
}

/// The chart-of-accounts hierarchy.
pub struct ChartOfAccounts {
    state: RwLock<ChartState>,
    clock: Arc<dyn Clock>,
}

impl ChartOfAccounts {
    /// Creates an empty chart using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty chart with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(ChartState::default()),
            clock,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ChartState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChartState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a GL account, computing its `level` from the parent.
    ///
    /// # Errors
    ///
    /// Returns `ChartError` when the input is malformed, the code is
    /// taken, the parent is missing, or a hierarchy invariant would break.
    pub fn create(&self, input: CreateGlAccountInput) -> Result<GlAccount, ChartError> {
        if input.code.trim().is_empty() {
            return Err(ChartError::EmptyCode);
        }
        if input.code.chars().count() > CODE_MAX_LEN {
            return Err(ChartError::CodeTooLong {
                code: input.code,
                max: CODE_MAX_LEN,
            });
        }
        if input.name.trim().is_empty() {
            return Err(ChartError::EmptyName);
        }
        if input.is_control && input.allows_posting {
            return Err(ChartError::ControlAccountMustNotPost { code: input.code });
        }

        let mut state = self.write();
        if state.by_code.contains_key(&input.code) {
            return Err(ChartError::DuplicateCode(input.code));
        }

        let level = match input.parent_id {
            // Roots sit at level 0 and are the only place a neutral
            // (None) currency is allowed.
            None => 0,
            Some(parent_id) => {
                let parent = state
                    .nodes
                    .get(&parent_id)
                    .ok_or(ChartError::ParentNotFound(parent_id))?;
                check_currency(parent.currency, input.currency, &input.code)?;
                parent.level + 1
            }
        };

        let account = GlAccount {
            id: GlAccountId::new(),
            code: input.code,
            name: input.name,
            account_type: input.account_type,
            currency: input.currency,
            is_control: input.is_control,
            allows_posting: input.allows_posting,
            level,
            parent_id: input.parent_id,
            active: true,
            category: input.category,
            metadata: input.metadata,
            created_at: self.clock.now(),
            created_by: input.created_by,
            version: 1,
        };

        state.by_code.insert(account.code.clone(), account.id);
        if let Some(parent_id) = account.parent_id {
            state.children.entry(parent_id).or_default().push(account.id);
        }
        state.nodes.insert(account.id, account.clone());

        info!(
            account_id = %account.id,
            code = %account.code,
            level = account.level,
            "GL account created"
        );
        Ok(account)
    }

    /// Updates a GL account in place. `code` and `currency` never change.
    ///
    /// A parent change re-validates the hierarchy and recomputes levels
    /// for the whole subtree.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` when `expected_version` is stale,
    /// or another `ChartError` when the patched state breaks an invariant.
    pub fn update(
        &self,
        id: GlAccountId,
        expected_version: u64,
        patch: UpdateGlAccountInput,
    ) -> Result<GlAccount, ChartError> {
        let mut state = self.write();
        let current = state
            .nodes
            .get(&id)
            .ok_or(ChartError::AccountNotFound(id))?;
        if current.version != expected_version {
            return Err(ChartError::ConcurrentModification {
                account: id,
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut updated = current.clone();
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(ChartError::EmptyName);
            }
            updated.name = name;
        }
        if let Some(category) = patch.category {
            updated.category = category;
        }
        if let Some(active) = patch.active {
            updated.active = active;
        }
        if let Some(allows_posting) = patch.allows_posting {
            updated.allows_posting = allows_posting;
        }
        if let Some(is_control) = patch.is_control {
            updated.is_control = is_control;
        }
        if let Some(metadata) = patch.metadata {
            updated.metadata = metadata;
        }

        if updated.is_control && updated.allows_posting {
            return Err(ChartError::ControlAccountMustNotPost { code: updated.code });
        }

        let reparent = match patch.parent_id {
            Some(new_parent) if new_parent != updated.parent_id => Some(new_parent),
            _ => None,
        };
        if let Some(new_parent) = reparent {
            Self::validate_reparent(&state, id, new_parent, updated.currency, &updated.code)?;
        }

        let old_parent = updated.parent_id;
        updated.version += 1;

        let stored = if let Some(new_parent) = reparent {
            Self::apply_reparent(&mut state, updated, old_parent, new_parent)
        } else {
            state.nodes.insert(id, updated.clone());
            updated
        };

        info!(account_id = %id, version = stored.version, "GL account updated");
        Ok(stored)
    }

    /// Re-parents a subtree; `None` makes the account a root.
    ///
    /// Levels of the moved account and all descendants are recomputed
    /// breadth-first under the same write lock.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` when the new parent sits inside the moved
    /// subtree, `CurrencyMismatch`/`NeutralCurrencyNotRoot` on currency
    /// conflicts, and `ConcurrentModification` on a stale version.
    pub fn move_account(
        &self,
        id: GlAccountId,
        new_parent_id: Option<GlAccountId>,
        expected_version: u64,
    ) -> Result<GlAccount, ChartError> {
        let mut state = self.write();
        let current = state
            .nodes
            .get(&id)
            .ok_or(ChartError::AccountNotFound(id))?;
        if current.version != expected_version {
            return Err(ChartError::ConcurrentModification {
                account: id,
                expected: expected_version,
                actual: current.version,
            });
        }
        if current.parent_id == new_parent_id {
            return Ok(current.clone());
        }

        Self::validate_reparent(&state, id, new_parent_id, current.currency, &current.code)?;

        let old_parent = current.parent_id;
        let mut updated = current.clone();
        updated.version += 1;
        let moved = Self::apply_reparent(&mut state, updated, old_parent, new_parent_id);

        info!(
            account_id = %id,
            new_parent = ?new_parent_id.map(|p| p.to_string()),
            level = moved.level,
            "GL account moved"
        );
        Ok(moved)
    }

    /// Hard-removes a never-posted leaf account.
    ///
    /// The chart does not know about postings, so the caller supplies the
    /// check; accounts with recorded postings may only be deactivated.
    ///
    /// # Errors
    ///
    /// Returns `HasChildren` or `HasPostings` when the guards fail.
    pub fn remove<F>(
        &self,
        id: GlAccountId,
        expected_version: u64,
        has_postings: F,
    ) -> Result<GlAccount, ChartError>
    where
        F: Fn(GlAccountId) -> bool,
    {
        let mut state = self.write();
        let version = state
            .nodes
            .get(&id)
            .map(|node| node.version)
            .ok_or(ChartError::AccountNotFound(id))?;
        if version != expected_version {
            return Err(ChartError::ConcurrentModification {
                account: id,
                expected: expected_version,
                actual: version,
            });
        }
        if state.children.get(&id).is_some_and(|kids| !kids.is_empty()) {
            return Err(ChartError::HasChildren(id));
        }
        if has_postings(id) {
            return Err(ChartError::HasPostings(id));
        }

        let Some(removed) = state.nodes.remove(&id) else {
            return Err(ChartError::AccountNotFound(id));
        };
        state.by_code.remove(&removed.code);
        state.children.remove(&id);
        if let Some(parent_id) = removed.parent_id {
            if let Some(siblings) = state.children.get_mut(&parent_id) {
                siblings.retain(|child| *child != id);
            }
        }

        info!(account_id = %id, code = %removed.code, "GL account removed");
        Ok(removed)
    }

    /// Returns whether direct posting to the account is allowed.
    ///
    /// False for control accounts, inactive accounts, accounts with
    /// posting disabled, and unknown ids.
    #[must_use]
    pub fn can_post(&self, id: GlAccountId) -> bool {
        self.read()
            .nodes
            .get(&id)
            .is_some_and(GlAccount::can_post)
    }

    /// Returns a snapshot of the account.
    #[must_use]
    pub fn get(&self, id: GlAccountId) -> Option<GlAccount> {
        self.read().nodes.get(&id).cloned()
    }

    /// Returns a snapshot of the account with the given code.
    #[must_use]
    pub fn get_by_code(&self, code: &str) -> Option<GlAccount> {
        let state = self.read();
        state
            .by_code
            .get(code)
            .and_then(|id| state.nodes.get(id))
            .cloned()
    }

    /// Returns the direct children of an account, ordered by code.
    #[must_use]
    pub fn children_of(&self, id: GlAccountId) -> Vec<GlAccount> {
        let state = self.read();
        let mut children: Vec<GlAccount> = state
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| state.nodes.get(child))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.code.cmp(&b.code));
        children
    }

    /// Returns all root accounts, ordered by code.
    #[must_use]
    pub fn roots(&self) -> Vec<GlAccount> {
        let mut roots: Vec<GlAccount> = self
            .read()
            .nodes
            .values()
            .filter(|node| node.is_root())
            .cloned()
            .collect();
        roots.sort_by(|a, b| a.code.cmp(&b.code));
        roots
    }

    /// Returns a point-in-time snapshot of every account.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GlAccount> {
        self.read().nodes.values().cloned().collect()
    }

    /// Projects the chart into its nested reporting view.
    ///
    /// The snapshot is taken under the read lock; iteration happens on
    /// the caller's time and never blocks writers, so a projection can go
    /// stale against concurrent edits but never cyclic or orphaned.
    #[must_use]
    pub fn build_hierarchy(&self, root: Option<GlAccountId>) -> HierarchyIter {
        hierarchy::project(self.snapshot(), root)
    }

    /// Number of accounts in the chart.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    /// Returns true if the chart has no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    fn validate_reparent(
        state: &ChartState,
        account: GlAccountId,
        new_parent: Option<GlAccountId>,
        currency: Option<Currency>,
        code: &str,
    ) -> Result<(), ChartError> {
        match new_parent {
            None => Ok(()),
            Some(parent_id) => {
                if parent_id == account {
                    return Err(ChartError::CycleDetected {
                        account,
                        parent: parent_id,
                    });
                }
                let parent = state
                    .nodes
                    .get(&parent_id)
                    .ok_or(ChartError::ParentNotFound(parent_id))?;
                if Self::has_ancestor(state, parent_id, account) {
                    return Err(ChartError::CycleDetected {
                        account,
                        parent: parent_id,
                    });
                }
                check_currency(parent.currency, currency, code)
            }
        }
    }

    /// Walks the parent chain of `node`; true if `ancestor` appears on it.
    /// Terminates because the stored structure is always a forest.
    fn has_ancestor(state: &ChartState, node: GlAccountId, ancestor: GlAccountId) -> bool {
        let mut cursor = state.nodes.get(&node).and_then(|n| n.parent_id);
        while let Some(parent_id) = cursor {
            if parent_id == ancestor {
                return true;
            }
            cursor = state.nodes.get(&parent_id).and_then(|n| n.parent_id);
        }
        false
    }

    fn apply_reparent(
        state: &mut ChartState,
        mut updated: GlAccount,
        old_parent: Option<GlAccountId>,
        new_parent: Option<GlAccountId>,
    ) -> GlAccount {
        let id = updated.id;
        if let Some(old) = old_parent {
            if let Some(siblings) = state.children.get_mut(&old) {
                siblings.retain(|child| *child != id);
            }
        }
        if let Some(new) = new_parent {
            state.children.entry(new).or_default().push(id);
        }

        updated.parent_id = new_parent;
        updated.level = match new_parent {
            None => 0,
            Some(parent_id) => state.nodes.get(&parent_id).map_or(0, |p| p.level) + 1,
        };
        state.nodes.insert(id, updated.clone());
        Self::recompute_descendant_levels(state, id);
        updated
    }

    /// Breadth-first level recompute below `root`. Parents are fixed up
    /// before their children, and only nodes whose level actually changed
    /// get a version bump.
    fn recompute_descendant_levels(state: &mut ChartState, root: GlAccountId) {
        let mut queue: VecDeque<GlAccountId> =
            state.children.get(&root).cloned().unwrap_or_default().into();
        while let Some(id) = queue.pop_front() {
            let parent_level = state
                .nodes
                .get(&id)
                .and_then(|node| node.parent_id)
                .and_then(|parent_id| state.nodes.get(&parent_id))
                .map_or(0, |parent| parent.level);
            if let Some(node) = state.nodes.get_mut(&id) {
                let new_level = parent_level + 1;
                if node.level != new_level {
                    node.level = new_level;
                    node.version += 1;
                }
            }
            if let Some(kids) = state.children.get(&id) {
                queue.extend(kids.iter().copied());
            }
        }
    }
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self::new()
    }
}

fn check_currency(
    parent_currency: Option<Currency>,
    child_currency: Option<Currency>,
    child_code: &str,
) -> Result<(), ChartError> {
    let Some(child) = child_currency else {
        // Only roots may be currency-neutral.
        return Err(ChartError::NeutralCurrencyNotRoot {
            code: child_code.to_string(),
        });
    };
    match parent_currency {
        // Children under a currency-neutral root may carry any currency.
        None => Ok(()),
        Some(parent) if parent == child => Ok(()),
        Some(parent) => Err(ChartError::CurrencyMismatch {
            expected: Some(parent),
            actual: Some(child),
        }),
    }
}
