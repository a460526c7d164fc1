//! Nested hierarchy projection over flat GL account snapshots.

use std::collections::HashMap;

use meridian_shared::types::{Currency, GlAccountId};
use serde::Serialize;

use crate::chart::types::{AccountType, GlAccount};

/// One account in the projected hierarchy, children nested inside and
/// ordered by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyNode {
    /// Account id.
    pub id: GlAccountId,
    /// Account code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Classification.
    pub account_type: AccountType,
    /// Account currency, `None` for neutral roots.
    pub currency: Option<Currency>,
    /// Depth in the full chart. Kept as stored, so a projection rooted
    /// mid-tree starts above zero.
    pub level: u32,
    /// Control accounts aggregate balances and reject direct postings.
    pub is_control: bool,
    /// Whether direct posting is enabled.
    pub allows_posting: bool,
    /// Inactive accounts still appear in projections.
    pub active: bool,
    /// Child subtrees, ordered by code.
    pub children: Vec<HierarchyNode>,
}

/// Restartable iterator over projected root subtrees.
///
/// Construction indexes the snapshot and sorts child lists once; each
/// `next()` materializes one root's subtree on demand.
#[derive(Debug, Clone)]
pub struct HierarchyIter {
    nodes: HashMap<GlAccountId, GlAccount>,
    children: HashMap<GlAccountId, Vec<GlAccountId>>,
    roots: Vec<GlAccountId>,
    cursor: usize,
}

/// Projects a flat snapshot into nested subtrees.
///
/// With `root: None` every top-level account becomes one yielded subtree,
/// ordered by code. With `Some(id)` the projection yields exactly the
/// subtree below that account, or nothing when the id is absent. A node
/// whose parent is missing from the snapshot is treated as top-level, so
/// pre-filtered snapshots still project cleanly.
#[must_use]
pub fn project(accounts: Vec<GlAccount>, root: Option<GlAccountId>) -> HierarchyIter {
    let mut nodes: HashMap<GlAccountId, GlAccount> = HashMap::with_capacity(accounts.len());
    for account in accounts {
        nodes.insert(account.id, account);
    }

    let mut children: HashMap<GlAccountId, Vec<GlAccountId>> = HashMap::new();
    let mut top: Vec<GlAccountId> = Vec::new();
    for account in nodes.values() {
        match account.parent_id {
            Some(parent_id) if nodes.contains_key(&parent_id) => {
                children.entry(parent_id).or_default().push(account.id);
            }
            _ => top.push(account.id),
        }
    }

    for ids in children.values_mut() {
        ids.sort_by(|a, b| nodes[a].code.cmp(&nodes[b].code));
    }
    top.sort_by(|a, b| nodes[a].code.cmp(&nodes[b].code));

    let roots = match root {
        None => top,
        Some(id) if nodes.contains_key(&id) => vec![id],
        Some(_) => Vec::new(),
    };

    HierarchyIter {
        nodes,
        children,
        roots,
        cursor: 0,
    }
}

impl HierarchyIter {
    /// Rewinds to the first root so the projection can be walked again.
    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    /// Number of root subtrees the projection yields per full walk.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    fn materialize(&self, id: GlAccountId) -> Option<HierarchyNode> {
        let account = self.nodes.get(&id)?;
        let children = self
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.materialize(*child))
            .collect();
        Some(HierarchyNode {
            id: account.id,
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            currency: account.currency,
            level: account.level,
            is_control: account.is_control,
            allows_posting: account.allows_posting,
            active: account.active,
            children,
        })
    }
}

impl Iterator for HierarchyIter {
    type Item = HierarchyNode;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.roots.len() {
            let id = self.roots[self.cursor];
            self.cursor += 1;
            if let Some(node) = self.materialize(id) {
                return Some(node);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.roots.len().saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}
