//! Property-based tests for the chart-of-accounts tree.

use std::collections::HashMap;

use proptest::prelude::*;

use super::tree::ChartOfAccounts;
use super::types::{AccountType, CreateGlAccountInput};
use meridian_shared::types::{ActorId, Currency, GlAccountId};

fn input(code: String, parent_id: Option<GlAccountId>) -> CreateGlAccountInput {
    CreateGlAccountInput {
        code,
        name: "Property account".to_string(),
        account_type: AccountType::Asset,
        currency: Some(Currency::Usd),
        is_control: false,
        allows_posting: true,
        parent_id,
        category: None,
        metadata: None,
        created_by: ActorId::new(),
    }
}

/// Builds a random forest: a pick of 0 creates a root, anything else
/// attaches to an already-created account.
fn build(chart: &ChartOfAccounts, picks: &[usize]) -> Vec<GlAccountId> {
    let mut ids = Vec::with_capacity(picks.len());
    for (i, pick) in picks.iter().enumerate() {
        let parent_id = if ids.is_empty() || *pick == 0 {
            None
        } else {
            Some(ids[(*pick - 1) % ids.len()])
        };
        let account = chart.create(input(format!("{i:04}"), parent_id)).unwrap();
        ids.push(account.id);
    }
    ids
}

fn check_forest_invariants(chart: &ChartOfAccounts) -> Result<(), TestCaseError> {
    let snapshot = chart.snapshot();
    let by_id: HashMap<_, _> = snapshot.iter().map(|a| (a.id, a)).collect();
    for account in &snapshot {
        match account.parent_id {
            None => prop_assert_eq!(account.level, 0),
            Some(parent_id) => {
                prop_assert_eq!(account.level, by_id[&parent_id].level + 1);
            }
        }
        // The parent chain must terminate without revisiting the start.
        let mut steps = 0usize;
        let mut cursor = account.parent_id;
        while let Some(parent_id) = cursor {
            prop_assert_ne!(parent_id, account.id);
            steps += 1;
            prop_assert!(steps <= snapshot.len());
            cursor = by_id[&parent_id].parent_id;
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_random_builds_keep_levels_consistent(
        picks in prop::collection::vec(0usize..8, 1..40),
    ) {
        let chart = ChartOfAccounts::new();
        build(&chart, &picks);
        check_forest_invariants(&chart)?;
    }

    #[test]
    fn prop_random_moves_keep_the_forest_acyclic(
        picks in prop::collection::vec(0usize..8, 2..30),
        moves in prop::collection::vec((any::<usize>(), any::<usize>()), 1..20),
    ) {
        let chart = ChartOfAccounts::new();
        let ids = build(&chart, &picks);

        for (from, to) in moves {
            let id = ids[from % ids.len()];
            let target = if to % (ids.len() + 1) == ids.len() {
                None
            } else {
                Some(ids[to % ids.len()])
            };
            let version = chart.get(id).unwrap().version;
            // A rejected move leaves the forest untouched and an accepted
            // one keeps it a forest; re-checking covers both.
            let _ = chart.move_account(id, target, version);
            check_forest_invariants(&chart)?;
        }
    }

    #[test]
    fn prop_children_always_sorted_by_code(
        picks in prop::collection::vec(0usize..6, 1..30),
    ) {
        let chart = ChartOfAccounts::new();
        let ids = build(&chart, &picks);
        for id in ids {
            let codes: Vec<String> = chart
                .children_of(id)
                .into_iter()
                .map(|child| child.code)
                .collect();
            let mut sorted = codes.clone();
            sorted.sort();
            prop_assert_eq!(codes, sorted);
        }
    }
}
