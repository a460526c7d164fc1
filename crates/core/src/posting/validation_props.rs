//! Property tests for posting validation.

use meridian_shared::types::{Currency, GlAccountId, Money};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::error::PostingError;
use super::types::LedgerLine;
use super::validation::validate_lines;

const MAX_LINES: usize = 100;

fn nonzero_amount() -> impl Strategy<Value = i64> {
    prop_oneof![1i64..=10_000, -10_000i64..=-1]
}

fn lines_for(currency: Currency, amounts: &[i64]) -> Vec<LedgerLine> {
    amounts
        .iter()
        .map(|amount| {
            LedgerLine::gl(
                GlAccountId::new(),
                Money::new(Decimal::from(*amount), currency),
            )
        })
        .collect()
}

/// Lines for the amounts plus, when they do not already cancel out, one
/// balancing line for the negated sum.
fn balanced(currency: Currency, amounts: &[i64]) -> Vec<LedgerLine> {
    let mut lines = lines_for(currency, amounts);
    let net: i64 = amounts.iter().sum();
    if net != 0 {
        lines.push(LedgerLine::gl(
            GlAccountId::new(),
            Money::new(Decimal::from(-net), currency),
        ));
    }
    lines
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_balanced_groups_always_validate(
        usd_amounts in prop::collection::vec(nonzero_amount(), 1..20),
        eur_amounts in prop::collection::vec(nonzero_amount(), 1..20),
    ) {
        let mut lines = balanced(Currency::Usd, &usd_amounts);
        lines.extend(balanced(Currency::Eur, &eur_amounts));

        prop_assert!(validate_lines(&lines, MAX_LINES).is_ok());
    }

    #[test]
    fn prop_one_extra_line_breaks_balance(
        amounts in prop::collection::vec(nonzero_amount(), 1..20),
        extra in nonzero_amount(),
    ) {
        let mut lines = balanced(Currency::Usd, &amounts);
        lines.push(LedgerLine::gl(
            GlAccountId::new(),
            Money::new(Decimal::from(extra), Currency::Usd),
        ));

        let err = validate_lines(&lines, MAX_LINES).unwrap_err();
        prop_assert!(
            matches!(
                err,
                PostingError::Unbalanced { currency: Currency::Usd, net } if net == Decimal::from(extra)
            ),
            "unexpected error: {err:?}",
        );
    }
}
