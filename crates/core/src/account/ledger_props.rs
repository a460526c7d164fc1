//! Property-based tests for the account ledger.

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::ledger::AccountLedger;
use super::types::OpenAccountInput;
use meridian_shared::types::{
    AccountId, ActorId, BranchId, Currency, CustomerId, HoldId, IdempotencyKey, Money,
};
use meridian_shared::LedgerConfig;

#[derive(Debug, Clone)]
enum Op {
    Deposit(i64),
    Withdraw(i64),
    Hold(i64),
    ReleaseNewest,
    CaptureNewest(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..=500).prop_map(Op::Deposit),
        (1i64..=500).prop_map(Op::Withdraw),
        (1i64..=200).prop_map(Op::Hold),
        Just(Op::ReleaseNewest),
        (1i64..=200).prop_map(Op::CaptureNewest),
    ]
}

fn usd(amount: i64) -> Money {
    Money::new(Decimal::from(amount), Currency::Usd)
}

fn open(ledger: &AccountLedger) -> AccountId {
    ledger
        .open_account(OpenAccountInput {
            account_number: "ACC-PROP".to_string(),
            customer_id: CustomerId::new(),
            product_code: "SAV-STD".to_string(),
            branch_id: BranchId::new(),
            currency: Currency::Usd,
            minimum_balance: Decimal::ZERO,
            overdraft_limit: Decimal::ZERO,
            daily_withdrawal_limit: None,
            created_by: ActorId::new(),
        })
        .unwrap()
        .id
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Whatever sequence of money operations runs, the available balance
    /// is always the balance minus the active earmarks, and with a zero
    /// floor it never goes negative.
    #[test]
    fn prop_available_tracks_balance_minus_active_holds(
        ops in prop::collection::vec(op_strategy(), 1..60),
    ) {
        let ledger = AccountLedger::new(&LedgerConfig::default());
        let id = open(&ledger);
        ledger
            .capture(id, usd(1_000), None, &IdempotencyKey::new("seed"))
            .unwrap();

        let mut holds: Vec<HoldId> = Vec::new();
        for (i, op) in ops.into_iter().enumerate() {
            let key = IdempotencyKey::new(format!("op-{i}"));
            match op {
                Op::Deposit(n) => {
                    let _ = ledger.capture(id, usd(n), None, &key);
                }
                Op::Withdraw(n) => {
                    let _ = ledger.capture(id, usd(-n), None, &key);
                }
                Op::Hold(n) => {
                    if let Ok(receipt) = ledger.authorize_hold(id, usd(n)) {
                        holds.push(receipt.hold.id);
                    }
                }
                Op::ReleaseNewest => {
                    if let Some(hold) = holds.pop() {
                        let _ = ledger.release_hold(id, hold);
                    }
                }
                Op::CaptureNewest(n) => {
                    if let Some(hold) = holds.pop() {
                        let _ = ledger.capture(id, usd(-n), Some(hold), &key);
                    }
                }
            }

            let view = ledger.get(id).unwrap();
            let earmarked: Decimal = view
                .active_holds
                .iter()
                .map(|hold| hold.amount.amount)
                .sum();
            prop_assert_eq!(view.available_balance, view.balance - earmarked);
            prop_assert!(view.available_balance >= Decimal::ZERO);
        }
    }

    /// Reversing a capture restores the balance to the pre-capture value
    /// exactly, for deposits and withdrawals alike.
    #[test]
    fn prop_capture_then_reverse_restores_balance(
        seed in 100i64..10_000,
        delta in 1i64..100,
        withdraw in any::<bool>(),
    ) {
        let ledger = AccountLedger::new(&LedgerConfig::default());
        let id = open(&ledger);
        ledger
            .capture(id, usd(seed), None, &IdempotencyKey::new("seed"))
            .unwrap();

        let amount = if withdraw { usd(-delta) } else { usd(delta) };
        let before = ledger.get(id).unwrap().balance;
        let receipt = ledger
            .capture(id, amount, None, &IdempotencyKey::new("cap"))
            .unwrap();
        prop_assert_eq!(receipt.balance_after, before + amount.amount);

        ledger.reverse(receipt.posting_id).unwrap();
        prop_assert_eq!(ledger.get(id).unwrap().balance, before);
    }

    /// Replaying a capture any number of times applies it exactly once.
    #[test]
    fn prop_replay_never_double_applies(
        replays in 1usize..10,
        delta in 1i64..500,
    ) {
        let ledger = AccountLedger::new(&LedgerConfig::default());
        let id = open(&ledger);
        ledger
            .capture(id, usd(1_000), None, &IdempotencyKey::new("seed"))
            .unwrap();

        let key = IdempotencyKey::new("cap");
        let first = ledger.capture(id, usd(-delta), None, &key).unwrap();
        for _ in 0..replays {
            let replay = ledger.capture(id, usd(-delta), None, &key).unwrap();
            prop_assert!(replay.replayed);
            prop_assert_eq!(replay.posting_id, first.posting_id);
            prop_assert_eq!(replay.balance_after, first.balance_after);
        }
        prop_assert_eq!(
            ledger.get(id).unwrap().balance,
            Decimal::from(1_000 - delta)
        );
    }
}
