use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::generators::operation_sequence;
use super::model::{LedgerModel, OpResult, Operation};

use crate::amount::Pence;
use crate::audit::{self, AuditAction, AuditQuery};
use crate::config;
use crate::context::OperationContext;
use crate::directory::{self, UserRole};
use crate::events;
use crate::ledger::{self, accounts};
use candid::Principal;

// ============================================
// CATEGORY 1: MODEL INVARIANTS UNDER RANDOM LOAD
// ============================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn test_invariants_hold_after_100_ops(ops in operation_sequence(100)) {
        let mut model = LedgerModel::with_users(10, 5_000);

        for (i, op) in ops.into_iter().enumerate() {
            let _ = model.execute(op);

            // Check invariants after EVERY operation
            model.check_conservation()
                .map_err(|e| TestCaseError::fail(format!("Op {}: {}", i, e)))?;
            model.check_bounds()
                .map_err(|e| TestCaseError::fail(format!("Op {}: {}", i, e)))?;
        }
    }

    #[test]
    fn test_invariants_hold_after_500_ops(ops in operation_sequence(500)) {
        let mut model = LedgerModel::with_users(10, 0);

        for op in ops {
            let _ = model.execute(op);
        }

        model.check_conservation().map_err(TestCaseError::fail)?;
        model.check_bounds().map_err(TestCaseError::fail)?;
    }
}

// Deterministic regression test (reproducible with seed)
#[test]
fn test_deterministic_10k_operations() {
    let mut rng = ChaCha8Rng::seed_from_u64(12345); // Fixed seed
    let mut model = LedgerModel::with_users(20, 10_000);

    for i in 0..10_000 {
        let op = random_op(&mut rng, 20);
        let _ = model.execute(op);

        if i % 100 == 0 {
            model.check_conservation().expect("conservation");
            model.check_bounds().expect("bounds");
        }
    }

    model.check_conservation().expect("final conservation check");
    model.check_bounds().expect("final bounds check");
}

fn random_op(rng: &mut ChaCha8Rng, users: u64) -> Operation {
    let from = rng.gen_range(0..users);
    match rng.gen_range(0..7) {
        0..=3 => Operation::Transfer {
            from,
            to: rng.gen_range(0..users),
            amount: rng.gen_range(1..40_000),
        },
        4 => Operation::BulkTransfer {
            from,
            recipients: (0..rng.gen_range(1..6))
                .map(|_| (rng.gen_range(0..users), rng.gen_range(1..3_000)))
                .collect(),
        },
        _ => Operation::Contribute {
            user: from,
            amount: rng.gen_range(1..20_000),
        },
    }
}

// ============================================
// CATEGORY 2: MODEL EDGE CASES
// ============================================

#[test]
fn test_exact_floor_and_ceiling() {
    let mut model = LedgerModel::with_users(2, 0);

    // User 0 lends everything possible to user 1: lands exactly on the floor.
    assert_eq!(
        model.execute(Operation::Transfer { from: 0, to: 1, amount: 25_000 }),
        OpResult::Success
    );
    assert_eq!(model.balances[&0], -25_000);
    assert_eq!(model.balances[&1], 25_000);

    // A single penny in either direction is rejected.
    assert_eq!(
        model.execute(Operation::Transfer { from: 0, to: 1, amount: 1 }),
        OpResult::InsufficientFunds
    );
    assert_eq!(
        model.execute(Operation::Transfer { from: 1, to: 0, amount: 50_001 }),
        OpResult::InsufficientFunds
    );

    model.check_conservation().unwrap();
    model.check_bounds().unwrap();
}

#[test]
fn test_bulk_duplicate_recipient_ceiling() {
    let mut model = LedgerModel::with_users(2, 0);

    // Two credits of 150.00 each pass individually but not combined.
    assert_eq!(
        model.execute(Operation::BulkTransfer {
            from: 0,
            recipients: vec![(1, 15_000), (1, 15_000)],
        }),
        OpResult::LimitExceeded
    );
    assert_eq!(model.balances[&1], 0);
    model.check_conservation().unwrap();
}

#[test]
fn test_contributions_move_funds_to_escrow() {
    let mut model = LedgerModel::with_users(3, 10_000);

    assert_eq!(
        model.execute(Operation::Contribute { user: 1, amount: 6_000 }),
        OpResult::Success
    );
    assert_eq!(
        model.execute(Operation::Contribute { user: 2, amount: 7_000 }),
        OpResult::Success
    );
    assert_eq!(model.pool_escrow, 13_000);
    model.check_conservation().unwrap();

    // Overdraft still caps contributions.
    assert_eq!(
        model.execute(Operation::Contribute { user: 1, amount: 40_000 }),
        OpResult::InsufficientFunds
    );
}

// ============================================
// CATEGORY 3: MODEL VS REAL SERVICE LAYER
// ============================================

fn principal_for(user: u64) -> Principal {
    let mut bytes = [0u8; 29];
    bytes[0] = 1 + user as u8;
    Principal::from_slice(&bytes)
}

fn admin() -> Principal {
    Principal::from_slice(&[0xAA; 29])
}

fn seed_real_users(n: u64, opening_pence: i64) {
    config::set_admin(admin(), admin()).unwrap();
    let ctx = OperationContext::new(admin(), 1);
    for user in 0..n {
        directory::register_user(
            &ctx,
            principal_for(user),
            format!("user{}@example.com", user),
            format!("User {}", user),
            UserRole::Employee,
        )
        .unwrap();
        if opening_pence != 0 {
            accounts::apply_delta(&ctx, principal_for(user), Pence::from_minor(opening_pence))
                .unwrap();
        }
    }
}

/// Drive the real services and the mirror model with the same seeded
/// operation stream; they must agree on every accept/reject decision and on
/// every balance, and the audit log must stay in parity with the
/// transaction table.
#[test]
fn test_real_ledger_agrees_with_model() {
    const USERS: u64 = 6;
    const OPENING: i64 = 5_000;

    seed_real_users(USERS, OPENING);
    let mut model = LedgerModel::with_users(USERS, OPENING);

    // One pool to receive contributions.
    let pool = events::create(
        &OperationContext::new(principal_for(0), 10),
        "stress pool".to_string(),
        "model parity".to_string(),
        None,
        None,
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(777);
    let mut completed = 0u64;
    let mut failed_movements = 0u64;

    for step in 0..600u64 {
        let now = 100 + step;
        let from = rng.gen_range(0..USERS);
        let op = if rng.gen_bool(0.75) {
            Operation::Transfer {
                from,
                to: rng.gen_range(0..USERS),
                amount: rng.gen_range(1..40_000),
            }
        } else {
            Operation::Contribute {
                user: from,
                amount: rng.gen_range(1..20_000),
            }
        };

        let model_result = model.execute(op.clone());
        let ctx = OperationContext::new(principal_for(from), now);

        let real_success = match op {
            Operation::Transfer { to, amount, .. } => {
                let result =
                    ledger::transfer(&ctx, principal_for(to), Pence::from_minor(amount), None, None);
                // Self-transfers and the like are rejected before a record
                // is written; balance-bound rejections leave a FAILED row.
                if result.is_err() && model_result != OpResult::SelfTransfer {
                    failed_movements += 1;
                }
                result.is_ok()
            }
            Operation::Contribute { amount, .. } => {
                let result =
                    events::contribute(&ctx, pool.id, Pence::from_minor(amount), None);
                if result.is_err() {
                    failed_movements += 1;
                }
                result.is_ok()
            }
            Operation::BulkTransfer { .. } => unreachable!("not generated here"),
        };

        assert_eq!(
            real_success,
            model_result == OpResult::Success,
            "step {}: model said {:?}",
            step,
            model_result
        );
        if real_success {
            completed += 1;
        }

        if step % 50 == 0 {
            // Balance-by-balance agreement and bounds.
            for user in 0..USERS {
                let real = accounts::get_account(principal_for(user)).unwrap().balance;
                assert_eq!(real.minor_units(), model.balances[&user], "user {}", user);
                assert!(real >= ledger::MIN_BALANCE && real <= ledger::MAX_BALANCE);
            }
            model.check_conservation().unwrap();

            // Conservation on the real side: user funds plus pool escrow.
            let escrow = events::total_contributions(pool.id);
            let total = accounts::total_balance().checked_add(escrow).unwrap();
            assert_eq!(total.minor_units(), USERS as i64 * OPENING);
        }
    }

    // Audit parity: one TRANSACTION_CREATED per completed movement, one
    // TRANSACTION_FAILED per rejected movement that reached the ledger.
    let created = audit::query_entries(&AuditQuery {
        action: Some(AuditAction::TransactionCreated),
        ..Default::default()
    })
    .total_matching;
    let failed = audit::query_entries(&AuditQuery {
        action: Some(AuditAction::TransactionFailed),
        ..Default::default()
    })
    .total_matching;
    assert_eq!(created, completed);
    assert_eq!(failed, failed_movements);
}
