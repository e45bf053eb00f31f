use proptest::prelude::*;

use super::model::Operation;

const USERS: u64 = 10;

/// Amounts from a penny up to just past the full balance band, so sequences
/// exercise both accepted and rejected operations.
fn amount() -> impl Strategy<Value = i64> {
    1i64..60_000
}

fn transfer() -> impl Strategy<Value = Operation> {
    (0..USERS, 0..USERS, amount())
        .prop_map(|(from, to, amount)| Operation::Transfer { from, to, amount })
}

fn bulk_transfer() -> impl Strategy<Value = Operation> {
    (
        0..USERS,
        prop::collection::vec((0..USERS, 1i64..5_000), 1..8),
    )
        .prop_map(|(from, recipients)| Operation::BulkTransfer { from, recipients })
}

fn contribute() -> impl Strategy<Value = Operation> {
    (0..USERS, amount()).prop_map(|(user, amount)| Operation::Contribute { user, amount })
}

pub fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => transfer(),
        1 => bulk_transfer(),
        2 => contribute(),
    ]
}

pub fn operation_sequence(len: usize) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation(), 1..=len)
}
