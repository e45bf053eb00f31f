//! Account storage and balance-bound validation.
//!
//! One account per user, created when the directory registers the user and
//! never destroyed while the user exists. Balances move only through the
//! operations in `ledger::mod`; everything here keeps the bounded-balance
//! invariant MIN_BALANCE <= balance <= MAX_BALANCE checkable in one place.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{StableBTreeMap, Storable};
use serde::Serialize;
use serde_json::json;
use std::borrow::Cow;
use std::cell::RefCell;

use crate::amount::{Pence, CURRENCY};
use crate::audit::{self, AuditAction, EntityType, Severity};
use crate::context::OperationContext;
use crate::error::{Error, ErrorBody, Result};
use crate::{Memory, MEMORY_MANAGER};

/// Overdraft floor.
pub const MIN_BALANCE: Pence = Pence::from_minor(-25_000);
/// Hoarding ceiling.
pub const MAX_BALANCE: Pence = Pence::from_minor(25_000);
/// Advisory margin above the floor that triggers the overdraft warning.
pub const OVERDRAFT_WARNING_MARGIN: Pence = Pence::from_minor(5_000);

const ACCOUNTS_MEMORY_ID: u8 = 20;

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct Account {
    pub balance: Pence,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Storable for Account {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode Account"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode Account")
    }

    const BOUND: Bound = Bound::Bounded {
        max_size: 128,
        is_fixed_size: false,
    };
}

thread_local! {
    static ACCOUNTS: RefCell<StableBTreeMap<Principal, Account, Memory>> = RefCell::new(
        StableBTreeMap::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(ACCOUNTS_MEMORY_ID))),
        )
    );
}

/// Create the user's account if it does not exist yet. Called by the
/// directory at registration time.
pub fn create_account(ctx: &OperationContext, user: Principal) {
    let created = ACCOUNTS.with(|accounts| {
        let mut accounts = accounts.borrow_mut();
        if accounts.contains_key(&user) {
            return false;
        }
        accounts.insert(
            user,
            Account {
                balance: Pence::ZERO,
                created_at: ctx.now_ns,
                updated_at: ctx.now_ns,
            },
        );
        true
    });

    if created {
        audit::log_action(
            ctx,
            AuditAction::AccountCreated,
            EntityType::Account,
            Some(user.to_text()),
            None,
            Some(json!({ "balance": Pence::ZERO.to_string(), "currency": CURRENCY })),
            Severity::Info,
        );
    }
}

pub fn get_account(user: Principal) -> Option<Account> {
    ACCOUNTS.with(|accounts| accounts.borrow().get(&user))
}

pub fn require_account(user: Principal) -> Result<Account> {
    get_account(user).ok_or(Error::AccountNotFound(user))
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct BalanceView {
    pub balance: Pence,
    /// Headroom including the overdraft allowance.
    pub available_balance: Pence,
    pub currency: String,
}

pub fn get_balance(user: Principal) -> Result<BalanceView> {
    let account = require_account(user)?;
    Ok(BalanceView {
        balance: account.balance,
        available_balance: account
            .balance
            .checked_sub(MIN_BALANCE)
            .unwrap_or(Pence::ZERO),
        currency: CURRENCY.to_string(),
    })
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct LimitWarning {
    pub code: String,
    pub message: String,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct LimitCheck {
    pub valid: bool,
    pub new_balance: Pence,
    pub warnings: Vec<LimitWarning>,
    pub errors: Vec<ErrorBody>,
}

/// Evaluate a prospective balance change against the bounds without
/// mutating anything.
pub fn check_delta(balance: Pence, delta: Pence) -> LimitCheck {
    let mut check = LimitCheck {
        valid: true,
        new_balance: balance,
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    let new_balance = match balance.checked_add(delta) {
        Some(b) => b,
        None => {
            check.valid = false;
            check.errors.push(Error::InvalidAmount.into());
            return check;
        }
    };
    check.new_balance = new_balance;

    if new_balance < MIN_BALANCE {
        check.valid = false;
        check
            .errors
            .push(Error::InsufficientFunds { balance, change: delta }.into());
    }
    if new_balance > MAX_BALANCE {
        check.valid = false;
        check
            .errors
            .push(Error::BalanceLimitExceeded { balance, change: delta }.into());
    }

    if check.valid && delta.is_negative() {
        let warning_ceiling = MIN_BALANCE
            .checked_add(OVERDRAFT_WARNING_MARGIN)
            .expect("warning threshold in range");
        if new_balance <= warning_ceiling {
            check.warnings.push(LimitWarning {
                code: "APPROACHING_OVERDRAFT".to_string(),
                message: format!(
                    "Balance {} is within {} of the overdraft limit",
                    new_balance, OVERDRAFT_WARNING_MARGIN
                ),
            });
        }
    }

    check
}

/// The `ValidateLimits` operation: bounds verdict for a delta against the
/// user's live balance.
pub fn validate_limits(user: Principal, delta: Pence) -> Result<LimitCheck> {
    let account = require_account(user)?;
    Ok(check_delta(account.balance, delta))
}

/// Convert a failed check into the first domain error it recorded.
pub fn first_error(balance: Pence, delta: Pence, check: &LimitCheck) -> Error {
    match check.errors.first().map(|e| e.code.as_str()) {
        Some("BALANCE_LIMIT_EXCEEDED") => Error::BalanceLimitExceeded { balance, change: delta },
        Some("INVALID_AMOUNT") => Error::InvalidAmount,
        _ => Error::InsufficientFunds { balance, change: delta },
    }
}

/// Apply a validated delta. Callers must have run `check_delta` inside the
/// same message; the bounds are re-asserted here before the write lands.
pub(crate) fn apply_delta(ctx: &OperationContext, user: Principal, delta: Pence) -> Result<Pence> {
    ACCOUNTS.with(|accounts| {
        let mut accounts = accounts.borrow_mut();
        let mut account = accounts.get(&user).ok_or(Error::AccountNotFound(user))?;
        let old_balance = account.balance;
        let new_balance = old_balance.checked_add(delta).ok_or(Error::InvalidAmount)?;
        if new_balance < MIN_BALANCE {
            return Err(Error::InsufficientFunds { balance: old_balance, change: delta });
        }
        if new_balance > MAX_BALANCE {
            return Err(Error::BalanceLimitExceeded { balance: old_balance, change: delta });
        }
        account.balance = new_balance;
        account.updated_at = ctx.now_ns;
        accounts.insert(user, account);
        Ok(new_balance)
    })
}

/// Audit one applied balance change. Same message as the change itself.
pub(super) fn log_balance_change(
    ctx: &OperationContext,
    user: Principal,
    old_balance: Pence,
    new_balance: Pence,
    tx_id: Option<crate::context::EntityId>,
) {
    audit::log_action(
        ctx,
        AuditAction::AccountBalanceChanged,
        EntityType::Account,
        Some(user.to_text()),
        Some(json!({ "balance": old_balance.to_string() })),
        Some(json!({
            "balance": new_balance.to_string(),
            "transaction_id": tx_id.map(|id| id.to_string()),
        })),
        Severity::Info,
    );
}

/// Sum of all balances; the conservation checks in the tests lean on this.
pub fn total_balance() -> Pence {
    ACCOUNTS.with(|accounts| {
        accounts
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .fold(Pence::ZERO, |acc, (_, a)| {
                acc.checked_add(a.balance).expect("total balance in range")
            })
    })
}

pub fn account_count() -> u64 {
    ACCOUNTS.with(|accounts| accounts.borrow().len())
}
