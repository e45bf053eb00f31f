use std::collections::HashMap;

// Constants matching production (ledger::accounts)
const MIN_BALANCE: i64 = -25_000;
const MAX_BALANCE: i64 = 25_000;
const MAX_BULK_RECIPIENTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Transfer { from: u64, to: u64, amount: i64 },
    BulkTransfer { from: u64, recipients: Vec<(u64, i64)> },
    Contribute { user: u64, amount: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    Success,
    SelfTransfer,
    InvalidAmount,
    InsufficientFunds,
    LimitExceeded,
    TooManyRecipients,
}

/// Mirror of the production balance rules over plain maps. The real store
/// and the model must agree on every accept/reject decision that affects
/// money, so the invariant checks below catch both drift and outright
/// conservation bugs.
pub struct LedgerModel {
    // Balances in pence - mirrors the accounts table
    pub balances: HashMap<u64, i64>,

    // Sum of accepted contributions - mirrors derived pool totals
    pub pool_escrow: i64,

    // Fixed point for the conservation check
    pub total_system_funds: i64,

    pub operation_count: u64,
}

impl LedgerModel {
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
            pool_escrow: 0,
            total_system_funds: 0,
            operation_count: 0,
        }
    }

    /// Seed users 0..n with the same in-bounds opening balance.
    pub fn with_users(n: u64, opening_pence: i64) -> Self {
        assert!((MIN_BALANCE..=MAX_BALANCE).contains(&opening_pence));
        let mut model = Self::new();
        for user in 0..n {
            model.balances.insert(user, opening_pence);
            model.total_system_funds += opening_pence;
        }
        model
    }

    /// THE CORE INVARIANT
    /// Must hold after ANY sequence of operations.
    pub fn check_conservation(&self) -> Result<(), String> {
        let user_sum: i64 = self.balances.values().sum();
        let calculated = user_sum + self.pool_escrow;
        if calculated != self.total_system_funds {
            return Err(format!(
                "CONSERVATION VIOLATION: users({}) + escrow({}) = {} != total({})",
                user_sum, self.pool_escrow, calculated, self.total_system_funds
            ));
        }
        Ok(())
    }

    /// Every balance stays inside [MIN_BALANCE, MAX_BALANCE].
    pub fn check_bounds(&self) -> Result<(), String> {
        for (user, balance) in &self.balances {
            if !(MIN_BALANCE..=MAX_BALANCE).contains(balance) {
                return Err(format!(
                    "BOUNDS VIOLATION: user {} at {} pence",
                    user, balance
                ));
            }
        }
        Ok(())
    }

    pub fn execute(&mut self, op: Operation) -> OpResult {
        self.operation_count += 1;
        match op {
            Operation::Transfer { from, to, amount } => self.transfer(from, to, amount),
            Operation::BulkTransfer { from, recipients } => self.bulk_transfer(from, recipients),
            Operation::Contribute { user, amount } => self.contribute(user, amount),
        }
    }

    fn balance(&self, user: u64) -> i64 {
        *self.balances.get(&user).unwrap_or(&0)
    }

    fn transfer(&mut self, from: u64, to: u64, amount: i64) -> OpResult {
        if from == to {
            return OpResult::SelfTransfer;
        }
        if amount <= 0 {
            return OpResult::InvalidAmount;
        }
        let sender_after = self.balance(from) - amount;
        let recipient_after = self.balance(to) + amount;
        if sender_after < MIN_BALANCE {
            return OpResult::InsufficientFunds;
        }
        if recipient_after > MAX_BALANCE {
            return OpResult::LimitExceeded;
        }
        self.balances.insert(from, sender_after);
        self.balances.insert(to, recipient_after);
        OpResult::Success
    }

    fn bulk_transfer(&mut self, from: u64, recipients: Vec<(u64, i64)>) -> OpResult {
        if recipients.is_empty() {
            return OpResult::InvalidAmount;
        }
        if recipients.len() > MAX_BULK_RECIPIENTS {
            return OpResult::TooManyRecipients;
        }
        let mut total = 0i64;
        for (to, amount) in &recipients {
            if *to == from {
                return OpResult::SelfTransfer;
            }
            if *amount <= 0 {
                return OpResult::InvalidAmount;
            }
            total += amount;
        }
        if self.balance(from) - total < MIN_BALANCE {
            return OpResult::InsufficientFunds;
        }

        // Aggregate credits per recipient before the ceiling check, exactly
        // as production does.
        let mut aggregate: HashMap<u64, i64> = HashMap::new();
        for (to, amount) in &recipients {
            *aggregate.entry(*to).or_insert(0) += amount;
        }
        for (to, credit) in &aggregate {
            if self.balance(*to) + credit > MAX_BALANCE {
                return OpResult::LimitExceeded;
            }
        }

        // All-or-nothing apply.
        *self.balances.entry(from).or_insert(0) -= total;
        for (to, amount) in recipients {
            *self.balances.entry(to).or_insert(0) += amount;
        }
        OpResult::Success
    }

    fn contribute(&mut self, user: u64, amount: i64) -> OpResult {
        if amount <= 0 {
            return OpResult::InvalidAmount;
        }
        let after = self.balance(user) - amount;
        if after < MIN_BALANCE {
            return OpResult::InsufficientFunds;
        }
        self.balances.insert(user, after);
        self.pool_escrow += amount;
        OpResult::Success
    }
}

impl Default for LedgerModel {
    fn default() -> Self {
        Self::new()
    }
}
