//! The ledger: sole mutator of account balances.
//!
//! Every operation here runs start to finish inside one update message with
//! no await points, so precondition reads, balance mutations, the
//! transaction record, and the audit entries land together or not at all.
//! A rejected movement still commits: as a FAILED transaction plus its
//! TRANSACTION_FAILED audit entry, with no balance change.

pub mod accounts;
pub mod transactions;

pub use accounts::{
    get_balance, validate_limits, Account, BalanceView, LimitCheck, LimitWarning, MAX_BALANCE,
    MIN_BALANCE, OVERDRAFT_WARNING_MARGIN,
};
pub use transactions::{
    contributions_by_user, contributions_for_event, history_for_user, recent_for_user,
    statistics_for_user, HistoryFilter, Transaction, TransactionPage, TxKind, TxStatistics,
    TxStatus, MAX_CATEGORY_LEN, MAX_NOTE_LEN,
};

use candid::{CandidType, Deserialize, Principal};
use serde_json::json;

use crate::amount::Pence;
use crate::audit::{self, AuditAction, EntityType, Severity};
use crate::context::{EntityId, OperationContext};
use crate::directory;
use crate::error::{Error, ErrorBody, Result};
use crate::notify;

/// Upper bound on recipients in one bulk transfer.
pub const MAX_BULK_RECIPIENTS: usize = 50;

pub(crate) fn create_account(ctx: &OperationContext, user: Principal) {
    accounts::create_account(ctx, user);
}

fn validate_note(note: &Option<String>) -> Result<()> {
    if let Some(note) = note {
        if note.len() > MAX_NOTE_LEN {
            return Err(Error::Validation(format!(
                "Note cannot exceed {} characters",
                MAX_NOTE_LEN
            )));
        }
    }
    Ok(())
}

fn validate_category(category: &Option<String>) -> Result<()> {
    if let Some(category) = category {
        if category.len() > MAX_CATEGORY_LEN {
            return Err(Error::Validation(format!(
                "Category cannot exceed {} characters",
                MAX_CATEGORY_LEN
            )));
        }
    }
    Ok(())
}

/// Persist a FAILED transaction plus its audit entry, then hand back the
/// domain error. No balances move on this path.
fn record_failure(ctx: &OperationContext, mut tx: Transaction, error: Error) -> Error {
    tx.status = TxStatus::Failed;
    tx.processed_at = Some(ctx.now_ns);
    let payload = {
        let mut value = tx.to_json();
        value["error_code"] = json!(error.code());
        value
    };
    let tx_id = transactions::insert(tx);
    audit::log_action(
        ctx,
        AuditAction::TransactionFailed,
        EntityType::Transaction,
        Some(tx_id.to_string()),
        None,
        Some(payload),
        Severity::Warning,
    );
    error
}

// ---------------------------------------------------------------------------
// Peer transfer
// ---------------------------------------------------------------------------

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct TransferOutcome {
    pub tx: Transaction,
    pub sender_balance: Pence,
    pub recipient_balance: Pence,
    pub warnings: Vec<LimitWarning>,
}

/// Move `amount` from the caller to `recipient`.
pub fn transfer(
    ctx: &OperationContext,
    recipient: Principal,
    amount: Pence,
    category: Option<String>,
    note: Option<String>,
) -> Result<TransferOutcome> {
    let sender = ctx.caller;

    if !amount.is_positive() {
        return Err(Error::InvalidAmount);
    }
    validate_note(&note)?;
    validate_category(&category)?;
    if sender == recipient {
        return Err(Error::SelfTransfer);
    }

    let sender_record = directory::require_active(sender)?;
    let recipient_record = directory::require_active(recipient)?;

    let sender_account = accounts::require_account(sender)?;
    let recipient_account = accounts::require_account(recipient)?;

    let debit = amount.checked_neg().ok_or(Error::InvalidAmount)?;
    let sender_check = accounts::check_delta(sender_account.balance, debit);
    let recipient_check = accounts::check_delta(recipient_account.balance, amount);

    let tx = Transaction {
        id: ctx.fresh_id(),
        sender,
        kind: TxKind::Transfer { recipient },
        amount,
        category,
        note,
        status: TxStatus::Completed,
        created_at: ctx.now_ns,
        processed_at: None,
    };

    if !sender_check.valid {
        let error = accounts::first_error(sender_account.balance, debit, &sender_check);
        return Err(record_failure(ctx, tx, error));
    }
    if !recipient_check.valid {
        let error = accounts::first_error(recipient_account.balance, amount, &recipient_check);
        return Err(record_failure(ctx, tx, error));
    }

    // Both sides validated against live balances; mutate, record, audit.
    let sender_balance = accounts::apply_delta(ctx, sender, debit)?;
    let recipient_balance = accounts::apply_delta(ctx, recipient, amount)?;

    let mut tx = tx;
    tx.processed_at = Some(ctx.now_ns);
    let tx_id = transactions::insert(tx.clone());

    accounts::log_balance_change(ctx, sender, sender_account.balance, sender_balance, Some(tx_id));
    accounts::log_balance_change(
        ctx,
        recipient,
        recipient_account.balance,
        recipient_balance,
        Some(tx_id),
    );
    audit::log_action(
        ctx,
        AuditAction::TransactionCreated,
        EntityType::Transaction,
        Some(tx_id.to_string()),
        None,
        Some(tx.to_json()),
        Severity::Info,
    );

    // Outbox writes happen after the business state is in place; a failed
    // emit is audited and does not undo the transfer.
    notify::transfer_completed(ctx, &tx, &sender_record.name, &recipient_record.name);

    let mut warnings = sender_check.warnings;
    warnings.extend(recipient_check.warnings);

    Ok(TransferOutcome {
        tx,
        sender_balance,
        recipient_balance,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Bulk transfer
// ---------------------------------------------------------------------------

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct BulkRecipientInput {
    pub recipient: Principal,
    pub amount: Pence,
    pub category: Option<String>,
    pub note: Option<String>,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct BulkItemOutcome {
    pub tx_id: EntityId,
    pub recipient: Principal,
    pub amount: Pence,
    pub recipient_balance: Pence,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct BulkOutcome {
    pub results: Vec<BulkItemOutcome>,
    pub total_amount: Pence,
    pub sender_balance: Pence,
    pub warnings: Vec<LimitWarning>,
}

/// A bulk rejection names the first offending recipient when one exists;
/// sender-side failures carry no index.
#[derive(Clone, Debug)]
pub struct BulkTransferError {
    pub index: Option<u32>,
    pub error: Error,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct BulkErrorBody {
    pub failed_index: Option<u32>,
    pub error: ErrorBody,
}

impl From<BulkTransferError> for BulkErrorBody {
    fn from(err: BulkTransferError) -> Self {
        BulkErrorBody {
            failed_index: err.index,
            error: err.error.into(),
        }
    }
}

fn bulk_reject(
    ctx: &OperationContext,
    items: &[BulkRecipientInput],
    index: Option<u32>,
    error: Error,
) -> BulkTransferError {
    audit::log_action(
        ctx,
        AuditAction::TransactionFailed,
        EntityType::Transaction,
        None,
        None,
        Some(json!({
            "operation": "BULK_TRANSFER",
            "recipient_count": items.len(),
            "failed_index": index,
            "error_code": error.code(),
        })),
        Severity::Warning,
    );
    BulkTransferError { index, error }
}

/// All-or-nothing fan-out transfer: every sub-transfer lands or none do.
pub fn bulk_transfer(
    ctx: &OperationContext,
    items: Vec<BulkRecipientInput>,
) -> std::result::Result<BulkOutcome, BulkTransferError> {
    let sender = ctx.caller;
    let fail = |index: Option<u32>, error: Error| BulkTransferError { index, error };

    if items.is_empty() {
        return Err(fail(None, Error::Validation("No recipients specified".to_string())));
    }
    if items.len() > MAX_BULK_RECIPIENTS {
        return Err(fail(None, Error::TooManyRecipients { count: items.len() }));
    }

    directory::require_active(sender).map_err(|e| fail(None, e))?;
    let sender_account = accounts::require_account(sender).map_err(|e| fail(None, e))?;

    // Shape validation per recipient, before anything is recorded.
    for (i, item) in items.iter().enumerate() {
        let at = |e| fail(Some(i as u32), e);
        if item.recipient == sender {
            return Err(at(Error::SelfTransfer));
        }
        if !item.amount.is_positive() {
            return Err(at(Error::InvalidAmount));
        }
        validate_note(&item.note).map_err(at)?;
        validate_category(&item.category).map_err(at)?;
        directory::require_active(item.recipient).map_err(at)?;
        accounts::require_account(item.recipient).map_err(at)?;
    }

    let total = Pence::checked_sum(items.iter().map(|i| i.amount))
        .ok_or_else(|| fail(None, Error::InvalidAmount))?;
    let total_debit = total.checked_neg().ok_or_else(|| fail(None, Error::InvalidAmount))?;

    // Sender is validated once against the full total.
    let sender_check = accounts::check_delta(sender_account.balance, total_debit);
    if !sender_check.valid {
        let error = accounts::first_error(sender_account.balance, total_debit, &sender_check);
        return Err(bulk_reject(ctx, &items, None, error));
    }

    // Recipients are validated against their aggregate credit, so listing a
    // recipient twice cannot sneak past the ceiling in two small steps.
    let mut aggregate: Vec<(Principal, Pence, u32)> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match aggregate.iter_mut().find(|(p, _, _)| *p == item.recipient) {
            Some((_, sum, _)) => {
                *sum = match sum.checked_add(item.amount) {
                    Some(s) => s,
                    None => return Err(fail(Some(i as u32), Error::InvalidAmount)),
                };
            }
            None => aggregate.push((item.recipient, item.amount, i as u32)),
        }
    }
    for (recipient, credit, first_index) in &aggregate {
        let account = accounts::require_account(*recipient)
            .map_err(|e| fail(Some(*first_index), e))?;
        let check = accounts::check_delta(account.balance, *credit);
        if !check.valid {
            let error = accounts::first_error(account.balance, *credit, &check);
            return Err(bulk_reject(ctx, &items, Some(*first_index), error));
        }
    }

    // Everything validated: apply the whole batch.
    let sender_balance = accounts::apply_delta(ctx, sender, total_debit)
        .map_err(|e| fail(None, e))?;
    accounts::log_balance_change(ctx, sender, sender_account.balance, sender_balance, None);

    let mut results = Vec::with_capacity(items.len());
    let mut tx_ids = Vec::with_capacity(items.len());
    for item in items {
        let before = accounts::require_account(item.recipient)
            .map_err(|e| fail(None, e))?
            .balance;
        let recipient_balance = accounts::apply_delta(ctx, item.recipient, item.amount)
            .map_err(|e| fail(None, e))?;

        let tx = Transaction {
            id: ctx.fresh_id(),
            sender,
            kind: TxKind::Transfer { recipient: item.recipient },
            amount: item.amount,
            category: item.category,
            note: item.note,
            status: TxStatus::Completed,
            created_at: ctx.now_ns,
            processed_at: Some(ctx.now_ns),
        };
        let tx_id = transactions::insert(tx.clone());
        tx_ids.push(tx_id);

        accounts::log_balance_change(ctx, item.recipient, before, recipient_balance, Some(tx_id));
        audit::log_action(
            ctx,
            AuditAction::TransactionCreated,
            EntityType::Transaction,
            Some(tx_id.to_string()),
            None,
            Some(tx.to_json()),
            Severity::Info,
        );
        notify::bulk_recipient_credited(ctx, &tx);

        results.push(BulkItemOutcome {
            tx_id,
            recipient: tx.recipient().expect("bulk transactions are transfers"),
            amount: tx.amount,
            recipient_balance,
        });
    }

    audit::log_action(
        ctx,
        AuditAction::BulkTransferCompleted,
        EntityType::Transaction,
        None,
        None,
        Some(json!({
            "transaction_ids": tx_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            "recipient_count": results.len(),
            "total_amount": total.to_string(),
        })),
        Severity::Info,
    );
    notify::bulk_completed(ctx, sender, results.len(), total);

    Ok(BulkOutcome {
        results,
        total_amount: total,
        sender_balance,
        warnings: sender_check.warnings,
    })
}

// ---------------------------------------------------------------------------
// Event contribution debit
// ---------------------------------------------------------------------------

/// Debit the caller for a pool contribution. Pool-side preconditions are the
/// event module's business; this records the money movement.
pub(crate) fn record_contribution(
    ctx: &OperationContext,
    event_id: EntityId,
    amount: Pence,
    note: Option<String>,
) -> Result<(Transaction, Pence)> {
    let contributor = ctx.caller;

    if !amount.is_positive() {
        return Err(Error::InvalidAmount);
    }
    validate_note(&note)?;
    directory::require_active(contributor)?;
    let account = accounts::require_account(contributor)?;

    let debit = amount.checked_neg().ok_or(Error::InvalidAmount)?;
    let check = accounts::check_delta(account.balance, debit);

    let tx = Transaction {
        id: ctx.fresh_id(),
        sender: contributor,
        kind: TxKind::EventContribution { event_id },
        amount,
        category: Some("Event Contribution".to_string()),
        note,
        status: TxStatus::Completed,
        created_at: ctx.now_ns,
        processed_at: None,
    };

    if !check.valid {
        let error = accounts::first_error(account.balance, debit, &check);
        return Err(record_failure(ctx, tx, error));
    }

    let new_balance = accounts::apply_delta(ctx, contributor, debit)?;

    let mut tx = tx;
    tx.processed_at = Some(ctx.now_ns);
    let tx_id = transactions::insert(tx.clone());

    accounts::log_balance_change(ctx, contributor, account.balance, new_balance, Some(tx_id));
    audit::log_action(
        ctx,
        AuditAction::TransactionCreated,
        EntityType::Transaction,
        Some(tx_id.to_string()),
        None,
        Some(tx.to_json()),
        Severity::Info,
    );

    Ok((tx, new_balance))
}

// ---------------------------------------------------------------------------
// Gated reads
// ---------------------------------------------------------------------------

/// Fetch one transaction; only participants and elevated roles may read it.
pub fn get_transaction(caller: Principal, tx_id: EntityId) -> Result<Transaction> {
    let tx = transactions::get(tx_id)
        .filter(|tx| tx.involves(caller) || directory::is_admin_or_finance(caller));
    tx.ok_or_else(|| Error::Validation("Transaction not found or access denied".to_string()))
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct RecentActivity {
    pub period_days: u64,
    pub total_sent: Pence,
    pub total_received: Pence,
    pub net_change: Pence,
    pub transaction_count: u64,
    pub transfer_count: u64,
    pub event_contribution_count: u64,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct AccountSummary {
    pub user_id: Principal,
    pub balance: Pence,
    pub available_balance: Pence,
    pub currency: String,
    pub minimum_balance: Pence,
    pub maximum_balance: Pence,
    pub recent_activity: RecentActivity,
    pub warnings: Vec<LimitWarning>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// One-stop account read: balance, bounds, a 30-day activity digest, and
/// advisory warnings about a low or overdrawn balance.
pub fn account_summary(user: Principal, now_ns: u64) -> Result<AccountSummary> {
    const PERIOD_DAYS: u64 = 30;

    let account = accounts::require_account(user)?;
    let view = accounts::get_balance(user)?;

    let mut transfer_count = 0u64;
    let mut contribution_count = 0u64;
    let stats = transactions::statistics_for_user(user, now_ns, PERIOD_DAYS);
    for tx in transactions::history_for_user(
        user,
        &HistoryFilter {
            from_ns: Some(now_ns.saturating_sub(PERIOD_DAYS * crate::context::NANOS_PER_DAY)),
            completed_only: true,
            limit: Some(200),
            ..Default::default()
        },
    )
    .transactions
    {
        match tx.kind {
            TxKind::Transfer { .. } => transfer_count += 1,
            TxKind::EventContribution { .. } => {
                if tx.sender == user {
                    contribution_count += 1;
                }
            }
        }
    }

    let mut warnings = Vec::new();
    if account.balance <= OVERDRAFT_WARNING_MARGIN {
        warnings.push(LimitWarning {
            code: "LOW_BALANCE".to_string(),
            message: format!("Account balance is low: {}", account.balance),
        });
    }
    if account.balance.is_negative() {
        warnings.push(LimitWarning {
            code: "OVERDRAFT".to_string(),
            message: format!("Account is in overdraft: {}", account.balance),
        });
    }

    Ok(AccountSummary {
        user_id: user,
        balance: account.balance,
        available_balance: view.available_balance,
        currency: view.currency,
        minimum_balance: MIN_BALANCE,
        maximum_balance: MAX_BALANCE,
        recent_activity: RecentActivity {
            period_days: PERIOD_DAYS,
            total_sent: stats.total_sent,
            total_received: stats.total_received,
            net_change: stats
                .total_received
                .checked_sub(stats.total_sent)
                .unwrap_or(Pence::ZERO),
            transaction_count: stats.sent_count + stats.received_count,
            transfer_count,
            event_contribution_count: contribution_count,
        },
        warnings,
        created_at: account.created_at,
        updated_at: account.updated_at,
    })
}
