//! Cash-wire transactional core.
//!
//! Employee-to-employee payments: a bounded-balance ledger, money-request
//! and event-pool state machines, and an append-only audit trail, all living
//! in stable memory behind a single canister. Every mutating endpoint is a
//! synchronous update call, so each operation commits atomically and in
//! isolation; the gateway in front handles identity, transport, and
//! rendering.

use candid::Principal;
use ic_cdk::{init, post_upgrade, pre_upgrade, query, update};
use ic_stable_structures::memory_manager::{MemoryManager, VirtualMemory};
use ic_stable_structures::DefaultMemoryImpl;
use std::cell::RefCell;
use std::time::Duration;

pub mod amount;
pub mod audit;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod notify;
pub mod requests;

#[cfg(test)]
mod tests;

use amount::Pence;
use audit::{AuditPage, AuditQuery, AuditReport, CleanupReport, IntegrityReport, ReportKind};
use context::{EntityId, OperationContext, RequestMeta};
use directory::{UserProfile, UserRole, UserStatus};
use error::{Error, ErrorBody};
use events::{CloseOutcome, ContributionOutcome, EventStatus, EventView};
use guard::OperationGuard;
use ledger::{
    BalanceView, BulkErrorBody, BulkOutcome, BulkRecipientInput, HistoryFilter, LimitCheck,
    Transaction, TransactionPage, TransferOutcome, TxStatistics,
};
use notify::Notification;
use requests::{MoneyRequest, RequestStatistics, RequestStatus, RequestView, RespondOutcome};

// ============================================================================
// MEMORY MANAGEMENT
// ============================================================================

pub type Memory = VirtualMemory<DefaultMemoryImpl>;

thread_local! {
    pub static MEMORY_MANAGER: RefCell<MemoryManager<DefaultMemoryImpl>> =
        RefCell::new(MemoryManager::init(DefaultMemoryImpl::default()));
}

// ============================================================================
// OPERATIONAL VALUES
// ============================================================================

/// Enforced by the gateway, surfaced here so both sides agree on it.
pub const SESSION_TIMEOUT_HOURS: u64 = 8;

const EXPIRY_SWEEP_SECS: u64 = 3_600;
const REMINDER_SWEEP_SECS: u64 = 6 * 3_600;
const NOTIFICATION_PURGE_SECS: u64 = 24 * 3_600;
const DEADLINE_REMINDER_HOURS: u64 = 24;

#[derive(candid::CandidType, candid::Deserialize, Clone, Debug)]
pub struct OperationalLimits {
    pub currency: String,
    pub min_balance: Pence,
    pub max_balance: Pence,
    pub overdraft_warning_threshold: Pence,
    pub max_bulk_recipients: u64,
    pub request_default_expiry_days: u32,
    pub request_max_expiry_days: u32,
    pub audit_retention_days: u64,
    pub session_timeout_hours: u64,
}

#[query]
fn operational_limits() -> OperationalLimits {
    OperationalLimits {
        currency: amount::CURRENCY.to_string(),
        min_balance: ledger::MIN_BALANCE,
        max_balance: ledger::MAX_BALANCE,
        overdraft_warning_threshold: ledger::OVERDRAFT_WARNING_MARGIN,
        max_bulk_recipients: ledger::MAX_BULK_RECIPIENTS as u64,
        request_default_expiry_days: requests::DEFAULT_EXPIRY_DAYS,
        request_max_expiry_days: requests::MAX_EXPIRY_DAYS,
        audit_retention_days: audit::RETENTION_DAYS,
        session_timeout_hours: SESSION_TIMEOUT_HOURS,
    }
}

// ============================================================================
// LIFECYCLE HOOKS
// ============================================================================

fn start_timers() {
    ic_cdk_timers::set_timer_interval(Duration::from_secs(EXPIRY_SWEEP_SECS), || async move {
        requests::expire_due(ic_cdk::api::time());
    });
    ic_cdk_timers::set_timer_interval(Duration::from_secs(REMINDER_SWEEP_SECS), || async move {
        let now = ic_cdk::api::time();
        for event in events::deadline_approaching(now, DEADLINE_REMINDER_HOURS) {
            notify::deadline_approaching(now, &event);
        }
    });
    ic_cdk_timers::set_timer_interval(Duration::from_secs(NOTIFICATION_PURGE_SECS), || async move {
        notify::purge_expired(ic_cdk::api::time());
    });
}

#[init]
fn canister_init() {
    ic_cdk::println!("Cash-wire core initialized");
    start_timers();
}

#[pre_upgrade]
fn canister_pre_upgrade() {
    // Stable structures persist on their own.
    ic_cdk::println!("Pre-upgrade: state persists automatically");
}

#[post_upgrade]
fn canister_post_upgrade() {
    start_timers();
    ic_cdk::println!("Post-upgrade: timers restarted");
}

// ============================================================================
// HELPERS
// ============================================================================

fn parse_amount(raw: &str) -> Result<Pence, Error> {
    raw.parse::<Pence>().map_err(|_| Error::InvalidAmount)
}

fn require_auditor(caller: Principal) -> Result<(), Error> {
    if config::is_admin(caller) || directory::is_admin_or_finance(caller) {
        Ok(())
    } else {
        Err(Error::NotAuthorized)
    }
}

// ============================================================================
// ADMIN & DIRECTORY ENDPOINTS
// ============================================================================

#[update]
fn set_admin(new_admin: Principal) -> Result<(), ErrorBody> {
    config::set_admin(ic_cdk::api::msg_caller(), new_admin).map_err(ErrorBody::from)
}

#[query]
fn get_admin() -> Option<Principal> {
    config::get_admin_principal()
}

#[update]
fn register_user(
    user: Principal,
    email: String,
    name: String,
    role: UserRole,
    meta: Option<RequestMeta>,
) -> Result<UserProfile, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    directory::register_user(&ctx, user, email, name, role).map_err(ErrorBody::from)
}

#[update]
fn set_user_status(
    user: Principal,
    status: UserStatus,
    meta: Option<RequestMeta>,
) -> Result<UserProfile, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    directory::set_user_status(&ctx, user, status).map_err(ErrorBody::from)
}

#[query]
fn get_user(user: Principal) -> Option<UserProfile> {
    directory::profile(user)
}

#[query]
fn list_users(offset: u64, limit: u64) -> Vec<UserProfile> {
    directory::list_users(offset, limit)
}

// ============================================================================
// LEDGER ENDPOINTS
// ============================================================================

#[query]
fn get_balance(user: Principal) -> Result<BalanceView, ErrorBody> {
    ledger::get_balance(user).map_err(ErrorBody::from)
}

#[query]
fn get_my_balance() -> Result<BalanceView, ErrorBody> {
    ledger::get_balance(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)
}

/// Dry-run a balance change: bounds verdict plus advisory warnings.
#[query]
fn validate_limits(user: Principal, delta: String) -> Result<LimitCheck, ErrorBody> {
    let delta = delta.parse::<Pence>().map_err(|_| ErrorBody::from(Error::InvalidAmount))?;
    ledger::validate_limits(user, delta).map_err(ErrorBody::from)
}

#[update]
fn transfer(
    recipient: Principal,
    amount: String,
    category: Option<String>,
    note: Option<String>,
    meta: Option<RequestMeta>,
) -> Result<TransferOutcome, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    let amount = parse_amount(&amount).map_err(ErrorBody::from)?;
    ledger::transfer(&ctx, recipient, amount, category, note).map_err(ErrorBody::from)
}

#[derive(candid::CandidType, candid::Deserialize, Clone, Debug)]
pub struct BulkRecipientArg {
    pub recipient: Principal,
    pub amount: String,
    pub category: Option<String>,
    pub note: Option<String>,
}

#[update]
fn bulk_transfer(
    items: Vec<BulkRecipientArg>,
    meta: Option<RequestMeta>,
) -> Result<BulkOutcome, BulkErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(|e| BulkErrorBody {
        failed_index: None,
        error: e.into(),
    })?;

    let mut parsed = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let amount = parse_amount(&item.amount).map_err(|e| BulkErrorBody {
            failed_index: Some(i as u32),
            error: e.into(),
        })?;
        parsed.push(BulkRecipientInput {
            recipient: item.recipient,
            amount,
            category: item.category,
            note: item.note,
        });
    }
    ledger::bulk_transfer(&ctx, parsed).map_err(BulkErrorBody::from)
}

#[query]
fn get_transaction(tx_id: EntityId) -> Result<Transaction, ErrorBody> {
    ledger::get_transaction(ic_cdk::api::msg_caller(), tx_id).map_err(ErrorBody::from)
}

#[query]
fn transaction_history(filter: HistoryFilter) -> TransactionPage {
    ledger::history_for_user(ic_cdk::api::msg_caller(), &filter)
}

#[query]
fn recent_transactions(limit: u64) -> Vec<Transaction> {
    ledger::recent_for_user(ic_cdk::api::msg_caller(), limit)
}

#[query]
fn transaction_statistics(days: u64) -> TxStatistics {
    ledger::statistics_for_user(ic_cdk::api::msg_caller(), ic_cdk::api::time(), days)
}

#[query]
fn account_summary() -> Result<ledger::AccountSummary, ErrorBody> {
    ledger::account_summary(ic_cdk::api::msg_caller(), ic_cdk::api::time())
        .map_err(ErrorBody::from)
}

// ============================================================================
// MONEY REQUEST ENDPOINTS
// ============================================================================

#[update]
fn create_money_request(
    payer: Principal,
    amount: String,
    note: Option<String>,
    expires_in_days: Option<u32>,
    meta: Option<RequestMeta>,
) -> Result<MoneyRequest, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    let amount = parse_amount(&amount).map_err(ErrorBody::from)?;
    requests::create(&ctx, payer, amount, note, expires_in_days).map_err(ErrorBody::from)
}

#[update]
fn respond_to_request(
    request_id: EntityId,
    approve: bool,
    meta: Option<RequestMeta>,
) -> Result<RespondOutcome, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    requests::respond(&ctx, request_id, approve).map_err(ErrorBody::from)
}

#[update]
fn cancel_money_request(
    request_id: EntityId,
    meta: Option<RequestMeta>,
) -> Result<MoneyRequest, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    requests::cancel(&ctx, request_id).map_err(ErrorBody::from)
}

/// Manual trigger for the expiry sweep; the hourly timer runs the same code.
#[update]
fn expire_due_requests() -> u64 {
    requests::expire_due(ic_cdk::api::time())
}

#[query]
fn get_money_request(request_id: EntityId) -> Result<RequestView, ErrorBody> {
    requests::get_request(ic_cdk::api::msg_caller(), request_id, ic_cdk::api::time())
        .map_err(ErrorBody::from)
}

#[query]
fn pending_requests() -> Vec<MoneyRequest> {
    requests::pending_for_payer(ic_cdk::api::msg_caller(), ic_cdk::api::time())
}

#[query]
fn sent_requests(status: Option<RequestStatus>, offset: u64, limit: u64) -> Vec<RequestView> {
    requests::sent_by(
        ic_cdk::api::msg_caller(),
        status,
        ic_cdk::api::time(),
        offset,
        limit,
    )
}

#[query]
fn received_requests(status: Option<RequestStatus>, offset: u64, limit: u64) -> Vec<RequestView> {
    requests::received_by(
        ic_cdk::api::msg_caller(),
        status,
        ic_cdk::api::time(),
        offset,
        limit,
    )
}

#[query]
fn request_statistics() -> RequestStatistics {
    requests::statistics_for_user(ic_cdk::api::msg_caller(), ic_cdk::api::time())
}

// ============================================================================
// EVENT POOL ENDPOINTS
// ============================================================================

#[update]
fn create_event(
    name: String,
    description: String,
    target_amount: Option<String>,
    deadline: Option<u64>,
    meta: Option<RequestMeta>,
) -> Result<events::EventPool, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    let target_amount = match target_amount {
        Some(raw) => Some(parse_amount(&raw).map_err(ErrorBody::from)?),
        None => None,
    };
    events::create(&ctx, name, description, target_amount, deadline).map_err(ErrorBody::from)
}

#[update]
fn contribute_to_event(
    event_id: EntityId,
    amount: String,
    note: Option<String>,
    meta: Option<RequestMeta>,
) -> Result<ContributionOutcome, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    let amount = parse_amount(&amount).map_err(ErrorBody::from)?;
    events::contribute(&ctx, event_id, amount, note).map_err(ErrorBody::from)
}

#[update]
fn close_event(event_id: EntityId, meta: Option<RequestMeta>) -> Result<CloseOutcome, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    events::close(&ctx, event_id).map_err(ErrorBody::from)
}

#[update]
fn cancel_event(
    event_id: EntityId,
    meta: Option<RequestMeta>,
) -> Result<events::EventPool, ErrorBody> {
    let ctx = OperationContext::capture(meta);
    let _guard = OperationGuard::acquire(ctx.caller).map_err(ErrorBody::from)?;
    events::cancel(&ctx, event_id).map_err(ErrorBody::from)
}

#[query]
fn get_event(event_id: EntityId) -> Option<EventView> {
    events::view(event_id)
}

#[query]
fn active_events(offset: u64, limit: u64) -> Vec<EventView> {
    events::active_events(offset, limit)
}

#[query]
fn events_by_creator(
    creator: Principal,
    status: Option<EventStatus>,
    offset: u64,
    limit: u64,
) -> Vec<EventView> {
    events::events_by_creator(creator, status, offset, limit)
}

#[query]
fn event_contributions(event_id: EntityId) -> Vec<events::ContributionView> {
    events::contributions(event_id)
}

#[query]
fn search_events(term: String, status: Option<EventStatus>, offset: u64, limit: u64) -> Vec<EventView> {
    events::search(&term, status, offset, limit)
}

#[query]
fn event_statistics() -> events::EventStatistics {
    events::statistics()
}

#[query]
fn my_contributions() -> Vec<(EntityId, Pence)> {
    events::user_contributions(ic_cdk::api::msg_caller())
}

// ============================================================================
// AUDIT ENDPOINTS
// ============================================================================

#[query]
fn audit_entries(query: AuditQuery) -> Result<AuditPage, ErrorBody> {
    require_auditor(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)?;
    Ok(audit::query_entries(&query))
}

#[query]
fn audit_entry_count() -> Result<u64, ErrorBody> {
    require_auditor(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)?;
    Ok(audit::entry_count())
}

#[update]
fn audit_cleanup(retention_days: Option<u64>) -> Result<CleanupReport, ErrorBody> {
    require_auditor(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)?;
    Ok(audit::cleanup_older_than(
        ic_cdk::api::time(),
        retention_days.unwrap_or(audit::RETENTION_DAYS),
    ))
}

#[query]
fn verify_audit_integrity() -> Result<IntegrityReport, ErrorBody> {
    require_auditor(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)?;
    Ok(audit::verify_integrity())
}

#[query]
fn audit_report(kind: ReportKind, start_ns: u64, end_ns: u64) -> Result<AuditReport, ErrorBody> {
    require_auditor(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)?;
    Ok(audit::generate_report(kind, start_ns, end_ns))
}

#[query]
fn audit_daily_activity(days: u64) -> Result<Vec<(u64, u64)>, ErrorBody> {
    require_auditor(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)?;
    Ok(audit::daily_activity(ic_cdk::api::time(), days))
}

// ============================================================================
// NOTIFICATION ENDPOINTS
// ============================================================================

#[query]
fn my_notifications(unread_only: bool, offset: u64, limit: u64) -> Vec<Notification> {
    notify::list_for_user(ic_cdk::api::msg_caller(), unread_only, offset, limit)
}

#[query]
fn my_unread_count() -> u64 {
    notify::unread_count(ic_cdk::api::msg_caller())
}

#[update]
fn mark_notification_read(notification_id: EntityId) -> Result<(), ErrorBody> {
    notify::mark_read(ic_cdk::api::msg_caller(), notification_id).map_err(ErrorBody::from)
}

#[update]
fn mark_all_notifications_read() -> u64 {
    notify::mark_all_read(ic_cdk::api::msg_caller())
}

/// Manual trigger for the daily purge timer.
#[update]
fn purge_expired_notifications() -> Result<u64, ErrorBody> {
    require_auditor(ic_cdk::api::msg_caller()).map_err(ErrorBody::from)?;
    Ok(notify::purge_expired(ic_cdk::api::time()))
}
