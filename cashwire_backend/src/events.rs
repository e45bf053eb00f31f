//! Event pools: collective funding accounts.
//!
//! A pool never holds a balance column. Its total is always derived from
//! the COMPLETED contribution transactions that reference it, so the ledger
//! stays the single source of monetary truth. Lifecycle is
//! ACTIVE -> {CLOSED, CANCELLED}, both terminal; disbursement after closure
//! belongs to the finance workflow signalled through the audit log.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{StableBTreeMap, Storable};
use serde::Serialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::amount::Pence;
use crate::audit::{self, AuditAction, EntityType, Severity};
use crate::context::{EntityId, OperationContext, NANOS_PER_HOUR};
use crate::directory;
use crate::error::{Error, Result};
use crate::ledger::{self, Transaction};
use crate::notify;
use crate::{Memory, MEMORY_MANAGER};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

const EVENTS_MEMORY_ID: u8 = 40;

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventStatus {
    Active,
    Closed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Active => "ACTIVE",
            EventStatus::Closed => "CLOSED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct EventPool {
    pub id: EntityId,
    pub creator: Principal,
    pub name: String,
    pub description: String,
    pub target_amount: Option<Pence>,
    pub deadline: Option<u64>,
    pub status: EventStatus,
    pub created_at: u64,
    pub closed_at: Option<u64>,
}

impl EventPool {
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }

    pub fn deadline_passed(&self, now_ns: u64) -> bool {
        self.deadline.map_or(false, |d| now_ns > d)
    }

    fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "creator_id": self.creator.to_text(),
            "name": self.name,
            "status": self.status.as_str(),
            "target_amount": self.target_amount.map(|t| t.to_string()),
            "deadline": self.deadline,
        })
    }
}

impl Storable for EventPool {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode EventPool"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode EventPool")
    }

    const BOUND: Bound = Bound::Bounded {
        max_size: 2048,
        is_fixed_size: false,
    };
}

thread_local! {
    static EVENTS: RefCell<StableBTreeMap<EntityId, EventPool, Memory>> = RefCell::new(
        StableBTreeMap::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(EVENTS_MEMORY_ID))),
        )
    );
}

fn store(event: &EventPool) {
    EVENTS.with(|events| {
        events.borrow_mut().insert(event.id, event.clone());
    });
}

pub fn get(event_id: EntityId) -> Option<EventPool> {
    EVENTS.with(|events| events.borrow().get(&event_id))
}

// ---------------------------------------------------------------------------
// Derived figures
// ---------------------------------------------------------------------------

/// Sum of COMPLETED contribution transactions referencing the pool.
pub fn total_contributions(event_id: EntityId) -> Pence {
    Pence::checked_sum(
        ledger::contributions_for_event(event_id)
            .iter()
            .map(|tx| tx.amount),
    )
    .expect("contribution total in range")
}

/// Distinct contributors over COMPLETED contributions.
pub fn contributor_count(event_id: EntityId) -> u64 {
    let distinct: BTreeSet<Principal> = ledger::contributions_for_event(event_id)
        .iter()
        .map(|tx| tx.sender)
        .collect();
    distinct.len() as u64
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Open a new ACTIVE pool owned by the caller.
pub fn create(
    ctx: &OperationContext,
    name: String,
    description: String,
    target_amount: Option<Pence>,
    deadline: Option<u64>,
) -> Result<EventPool> {
    directory::require_active(ctx.caller)?;

    if name.trim().is_empty() {
        return Err(Error::Validation("Event name is required".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "Event name cannot exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    if description.trim().is_empty() {
        return Err(Error::Validation("Event description is required".to_string()));
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(Error::Validation(format!(
            "Event description cannot exceed {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    if let Some(target) = target_amount {
        if !target.is_positive() {
            return Err(Error::InvalidAmount);
        }
    }
    if let Some(deadline) = deadline {
        if deadline <= ctx.now_ns {
            return Err(Error::Validation("Deadline must be in the future".to_string()));
        }
    }

    let event = EventPool {
        id: ctx.fresh_id(),
        creator: ctx.caller,
        name,
        description,
        target_amount,
        deadline,
        status: EventStatus::Active,
        created_at: ctx.now_ns,
        closed_at: None,
    };
    store(&event);

    audit::log_action(
        ctx,
        AuditAction::EventCreated,
        EntityType::EventPool,
        Some(event.id.to_string()),
        None,
        Some(event.to_json()),
        Severity::Info,
    );

    Ok(event)
}

fn log_event_failure(ctx: &OperationContext, event_id: EntityId, error: &Error) {
    audit::log_action(
        ctx,
        AuditAction::EventFailed,
        EntityType::EventPool,
        Some(event_id.to_string()),
        None,
        Some(json!({ "error_code": error.code() })),
        Severity::Warning,
    );
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct ContributionOutcome {
    pub tx: Transaction,
    pub contributor_balance: Pence,
    pub total_contributions: Pence,
}

/// Debit the caller into the pool. Accepted only while the pool is ACTIVE
/// and, when a deadline is set, at or before it.
pub fn contribute(
    ctx: &OperationContext,
    event_id: EntityId,
    amount: Pence,
    note: Option<String>,
) -> Result<ContributionOutcome> {
    let event = get(event_id).ok_or(Error::EventNotFound)?;

    if !event.is_active() {
        let error = Error::EventInactive;
        log_event_failure(ctx, event_id, &error);
        return Err(error);
    }
    if event.deadline_passed(ctx.now_ns) {
        let error = Error::DeadlinePassed;
        log_event_failure(ctx, event_id, &error);
        return Err(error);
    }

    // The ledger validates the contributor and their balance, and records
    // the movement either way.
    let (tx, contributor_balance) = ledger::record_contribution(ctx, event_id, amount, note)?;

    audit::log_action(
        ctx,
        AuditAction::EventContributionMade,
        EntityType::EventPool,
        Some(event_id.to_string()),
        None,
        Some(json!({
            "event_id": event_id.to_string(),
            "transaction_id": tx.id.to_string(),
            "amount": tx.amount.to_string(),
        })),
        Severity::Info,
    );
    notify::contribution_made(ctx, &event, &tx);

    Ok(ContributionOutcome {
        tx,
        contributor_balance,
        total_contributions: total_contributions(event_id),
    })
}

fn require_closer(ctx: &OperationContext, event: &EventPool) -> Result<()> {
    directory::require_active(ctx.caller)?;
    if ctx.caller == event.creator || directory::is_admin_or_finance(ctx.caller) {
        return Ok(());
    }
    audit::log_action(
        ctx,
        AuditAction::SecurityAlert,
        EntityType::EventPool,
        Some(event.id.to_string()),
        None,
        Some(json!({
            "attempted_action": "EVENT_LIFECYCLE",
            "creator_id": event.creator.to_text(),
        })),
        Severity::Warning,
    );
    Err(Error::NotAuthorized)
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct CloseOutcome {
    pub event: EventPool,
    pub total_contributions: Pence,
    pub contributor_count: u64,
}

/// Close an ACTIVE pool and hand its total to the finance workflow via a
/// FINANCE_NOTIFICATION_REQUIRED system entry.
pub fn close(ctx: &OperationContext, event_id: EntityId) -> Result<CloseOutcome> {
    let event = get(event_id).ok_or(Error::EventNotFound)?;
    require_closer(ctx, &event)?;
    if !event.is_active() {
        let error = Error::EventInactive;
        log_event_failure(ctx, event_id, &error);
        return Err(error);
    }

    let mut event = event;
    event.status = EventStatus::Closed;
    event.closed_at = Some(ctx.now_ns);
    store(&event);

    let total = total_contributions(event_id);
    let contributors = contributor_count(event_id);

    audit::log_action(
        ctx,
        AuditAction::EventClosed,
        EntityType::EventPool,
        Some(event.id.to_string()),
        None,
        Some(json!({
            "event": event.to_json(),
            "total_contributions": total.to_string(),
            "contributor_count": contributors,
        })),
        Severity::Info,
    );
    audit::log_system(
        ctx.now_ns,
        AuditAction::FinanceNotificationRequired,
        EntityType::EventPool,
        Some(event.id.to_string()),
        Some(json!({
            "event_id": event.id.to_string(),
            "event_name": event.name,
            "total_contributions": total.to_string(),
            "contributor_count": contributors,
        })),
        Severity::Info,
    );
    notify::event_closed(ctx, &event, total);

    Ok(CloseOutcome {
        event,
        total_contributions: total,
        contributor_count: contributors,
    })
}

/// Cancel an ACTIVE pool. Only possible while nothing has been contributed;
/// a funded pool must be closed so finance disburses the money.
pub fn cancel(ctx: &OperationContext, event_id: EntityId) -> Result<EventPool> {
    let event = get(event_id).ok_or(Error::EventNotFound)?;
    require_closer(ctx, &event)?;
    if !event.is_active() {
        let error = Error::EventInactive;
        log_event_failure(ctx, event_id, &error);
        return Err(error);
    }
    if !total_contributions(event_id).is_zero() {
        let error = Error::CancelWithContributions;
        log_event_failure(ctx, event_id, &error);
        return Err(error);
    }

    let mut event = event;
    event.status = EventStatus::Cancelled;
    event.closed_at = Some(ctx.now_ns);
    store(&event);

    audit::log_action(
        ctx,
        AuditAction::EventCancelled,
        EntityType::EventPool,
        Some(event.id.to_string()),
        None,
        Some(event.to_json()),
        Severity::Info,
    );

    Ok(event)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct EventView {
    pub event: EventPool,
    pub total_contributions: Pence,
    pub contributor_count: u64,
    /// Present when a target is set; capped at 100.
    pub progress_percentage: Option<u32>,
    pub remaining_amount: Option<Pence>,
}

impl EventView {
    fn build(event: EventPool) -> Self {
        let total = total_contributions(event.id);
        let contributors = contributor_count(event.id);
        let progress = event
            .target_amount
            .and_then(|target| total.percentage_of(target));
        let remaining = event.target_amount.map(|target| {
            target
                .checked_sub(total)
                .filter(|r| r.is_positive())
                .unwrap_or(Pence::ZERO)
        });
        EventView {
            event,
            total_contributions: total,
            contributor_count: contributors,
            progress_percentage: progress,
            remaining_amount: remaining,
        }
    }
}

pub fn view(event_id: EntityId) -> Option<EventView> {
    get(event_id).map(EventView::build)
}

fn list_filtered(
    side: impl Fn(&EventPool) -> bool,
    offset: u64,
    limit: u64,
) -> Vec<EventView> {
    let mut matching: Vec<EventPool> = EVENTS.with(|events| {
        events
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, e)| e)
            .filter(|e| side(e))
            .collect()
    });
    matching.reverse();
    matching
        .into_iter()
        .skip(offset as usize)
        .take(limit.min(200) as usize)
        .map(EventView::build)
        .collect()
}

pub fn active_events(offset: u64, limit: u64) -> Vec<EventView> {
    list_filtered(|e| e.is_active(), offset, limit)
}

pub fn events_by_creator(
    creator: Principal,
    status: Option<EventStatus>,
    offset: u64,
    limit: u64,
) -> Vec<EventView> {
    list_filtered(
        |e| e.creator == creator && status.map_or(true, |s| e.status == s),
        offset,
        limit,
    )
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct ContributionView {
    pub contributor: Principal,
    pub amount: Pence,
    pub note: Option<String>,
    pub created_at: u64,
}

/// Completed contributions for one pool, oldest first.
pub fn contributions(event_id: EntityId) -> Vec<ContributionView> {
    ledger::contributions_for_event(event_id)
        .into_iter()
        .map(|tx| ContributionView {
            contributor: tx.sender,
            amount: tx.amount,
            note: tx.note,
            created_at: tx.created_at,
        })
        .collect()
}

/// All pools the user has contributed to, with their per-pool totals.
pub fn user_contributions(user: Principal) -> Vec<(EntityId, Pence)> {
    let mut totals: Vec<(EntityId, Pence)> = Vec::new();
    for tx in ledger::contributions_by_user(user) {
        let event_id = tx.event_id().expect("contribution carries an event id");
        match totals.iter_mut().find(|(id, _)| *id == event_id) {
            Some((_, sum)) => {
                *sum = sum.checked_add(tx.amount).expect("user total in range");
            }
            None => totals.push((event_id, tx.amount)),
        }
    }
    totals
}

/// Case-insensitive search over pool names and descriptions.
pub fn search(
    term: &str,
    status: Option<EventStatus>,
    offset: u64,
    limit: u64,
) -> Vec<EventView> {
    let needle = term.to_lowercase();
    list_filtered(
        |e| {
            status.map_or(true, |s| e.status == s)
                && (e.name.to_lowercase().contains(&needle)
                    || e.description.to_lowercase().contains(&needle))
        },
        offset,
        limit,
    )
}

#[derive(CandidType, Deserialize, Clone, Debug, Default)]
pub struct EventStatistics {
    pub total_events: u64,
    pub active_events: u64,
    pub closed_events: u64,
    pub cancelled_events: u64,
    pub total_raised: Pence,
}

/// Whole-system pool figures. `total_raised` spans every pool regardless of
/// lifecycle state, since contribution records outlive closure.
pub fn statistics() -> EventStatistics {
    let mut stats = EventStatistics::default();
    EVENTS.with(|events| {
        for (id, event) in events.borrow().iter().map(|e| e.into_pair()) {
            stats.total_events += 1;
            match event.status {
                EventStatus::Active => stats.active_events += 1,
                EventStatus::Closed => stats.closed_events += 1,
                EventStatus::Cancelled => stats.cancelled_events += 1,
            }
            stats.total_raised = stats
                .total_raised
                .checked_add(total_contributions(id))
                .expect("raised total in range");
        }
    });
    stats
}

/// ACTIVE pools whose deadline falls within the next `hours`.
pub fn deadline_approaching(now_ns: u64, hours: u64) -> Vec<EventPool> {
    let horizon = now_ns + hours * NANOS_PER_HOUR;
    EVENTS.with(|events| {
        events
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, e)| e)
            .filter(|e| {
                e.is_active()
                    && e.deadline
                        .map_or(false, |d| d > now_ns && d <= horizon)
            })
            .collect()
    })
}
