//! Notification outbox.
//!
//! Business operations emit notifications after their state is in place.
//! Emission is best-effort: an entry that cannot be stored becomes a
//! NOTIFICATION_FAILED system audit entry and the business operation stands.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{StableBTreeMap, Storable};
use serde::Serialize;
use serde_json::json;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::amount::Pence;
use crate::audit::{self, AuditAction, EntityType, Severity};
use crate::context::{EntityId, OperationContext, NANOS_PER_DAY};
use crate::directory;
use crate::error::{Error, Result};
use crate::events::EventPool;
use crate::ledger::Transaction;
use crate::requests::MoneyRequest;
use crate::{Memory, MEMORY_MANAGER};

const NOTIFICATIONS_MEMORY_ID: u8 = 60;

/// Storage ceiling for one encoded notification.
const MAX_ENCODED_LEN: usize = 2048;

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    TransactionReceived,
    TransactionSent,
    BulkTransferCompleted,
    MoneyRequestReceived,
    MoneyRequestApproved,
    MoneyRequestDeclined,
    EventContribution,
    EventDeadlineApproaching,
    EventClosed,
}

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct Notification {
    pub id: EntityId,
    pub user_id: Principal,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub read: bool,
    /// JSON payload with the ids the client needs to deep-link.
    pub data: Option<String>,
    pub created_at: u64,
    pub expires_at: Option<u64>,
}

impl Storable for Notification {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode Notification"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode Notification")
    }

    const BOUND: Bound = Bound::Bounded {
        max_size: MAX_ENCODED_LEN as u32,
        is_fixed_size: false,
    };
}

thread_local! {
    static NOTIFICATIONS: RefCell<StableBTreeMap<EntityId, Notification, Memory>> = RefCell::new(
        StableBTreeMap::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(NOTIFICATIONS_MEMORY_ID))),
        )
    );
}

fn display_name(user: Principal) -> String {
    directory::lookup(user)
        .map(|r| r.name)
        .unwrap_or_else(|| user.to_text())
}

struct Draft {
    user_id: Principal,
    kind: NotificationKind,
    title: String,
    message: String,
    priority: NotificationPriority,
    data: serde_json::Value,
    expires_in_days: Option<u64>,
}

/// Store the draft, or audit the failure. Never propagates an error to the
/// business operation that triggered it.
fn emit(now_ns: u64, draft: Draft) {
    let notification = Notification {
        id: crate::context::fresh_id(now_ns),
        user_id: draft.user_id,
        kind: draft.kind,
        title: draft.title,
        message: draft.message,
        priority: draft.priority,
        read: false,
        data: Some(draft.data.to_string()),
        created_at: now_ns,
        expires_at: draft.expires_in_days.map(|d| now_ns + d * NANOS_PER_DAY),
    };

    let encoded_len = notification.to_bytes().len();
    if encoded_len > MAX_ENCODED_LEN {
        audit::log_system(
            now_ns,
            AuditAction::NotificationFailed,
            EntityType::Notification,
            Some(notification.id.to_string()),
            Some(json!({
                "user_id": notification.user_id.to_text(),
                "encoded_len": encoded_len,
                "error": "notification exceeds storage bound",
            })),
            Severity::Warning,
        );
        return;
    }

    NOTIFICATIONS.with(|n| {
        n.borrow_mut().insert(notification.id, notification);
    });
}

// ---------------------------------------------------------------------------
// Emitters, one per business event
// ---------------------------------------------------------------------------

pub(crate) fn transfer_completed(
    ctx: &OperationContext,
    tx: &Transaction,
    sender_name: &str,
    recipient_name: &str,
) {
    let recipient = match tx.recipient() {
        Some(r) => r,
        None => return,
    };
    emit(
        ctx.now_ns,
        Draft {
            user_id: recipient,
            kind: NotificationKind::TransactionReceived,
            title: "Money Received".to_string(),
            message: format!("You received £{} from {}", tx.amount, sender_name),
            priority: NotificationPriority::Medium,
            data: json!({ "transaction_id": tx.id.to_string() }),
            expires_in_days: None,
        },
    );
    emit(
        ctx.now_ns,
        Draft {
            user_id: tx.sender,
            kind: NotificationKind::TransactionSent,
            title: "Money Sent".to_string(),
            message: format!("You sent £{} to {}", tx.amount, recipient_name),
            priority: NotificationPriority::Medium,
            data: json!({ "transaction_id": tx.id.to_string() }),
            expires_in_days: None,
        },
    );
}

pub(crate) fn bulk_recipient_credited(ctx: &OperationContext, tx: &Transaction) {
    let recipient = match tx.recipient() {
        Some(r) => r,
        None => return,
    };
    emit(
        ctx.now_ns,
        Draft {
            user_id: recipient,
            kind: NotificationKind::TransactionReceived,
            title: "Money Received".to_string(),
            message: format!("You received £{} from {}", tx.amount, display_name(tx.sender)),
            priority: NotificationPriority::Medium,
            data: json!({ "transaction_id": tx.id.to_string() }),
            expires_in_days: None,
        },
    );
}

pub(crate) fn bulk_completed(
    ctx: &OperationContext,
    sender: Principal,
    recipient_count: usize,
    total: Pence,
) {
    emit(
        ctx.now_ns,
        Draft {
            user_id: sender,
            kind: NotificationKind::BulkTransferCompleted,
            title: "Bulk Transfer Completed".to_string(),
            message: format!("You sent £{} to {} recipients", total, recipient_count),
            priority: NotificationPriority::Medium,
            data: json!({ "recipient_count": recipient_count }),
            expires_in_days: None,
        },
    );
}

pub(crate) fn request_created(ctx: &OperationContext, request: &MoneyRequest, requester_name: &str) {
    emit(
        ctx.now_ns,
        Draft {
            user_id: request.payer,
            kind: NotificationKind::MoneyRequestReceived,
            title: "Money Request Received".to_string(),
            message: format!("{} is requesting £{} from you", requester_name, request.amount),
            priority: NotificationPriority::High,
            data: json!({ "request_id": request.id.to_string() }),
            expires_in_days: Some(30),
        },
    );
}

pub(crate) fn request_responded(ctx: &OperationContext, request: &MoneyRequest, approved: bool) {
    let payer_name = display_name(request.payer);
    let (kind, title, message) = if approved {
        (
            NotificationKind::MoneyRequestApproved,
            "Money Request Approved",
            format!("{} approved your request for £{}", payer_name, request.amount),
        )
    } else {
        (
            NotificationKind::MoneyRequestDeclined,
            "Money Request Declined",
            format!("{} declined your request for £{}", payer_name, request.amount),
        )
    };
    emit(
        ctx.now_ns,
        Draft {
            user_id: request.requester,
            kind,
            title: title.to_string(),
            message,
            priority: NotificationPriority::Medium,
            data: json!({ "request_id": request.id.to_string() }),
            expires_in_days: Some(30),
        },
    );
}

pub(crate) fn contribution_made(ctx: &OperationContext, event: &EventPool, tx: &Transaction) {
    if event.creator == tx.sender {
        return;
    }
    emit(
        ctx.now_ns,
        Draft {
            user_id: event.creator,
            kind: NotificationKind::EventContribution,
            title: "Event Contribution".to_string(),
            message: format!(
                "{} contributed £{} to {}",
                display_name(tx.sender),
                tx.amount,
                event.name
            ),
            priority: NotificationPriority::Low,
            data: json!({
                "event_id": event.id.to_string(),
                "transaction_id": tx.id.to_string(),
            }),
            expires_in_days: Some(7),
        },
    );
}

pub(crate) fn event_closed(ctx: &OperationContext, event: &EventPool, total: Pence) {
    let mut audience: BTreeSet<Principal> = crate::ledger::contributions_for_event(event.id)
        .iter()
        .map(|tx| tx.sender)
        .collect();
    audience.insert(event.creator);

    for user in audience {
        emit(
            ctx.now_ns,
            Draft {
                user_id: user,
                kind: NotificationKind::EventClosed,
                title: "Event Closed".to_string(),
                message: format!("The event {} has been closed with £{} raised", event.name, total),
                priority: NotificationPriority::Medium,
                data: json!({ "event_id": event.id.to_string() }),
                expires_in_days: Some(7),
            },
        );
    }
}

/// Timer-driven reminder for pools whose deadline is near.
pub(crate) fn deadline_approaching(now_ns: u64, event: &EventPool) {
    emit(
        now_ns,
        Draft {
            user_id: event.creator,
            kind: NotificationKind::EventDeadlineApproaching,
            title: "Event Deadline Approaching".to_string(),
            message: format!("The deadline for {} is approaching", event.name),
            priority: NotificationPriority::High,
            data: json!({ "event_id": event.id.to_string() }),
            expires_in_days: Some(7),
        },
    );
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// Notifications for one user, newest first.
pub fn list_for_user(
    user: Principal,
    unread_only: bool,
    offset: u64,
    limit: u64,
) -> Vec<Notification> {
    let mut matching: Vec<Notification> = NOTIFICATIONS.with(|n| {
        n.borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, note)| note)
            .filter(|note| note.user_id == user)
            .filter(|note| !unread_only || !note.read)
            .collect()
    });
    matching.reverse();
    matching
        .into_iter()
        .skip(offset as usize)
        .take(limit.min(200) as usize)
        .collect()
}

pub fn unread_count(user: Principal) -> u64 {
    NOTIFICATIONS.with(|n| {
        n.borrow()
            .iter()
            .map(|e| e.into_pair())
            .filter(|(_, note)| note.user_id == user && !note.read)
            .count() as u64
    })
}

/// Mark one of the caller's notifications read.
pub fn mark_read(caller: Principal, notification_id: EntityId) -> Result<()> {
    NOTIFICATIONS.with(|n| {
        let mut n = n.borrow_mut();
        let mut note = n
            .get(&notification_id)
            .filter(|note| note.user_id == caller)
            .ok_or_else(|| Error::Validation("Notification not found".to_string()))?;
        note.read = true;
        n.insert(notification_id, note);
        Ok(())
    })
}

pub fn mark_all_read(caller: Principal) -> u64 {
    let unread: Vec<EntityId> = NOTIFICATIONS.with(|n| {
        n.borrow()
            .iter()
            .map(|e| e.into_pair())
            .filter(|(_, note)| note.user_id == caller && !note.read)
            .map(|(id, _)| id)
            .collect()
    });
    let count = unread.len() as u64;
    NOTIFICATIONS.with(|n| {
        let mut n = n.borrow_mut();
        for id in unread {
            if let Some(mut note) = n.get(&id) {
                note.read = true;
                n.insert(id, note);
            }
        }
    });
    count
}

/// Drop notifications past their expiry. Idempotent under a fixed clock.
pub fn purge_expired(now_ns: u64) -> u64 {
    let expired: Vec<EntityId> = NOTIFICATIONS.with(|n| {
        n.borrow()
            .iter()
            .map(|e| e.into_pair())
            .filter(|(_, note)| note.expires_at.map_or(false, |e| now_ns > e))
            .map(|(id, _)| id)
            .collect()
    });
    let count = expired.len() as u64;
    NOTIFICATIONS.with(|n| {
        let mut n = n.borrow_mut();
        for id in expired {
            n.remove(&id);
        }
    });
    count
}
