//! Transaction records.
//!
//! A transaction is the immutable record of one attempted money movement:
//! COMPLETED atomically with the balance changes, or FAILED with none. The
//! kind discriminator carries the fields that only make sense for that
//! kind, so a transfer without a recipient is unrepresentable.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{StableBTreeMap, Storable};
use serde::Serialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::cell::RefCell;

use crate::amount::Pence;
use crate::context::{EntityId, NANOS_PER_DAY};
use crate::{Memory, MEMORY_MANAGER};

pub const MAX_NOTE_LEN: usize = 500;
pub const MAX_CATEGORY_LEN: usize = 100;

const TRANSACTIONS_MEMORY_ID: u8 = 21;

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum TxKind {
    Transfer { recipient: Principal },
    EventContribution { event_id: EntityId },
}

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TxStatus::Completed => "COMPLETED",
            TxStatus::Failed => "FAILED",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct Transaction {
    pub id: EntityId,
    pub sender: Principal,
    pub kind: TxKind,
    pub amount: Pence,
    pub category: Option<String>,
    pub note: Option<String>,
    pub status: TxStatus,
    pub created_at: u64,
    pub processed_at: Option<u64>,
}

impl Transaction {
    pub fn recipient(&self) -> Option<Principal> {
        match self.kind {
            TxKind::Transfer { recipient } => Some(recipient),
            TxKind::EventContribution { .. } => None,
        }
    }

    pub fn event_id(&self) -> Option<EntityId> {
        match self.kind {
            TxKind::Transfer { .. } => None,
            TxKind::EventContribution { event_id } => Some(event_id),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TxStatus::Completed
    }

    pub fn involves(&self, user: Principal) -> bool {
        self.sender == user || self.recipient() == Some(user)
    }

    /// Audit payload for this record.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "sender_id": self.sender.to_text(),
            "recipient_id": self.recipient().map(|p| p.to_text()),
            "event_id": self.event_id().map(|id| id.to_string()),
            "amount": self.amount.to_string(),
            "transaction_type": match self.kind {
                TxKind::Transfer { .. } => "TRANSFER",
                TxKind::EventContribution { .. } => "EVENT_CONTRIBUTION",
            },
            "category": self.category,
            "note": self.note,
            "status": self.status.as_str(),
        })
    }
}

impl Storable for Transaction {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode Transaction"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode Transaction")
    }

    const BOUND: Bound = Bound::Bounded {
        max_size: 2048,
        is_fixed_size: false,
    };
}

thread_local! {
    static TRANSACTIONS: RefCell<StableBTreeMap<EntityId, Transaction, Memory>> = RefCell::new(
        StableBTreeMap::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(TRANSACTIONS_MEMORY_ID))),
        )
    );
}

pub(super) fn insert(tx: Transaction) -> EntityId {
    let id = tx.id;
    TRANSACTIONS.with(|txs| {
        txs.borrow_mut().insert(id, tx);
    });
    id
}

pub fn get(tx_id: EntityId) -> Option<Transaction> {
    TRANSACTIONS.with(|txs| txs.borrow().get(&tx_id))
}

pub fn count() -> u64 {
    TRANSACTIONS.with(|txs| txs.borrow().len())
}

#[derive(CandidType, Deserialize, Clone, Debug, Default)]
pub struct HistoryFilter {
    pub from_ns: Option<u64>,
    pub to_ns: Option<u64>,
    pub completed_only: bool,
    pub offset: u64,
    pub limit: Option<u64>,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub total_matching: u64,
    pub offset: u64,
}

/// Transactions the user participates in, newest first.
pub fn history_for_user(user: Principal, filter: &HistoryFilter) -> TransactionPage {
    let limit = filter.limit.unwrap_or(50).min(200) as usize;
    let mut matching: Vec<Transaction> = TRANSACTIONS.with(|txs| {
        txs.borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, tx)| tx)
            .filter(|tx| tx.involves(user))
            .filter(|tx| !filter.completed_only || tx.is_completed())
            .filter(|tx| filter.from_ns.map_or(true, |from| tx.created_at >= from))
            .filter(|tx| filter.to_ns.map_or(true, |to| tx.created_at <= to))
            .collect()
    });
    let total = matching.len() as u64;
    matching.reverse();
    let transactions = matching
        .into_iter()
        .skip(filter.offset as usize)
        .take(limit)
        .collect();
    TransactionPage {
        transactions,
        total_matching: total,
        offset: filter.offset,
    }
}

pub fn recent_for_user(user: Principal, limit: u64) -> Vec<Transaction> {
    history_for_user(
        user,
        &HistoryFilter {
            limit: Some(limit),
            ..Default::default()
        },
    )
    .transactions
}

/// Completed contributions for one event pool, in append order.
pub fn contributions_for_event(event_id: EntityId) -> Vec<Transaction> {
    TRANSACTIONS.with(|txs| {
        txs.borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, tx)| tx)
            .filter(|tx| tx.event_id() == Some(event_id) && tx.is_completed())
            .collect()
    })
}

/// Completed contributions made by one user across all pools.
pub fn contributions_by_user(user: Principal) -> Vec<Transaction> {
    TRANSACTIONS.with(|txs| {
        txs.borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, tx)| tx)
            .filter(|tx| {
                tx.sender == user && tx.is_completed() && matches!(tx.kind, TxKind::EventContribution { .. })
            })
            .collect()
    })
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct TxStatistics {
    pub period_days: u64,
    pub sent_count: u64,
    pub received_count: u64,
    pub total_sent: Pence,
    pub total_received: Pence,
}

/// Completed-transaction totals for a user over the trailing window.
pub fn statistics_for_user(user: Principal, now_ns: u64, days: u64) -> TxStatistics {
    let start = now_ns.saturating_sub(days.saturating_mul(NANOS_PER_DAY));
    let mut stats = TxStatistics {
        period_days: days,
        sent_count: 0,
        received_count: 0,
        total_sent: Pence::ZERO,
        total_received: Pence::ZERO,
    };
    TRANSACTIONS.with(|txs| {
        for (_, tx) in txs.borrow().iter().map(|e| e.into_pair()) {
            if !tx.is_completed() || tx.created_at < start || tx.created_at > now_ns {
                continue;
            }
            if tx.sender == user {
                stats.sent_count += 1;
                stats.total_sent = stats
                    .total_sent
                    .checked_add(tx.amount)
                    .expect("sent total in range");
            }
            if tx.recipient() == Some(user) {
                stats.received_count += 1;
                stats.total_received = stats
                    .total_received
                    .checked_add(tx.amount)
                    .expect("received total in range");
            }
        }
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(tag: u8) -> Principal {
        Principal::from_slice(&[tag; 29])
    }

    fn sample(id: EntityId, sender: Principal, kind: TxKind, amount: i64, at: u64) -> Transaction {
        Transaction {
            id,
            sender,
            kind,
            amount: Pence::from_minor(amount),
            category: None,
            note: None,
            status: TxStatus::Completed,
            created_at: at,
            processed_at: Some(at),
        }
    }

    #[test]
    fn test_kind_accessors() {
        let a = principal(1);
        let b = principal(2);
        let transfer = sample(1, a, TxKind::Transfer { recipient: b }, 100, 10);
        assert_eq!(transfer.recipient(), Some(b));
        assert_eq!(transfer.event_id(), None);
        assert!(transfer.involves(b));

        let contribution = sample(2, a, TxKind::EventContribution { event_id: 77 }, 100, 10);
        assert_eq!(contribution.recipient(), None);
        assert_eq!(contribution.event_id(), Some(77));
        assert!(!contribution.involves(b));
    }

    #[test]
    fn test_history_newest_first_with_pagination() {
        let a = principal(1);
        let b = principal(2);
        for i in 1..=5u128 {
            insert(sample(i, a, TxKind::Transfer { recipient: b }, 100, i as u64 * 10));
        }

        let page = history_for_user(
            a,
            &HistoryFilter {
                offset: 1,
                limit: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(page.total_matching, 5);
        assert_eq!(page.transactions.len(), 2);
        assert_eq!(page.transactions[0].id, 4);
        assert_eq!(page.transactions[1].id, 3);
    }

    #[test]
    fn test_event_contribution_queries_skip_failed() {
        let a = principal(1);
        insert(sample(1, a, TxKind::EventContribution { event_id: 5 }, 100, 10));
        let mut failed = sample(2, a, TxKind::EventContribution { event_id: 5 }, 200, 20);
        failed.status = TxStatus::Failed;
        insert(failed);
        insert(sample(3, a, TxKind::EventContribution { event_id: 6 }, 300, 30));

        let for_event = contributions_for_event(5);
        assert_eq!(for_event.len(), 1);
        assert_eq!(for_event[0].amount, Pence::from_minor(100));

        assert_eq!(contributions_by_user(a).len(), 2);
    }

    #[test]
    fn test_statistics_window() {
        let a = principal(1);
        let b = principal(2);
        let day = NANOS_PER_DAY;
        insert(sample(1, a, TxKind::Transfer { recipient: b }, 100, day));
        insert(sample(2, b, TxKind::Transfer { recipient: a }, 50, 9 * day));

        let stats = statistics_for_user(a, 10 * day, 5);
        assert_eq!(stats.sent_count, 0, "outside the window");
        assert_eq!(stats.received_count, 1);
        assert_eq!(stats.total_received, Pence::from_minor(50));
    }
}
