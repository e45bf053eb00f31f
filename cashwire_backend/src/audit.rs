//! Append-only audit log.
//!
//! Every state change appends an entry inside the same message that performs
//! the change, so the log commits or rolls back with the mutation it
//! describes. Entries are never updated; the retention sweep is the only
//! delete path.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{StableBTreeMap, Storable};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::cell::RefCell;

use crate::context::{EntityId, OperationContext, NANOS_PER_DAY};
use crate::directory;
use crate::{Memory, MEMORY_MANAGER};

/// Retention horizon: seven years.
pub const RETENTION_DAYS: u64 = 2555;

const AUDIT_LOG_MEMORY_ID: u8 = 50;
const CLEANUP_CHUNK: usize = 500;
const MAX_PAGE: u64 = 200;
const DEFAULT_PAGE: u64 = 50;

/// Keys whose values never reach persistence in clear text.
const SENSITIVE_KEYS: [&str; 8] = [
    "account_number",
    "routing_number",
    "ssn",
    "tax_id",
    "password",
    "secret",
    "private_key",
    "token",
];

const REDACTED: &str = "***ENCRYPTED***";

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    TransactionCreated,
    TransactionFailed,
    BulkTransferCompleted,
    AccountBalanceChanged,
    AccountCreated,
    MoneyRequestCreated,
    MoneyRequestApproved,
    MoneyRequestDeclined,
    MoneyRequestCancelled,
    MoneyRequestExpired,
    MoneyRequestFailed,
    EventCreated,
    EventContributionMade,
    EventClosed,
    EventCancelled,
    EventFailed,
    UserCreated,
    UserUpdated,
    UserDeactivated,
    FinanceNotificationRequired,
    DataRetentionCleanup,
    NotificationFailed,
    SecurityAlert,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::TransactionCreated => "TRANSACTION_CREATED",
            AuditAction::TransactionFailed => "TRANSACTION_FAILED",
            AuditAction::BulkTransferCompleted => "BULK_TRANSFER_COMPLETED",
            AuditAction::AccountBalanceChanged => "ACCOUNT_BALANCE_CHANGED",
            AuditAction::AccountCreated => "ACCOUNT_CREATED",
            AuditAction::MoneyRequestCreated => "MONEY_REQUEST_CREATED",
            AuditAction::MoneyRequestApproved => "MONEY_REQUEST_APPROVED",
            AuditAction::MoneyRequestDeclined => "MONEY_REQUEST_DECLINED",
            AuditAction::MoneyRequestCancelled => "MONEY_REQUEST_CANCELLED",
            AuditAction::MoneyRequestExpired => "MONEY_REQUEST_EXPIRED",
            AuditAction::MoneyRequestFailed => "MONEY_REQUEST_FAILED",
            AuditAction::EventCreated => "EVENT_CREATED",
            AuditAction::EventContributionMade => "EVENT_CONTRIBUTION_MADE",
            AuditAction::EventClosed => "EVENT_CLOSED",
            AuditAction::EventCancelled => "EVENT_CANCELLED",
            AuditAction::EventFailed => "EVENT_FAILED",
            AuditAction::UserCreated => "USER_CREATED",
            AuditAction::UserUpdated => "USER_UPDATED",
            AuditAction::UserDeactivated => "USER_DEACTIVATED",
            AuditAction::FinanceNotificationRequired => "FINANCE_NOTIFICATION_REQUIRED",
            AuditAction::DataRetentionCleanup => "DATA_RETENTION_CLEANUP",
            AuditAction::NotificationFailed => "NOTIFICATION_FAILED",
            AuditAction::SecurityAlert => "SECURITY_ALERT",
        }
    }

    fn is_security(self) -> bool {
        matches!(self, AuditAction::SecurityAlert | AuditAction::NotificationFailed)
    }

    fn is_transactional(self) -> bool {
        matches!(
            self,
            AuditAction::TransactionCreated
                | AuditAction::TransactionFailed
                | AuditAction::BulkTransferCompleted
                | AuditAction::AccountBalanceChanged
        )
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityType {
    Account,
    Transaction,
    MoneyRequest,
    EventPool,
    User,
    Notification,
    System,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Account => "Account",
            EntityType::Transaction => "Transaction",
            EntityType::MoneyRequest => "MoneyRequest",
            EntityType::EventPool => "EventPool",
            EntityType::User => "User",
            EntityType::Notification => "Notification",
            EntityType::System => "System",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct AuditEntry {
    pub id: EntityId,
    pub user_id: Option<Principal>,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    /// JSON document; sensitive keys redacted before persistence.
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub severity: Severity,
    pub created_at: u64,
}

impl Storable for AuditEntry {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode AuditEntry"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode AuditEntry")
    }

    const BOUND: Bound = Bound::Unbounded;
}

thread_local! {
    static AUDIT_LOG: RefCell<StableBTreeMap<EntityId, AuditEntry, Memory>> = RefCell::new(
        StableBTreeMap::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(AUDIT_LOG_MEMORY_ID))),
        )
    );
}

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|s| key.eq_ignore_ascii_case(s))
}

/// Replace the value of every sensitive key, at any nesting depth.
fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *val = Value::String(REDACTED.to_string());
                } else {
                    redact(val);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact(item);
            }
        }
        _ => {}
    }
}

fn serialize_payload(payload: Option<Value>) -> Option<String> {
    payload.map(|mut value| {
        redact(&mut value);
        value.to_string()
    })
}

// ---------------------------------------------------------------------------
// Write side
// ---------------------------------------------------------------------------

/// Append a user-attributed entry. Must be called from inside the message
/// performing the state change it describes.
pub fn log_action(
    ctx: &OperationContext,
    action: AuditAction,
    entity_type: EntityType,
    entity_id: Option<String>,
    old_values: Option<Value>,
    new_values: Option<Value>,
    severity: Severity,
) -> EntityId {
    append(AuditEntry {
        id: ctx.fresh_id(),
        user_id: Some(ctx.caller),
        action,
        entity_type,
        entity_id,
        old_values: serialize_payload(old_values),
        new_values: serialize_payload(new_values),
        ip_address: ctx.ip_address.clone(),
        user_agent: ctx.user_agent.clone(),
        severity,
        created_at: ctx.now_ns,
    })
}

/// Append a system entry (no originating user).
pub fn log_system(
    now_ns: u64,
    action: AuditAction,
    entity_type: EntityType,
    entity_id: Option<String>,
    details: Option<Value>,
    severity: Severity,
) -> EntityId {
    append(AuditEntry {
        id: crate::context::fresh_id(now_ns),
        user_id: None,
        action,
        entity_type,
        entity_id,
        old_values: None,
        new_values: serialize_payload(details),
        ip_address: None,
        user_agent: None,
        severity,
        created_at: now_ns,
    })
}

fn append(entry: AuditEntry) -> EntityId {
    let id = entry.id;
    AUDIT_LOG.with(|log| {
        log.borrow_mut().insert(id, entry);
    });
    id
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

#[derive(CandidType, Deserialize, Clone, Debug, Default)]
pub struct AuditQuery {
    pub user_id: Option<Principal>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub from_ns: Option<u64>,
    pub to_ns: Option<u64>,
    pub ip_address: Option<String>,
    pub severity: Option<Severity>,
    pub offset: u64,
    pub limit: Option<u64>,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total_matching: u64,
    pub offset: u64,
    pub limit: u64,
}

fn matches(entry: &AuditEntry, q: &AuditQuery) -> bool {
    if let Some(user) = q.user_id {
        if entry.user_id != Some(user) {
            return false;
        }
    }
    if let Some(action) = q.action {
        if entry.action != action {
            return false;
        }
    }
    if let Some(entity_type) = q.entity_type {
        if entry.entity_type != entity_type {
            return false;
        }
    }
    if let Some(entity_id) = &q.entity_id {
        if entry.entity_id.as_deref() != Some(entity_id.as_str()) {
            return false;
        }
    }
    if let Some(from) = q.from_ns {
        if entry.created_at < from {
            return false;
        }
    }
    if let Some(to) = q.to_ns {
        if entry.created_at > to {
            return false;
        }
    }
    if let Some(ip) = &q.ip_address {
        if entry.ip_address.as_deref() != Some(ip.as_str()) {
            return false;
        }
    }
    if let Some(severity) = q.severity {
        if entry.severity != severity {
            return false;
        }
    }
    true
}

/// Structured query over the log. Entries come back in append order.
pub fn query_entries(q: &AuditQuery) -> AuditPage {
    let limit = q.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    AUDIT_LOG.with(|log| {
        let log = log.borrow();
        let mut total = 0u64;
        let mut entries = Vec::new();
        for (_, entry) in log.iter().map(|e| e.into_pair()) {
            if !matches(&entry, q) {
                continue;
            }
            if total >= q.offset && (entries.len() as u64) < limit {
                entries.push(entry.clone());
            }
            total += 1;
        }
        AuditPage {
            entries,
            total_matching: total,
            offset: q.offset,
            limit,
        }
    })
}

pub fn entry_count() -> u64 {
    AUDIT_LOG.with(|log| log.borrow().len())
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct CleanupReport {
    pub cutoff_ns: u64,
    pub deleted_count: u64,
    pub retention_days: u64,
}

/// Delete entries strictly older than `now - days`. The only delete path in
/// the module. A DATA_RETENTION_CLEANUP system entry is appended before any
/// deletion happens. Idempotent under a fixed clock.
pub fn cleanup_older_than(now_ns: u64, days: u64) -> CleanupReport {
    let cutoff_ns = now_ns.saturating_sub(days.saturating_mul(NANOS_PER_DAY));

    // Entry ids embed creation time in the high bits, so everything to
    // delete sits below this key.
    let cutoff_key: EntityId = (cutoff_ns as u128) << 64;

    let pending: u64 = AUDIT_LOG.with(|log| {
        log.borrow().range(..cutoff_key).count() as u64
    });

    log_system(
        now_ns,
        AuditAction::DataRetentionCleanup,
        EntityType::System,
        None,
        Some(serde_json::json!({
            "retention_days": days,
            "cutoff": cutoff_ns,
            "entries_to_delete": pending,
        })),
        Severity::Info,
    );

    let mut deleted = 0u64;
    loop {
        let chunk: Vec<EntityId> = AUDIT_LOG.with(|log| {
            log.borrow()
                .range(..cutoff_key)
                .map(|e| e.into_pair())
                .map(|(id, _)| id)
                .take(CLEANUP_CHUNK)
                .collect()
        });
        if chunk.is_empty() {
            break;
        }
        AUDIT_LOG.with(|log| {
            let mut log = log.borrow_mut();
            for id in &chunk {
                log.remove(id);
            }
        });
        deleted += chunk.len() as u64;
    }

    ic_cdk::println!(
        "Audit retention sweep removed {} entries older than {} days",
        deleted,
        days
    );

    CleanupReport {
        cutoff_ns,
        deleted_count: deleted,
        retention_days: days,
    }
}

// ---------------------------------------------------------------------------
// Integrity verification
// ---------------------------------------------------------------------------

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum IntegrityStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct IntegrityIssue {
    pub entry_id: EntityId,
    pub issue: String,
    pub severity: Severity,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct IntegrityReport {
    pub total_checked: u64,
    pub missing_timestamps: u64,
    pub orphaned_user_references: u64,
    pub invalid_payloads: u64,
    pub issues: Vec<IntegrityIssue>,
    pub overall_status: IntegrityStatus,
}

/// Scan the whole log for structural damage. Read-only.
pub fn verify_integrity() -> IntegrityReport {
    let mut report = IntegrityReport {
        total_checked: 0,
        missing_timestamps: 0,
        orphaned_user_references: 0,
        invalid_payloads: 0,
        issues: Vec::new(),
        overall_status: IntegrityStatus::Healthy,
    };

    AUDIT_LOG.with(|log| {
        for (id, entry) in log.borrow().iter().map(|e| e.into_pair()) {
            report.total_checked += 1;

            if entry.created_at == 0 {
                report.missing_timestamps += 1;
                report.issues.push(IntegrityIssue {
                    entry_id: id,
                    issue: "Missing timestamp".to_string(),
                    severity: Severity::Error,
                });
            }

            if let Some(user) = entry.user_id {
                if directory::lookup(user).is_none() {
                    report.orphaned_user_references += 1;
                    report.issues.push(IntegrityIssue {
                        entry_id: id,
                        issue: format!("Orphaned user reference: {}", user),
                        severity: Severity::Warning,
                    });
                }
            }

            for payload in [&entry.old_values, &entry.new_values] {
                if let Some(raw) = payload {
                    if serde_json::from_str::<Value>(raw).is_err() {
                        report.invalid_payloads += 1;
                        report.issues.push(IntegrityIssue {
                            entry_id: id,
                            issue: "Invalid JSON payload".to_string(),
                            severity: Severity::Info,
                        });
                    }
                }
            }
        }
    });

    report.overall_status = match report.issues.len() {
        0 => IntegrityStatus::Healthy,
        n if n < 10 => IntegrityStatus::Warning,
        _ => IntegrityStatus::Critical,
    };
    report
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(CandidType, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Comprehensive,
    Transactions,
    Security,
    UserActivity,
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct AuditReport {
    pub kind: ReportKind,
    pub start_ns: u64,
    pub end_ns: u64,
    pub total_entries: u64,
    pub action_breakdown: Vec<(String, u64)>,
    pub severity_breakdown: Vec<(String, u64)>,
    pub transaction_entries: u64,
    pub transaction_failures: u64,
    pub security_events: u64,
    pub top_users: Vec<(Principal, u64)>,
    /// SHA-256 over (id, created_at) of every entry in the window.
    pub window_digest: String,
}

/// Aggregate the window `[start_ns, end_ns]`. Read-only.
pub fn generate_report(kind: ReportKind, start_ns: u64, end_ns: u64) -> AuditReport {
    let mut actions: Vec<(String, u64)> = Vec::new();
    let mut severities: Vec<(String, u64)> = Vec::new();
    let mut users: Vec<(Principal, u64)> = Vec::new();
    let mut total = 0u64;
    let mut tx_entries = 0u64;
    let mut tx_failures = 0u64;
    let mut security = 0u64;
    let mut hasher = Sha256::new();

    fn bump<K: PartialEq>(counts: &mut Vec<(K, u64)>, key: K) {
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => counts.push((key, 1)),
        }
    }

    AUDIT_LOG.with(|log| {
        for (id, entry) in log.borrow().iter().map(|e| e.into_pair()) {
            if entry.created_at < start_ns || entry.created_at > end_ns {
                continue;
            }
            total += 1;
            hasher.update(id.to_be_bytes());
            hasher.update(entry.created_at.to_be_bytes());

            bump(&mut actions, entry.action.as_str().to_string());
            bump(&mut severities, entry.severity.as_str().to_string());
            if let Some(user) = entry.user_id {
                bump(&mut users, user);
            }
            if entry.action.is_transactional() {
                tx_entries += 1;
            }
            if entry.action == AuditAction::TransactionFailed {
                tx_failures += 1;
            }
            if entry.action.is_security() || entry.severity == Severity::Critical {
                security += 1;
            }
        }
    });

    users.sort_by(|a, b| b.1.cmp(&a.1));
    users.truncate(10);

    let digest = hasher.finalize();
    let window_digest = digest.iter().map(|b| format!("{:02x}", b)).collect();

    let (action_breakdown, severity_breakdown, top_users) = match kind {
        ReportKind::Comprehensive => (actions, severities, users),
        ReportKind::Transactions => (
            actions
                .into_iter()
                .filter(|(a, _)| a.starts_with("TRANSACTION") || a.starts_with("BULK") || a.starts_with("ACCOUNT"))
                .collect(),
            severities,
            Vec::new(),
        ),
        ReportKind::Security => (
            actions
                .into_iter()
                .filter(|(a, _)| a.starts_with("SECURITY") || a.starts_with("NOTIFICATION"))
                .collect(),
            severities,
            Vec::new(),
        ),
        ReportKind::UserActivity => (Vec::new(), severities, users),
    };

    AuditReport {
        kind,
        start_ns,
        end_ns,
        total_entries: total,
        action_breakdown,
        severity_breakdown,
        transaction_entries: tx_entries,
        transaction_failures: tx_failures,
        security_events: security,
        top_users,
        window_digest,
    }
}

/// Entry counts per UTC day over the trailing `days` window.
pub fn daily_activity(now_ns: u64, days: u64) -> Vec<(u64, u64)> {
    let start = now_ns.saturating_sub(days.saturating_mul(NANOS_PER_DAY));
    let mut buckets: Vec<(u64, u64)> = Vec::new();
    AUDIT_LOG.with(|log| {
        for (_, entry) in log.borrow().iter().map(|e| e.into_pair()) {
            if entry.created_at < start || entry.created_at > now_ns {
                continue;
            }
            let day = entry.created_at / NANOS_PER_DAY;
            match buckets.iter_mut().find(|(d, _)| *d == day) {
                Some((_, n)) => *n += 1,
                None => buckets.push((day, 1)),
            }
        }
    });
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(user: Principal, now_ns: u64) -> OperationContext {
        OperationContext::new(user, now_ns)
    }

    fn some_user() -> Principal {
        Principal::from_slice(&[7; 29])
    }

    #[test]
    fn test_redaction_of_sensitive_keys() {
        let mut payload = json!({
            "amount": "25.00",
            "password": "hunter2",
            "Account_Number": "1234",
            "nested": { "secret": "x", "note": "ok" },
            "list": [ { "token": "t" } ],
        });
        redact(&mut payload);
        assert_eq!(payload["password"], REDACTED);
        assert_eq!(payload["Account_Number"], REDACTED);
        assert_eq!(payload["nested"]["secret"], REDACTED);
        assert_eq!(payload["list"][0]["token"], REDACTED);
        assert_eq!(payload["amount"], "25.00");
        assert_eq!(payload["nested"]["note"], "ok");
    }

    #[test]
    fn test_append_and_query_by_action() {
        let c = ctx(some_user(), 1_000);
        log_action(
            &c,
            AuditAction::TransactionCreated,
            EntityType::Transaction,
            Some("1".to_string()),
            None,
            Some(json!({"amount": "1.00"})),
            Severity::Info,
        );
        log_action(
            &c,
            AuditAction::TransactionFailed,
            EntityType::Transaction,
            Some("2".to_string()),
            None,
            None,
            Severity::Warning,
        );

        let page = query_entries(&AuditQuery {
            action: Some(AuditAction::TransactionFailed),
            ..Default::default()
        });
        assert_eq!(page.total_matching, 1);
        assert_eq!(page.entries[0].entity_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_query_pagination_and_time_filter() {
        let user = some_user();
        for i in 0..10u64 {
            log_action(
                &ctx(user, i * 100),
                AuditAction::UserUpdated,
                EntityType::User,
                None,
                None,
                None,
                Severity::Info,
            );
        }
        let page = query_entries(&AuditQuery {
            from_ns: Some(300),
            to_ns: Some(700),
            offset: 1,
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(page.total_matching, 5);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].created_at, 400);
    }

    #[test]
    fn test_cleanup_deletes_only_older_and_logs_first() {
        let day = NANOS_PER_DAY;
        let user = some_user();
        log_action(&ctx(user, day), AuditAction::UserCreated, EntityType::User, None, None, None, Severity::Info);
        log_action(&ctx(user, 9 * day), AuditAction::UserUpdated, EntityType::User, None, None, None, Severity::Info);

        let report = cleanup_older_than(10 * day, 5);
        assert_eq!(report.deleted_count, 1);

        // The old entry is gone, the young one and the cleanup record remain.
        let page = query_entries(&AuditQuery::default());
        assert_eq!(page.total_matching, 2);
        assert!(page
            .entries
            .iter()
            .any(|e| e.action == AuditAction::DataRetentionCleanup));

        // Second run under the same clock removes nothing further.
        let report = cleanup_older_than(10 * day, 5);
        assert_eq!(report.deleted_count, 0);
    }

    #[test]
    fn test_verify_integrity_reports_orphans() {
        // No directory record exists for this principal.
        log_action(
            &ctx(some_user(), 5_000),
            AuditAction::UserUpdated,
            EntityType::User,
            None,
            None,
            None,
            Severity::Info,
        );
        let report = verify_integrity();
        assert_eq!(report.total_checked, 1);
        assert_eq!(report.orphaned_user_references, 1);
        assert_eq!(report.overall_status, IntegrityStatus::Warning);
    }

    #[test]
    fn test_report_counts_and_digest() {
        let c = ctx(some_user(), 1_000);
        log_action(&c, AuditAction::TransactionCreated, EntityType::Transaction, None, None, None, Severity::Info);
        log_action(&c, AuditAction::TransactionFailed, EntityType::Transaction, None, None, None, Severity::Warning);
        log_system(1_000, AuditAction::SecurityAlert, EntityType::System, None, None, Severity::Warning);

        let report = generate_report(ReportKind::Comprehensive, 0, 2_000);
        assert_eq!(report.total_entries, 3);
        assert_eq!(report.transaction_entries, 2);
        assert_eq!(report.transaction_failures, 1);
        assert_eq!(report.security_events, 1);
        assert_eq!(report.window_digest.len(), 64);

        // An empty window hashes to the digest of nothing and counts zero.
        let empty = generate_report(ReportKind::Security, 10_000, 20_000);
        assert_eq!(empty.total_entries, 0);
    }
}
