//! Money requests: a payable request from requester to payer.
//!
//! State machine: PENDING -> {APPROVED, DECLINED, EXPIRED}, terminal states
//! sticky. Approval performs the underlying ledger transfer in the same
//! message; a transfer rejection leaves the request PENDING so the payer can
//! retry once funded. Expiry is an explicit transition: the sweep (or any
//! operation acting on a stale request) moves PENDING past its deadline to
//! EXPIRED before anything else happens.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{StableBTreeMap, Storable};
use serde::Serialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::cell::RefCell;

use crate::amount::Pence;
use crate::audit::{self, AuditAction, EntityType, Severity};
use crate::context::{EntityId, OperationContext, NANOS_PER_DAY, NANOS_PER_HOUR};
use crate::directory;
use crate::error::{Error, Result};
use crate::ledger::{self, Transaction, MAX_NOTE_LEN};
use crate::notify;
use crate::{Memory, MEMORY_MANAGER};

pub const DEFAULT_EXPIRY_DAYS: u32 = 7;
pub const MAX_EXPIRY_DAYS: u32 = 30;

const REQUESTS_MEMORY_ID: u8 = 30;

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Approved,
    Declined,
    Expired,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Declined => "DECLINED",
            RequestStatus::Expired => "EXPIRED",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct MoneyRequest {
    pub id: EntityId,
    pub requester: Principal,
    pub payer: Principal,
    pub amount: Pence,
    pub note: Option<String>,
    pub status: RequestStatus,
    pub created_at: u64,
    pub responded_at: Option<u64>,
    pub expires_at: u64,
    /// Set when approval completed its transfer.
    pub approved_tx_id: Option<EntityId>,
}

impl MoneyRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Past its deadline while still persisted as PENDING.
    pub fn is_stale(&self, now_ns: u64) -> bool {
        self.is_pending() && now_ns > self.expires_at
    }

    /// What a reader should treat the status as right now: a stale PENDING
    /// request is expired in effect even before the sweep persists it.
    pub fn effective_status(&self, now_ns: u64) -> RequestStatus {
        if self.is_stale(now_ns) {
            RequestStatus::Expired
        } else {
            self.status
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "requester_id": self.requester.to_text(),
            "payer_id": self.payer.to_text(),
            "amount": self.amount.to_string(),
            "status": self.status.as_str(),
            "expires_at": self.expires_at,
        })
    }
}

impl Storable for MoneyRequest {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode MoneyRequest"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode MoneyRequest")
    }

    const BOUND: Bound = Bound::Bounded {
        max_size: 1536,
        is_fixed_size: false,
    };
}

thread_local! {
    static REQUESTS: RefCell<StableBTreeMap<EntityId, MoneyRequest, Memory>> = RefCell::new(
        StableBTreeMap::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(REQUESTS_MEMORY_ID))),
        )
    );
}

fn store(request: &MoneyRequest) {
    REQUESTS.with(|requests| {
        requests.borrow_mut().insert(request.id, request.clone());
    });
}

pub fn get(request_id: EntityId) -> Option<MoneyRequest> {
    REQUESTS.with(|requests| requests.borrow().get(&request_id))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Create a PENDING request from the caller towards `payer`.
pub fn create(
    ctx: &OperationContext,
    payer: Principal,
    amount: Pence,
    note: Option<String>,
    expires_in_days: Option<u32>,
) -> Result<MoneyRequest> {
    let requester = ctx.caller;

    if requester == payer {
        return Err(Error::SelfTransfer);
    }
    if !amount.is_positive() {
        return Err(Error::InvalidAmount);
    }
    if let Some(note) = &note {
        if note.len() > MAX_NOTE_LEN {
            return Err(Error::Validation(format!(
                "Note cannot exceed {} characters",
                MAX_NOTE_LEN
            )));
        }
    }
    let days = expires_in_days.unwrap_or(DEFAULT_EXPIRY_DAYS);
    if days < 1 || days > MAX_EXPIRY_DAYS {
        return Err(Error::Validation(format!(
            "Expiry days must be between 1 and {}",
            MAX_EXPIRY_DAYS
        )));
    }

    let requester_record = directory::require_active(requester)?;
    directory::require_active(payer)?;

    // At most one live PENDING request per (requester, payer) pair.
    let duplicate = REQUESTS.with(|requests| {
        requests.borrow().iter().map(|e| e.into_pair()).any(|(_, r)| {
            r.requester == requester
                && r.payer == payer
                && r.is_pending()
                && r.expires_at > ctx.now_ns
        })
    });
    if duplicate {
        return Err(Error::DuplicateRequest);
    }

    let request = MoneyRequest {
        id: ctx.fresh_id(),
        requester,
        payer,
        amount,
        note,
        status: RequestStatus::Pending,
        created_at: ctx.now_ns,
        responded_at: None,
        expires_at: ctx.now_ns + days as u64 * NANOS_PER_DAY,
        approved_tx_id: None,
    };
    store(&request);

    audit::log_action(
        ctx,
        AuditAction::MoneyRequestCreated,
        EntityType::MoneyRequest,
        Some(request.id.to_string()),
        None,
        Some(request.to_json()),
        Severity::Info,
    );
    notify::request_created(ctx, &request, &requester_record.name);

    Ok(request)
}

/// Transition a stale PENDING request to EXPIRED, then report it expired.
fn expire_now(ctx: &OperationContext, mut request: MoneyRequest) -> Error {
    request.status = RequestStatus::Expired;
    request.responded_at = Some(ctx.now_ns);
    store(&request);
    audit::log_action(
        ctx,
        AuditAction::MoneyRequestExpired,
        EntityType::MoneyRequest,
        Some(request.id.to_string()),
        None,
        Some(request.to_json()),
        Severity::Info,
    );
    Error::RequestExpired
}

#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct RespondOutcome {
    pub request: MoneyRequest,
    /// Present when the response was an approval.
    pub tx: Option<Transaction>,
}

/// Approve or decline a request. Only the payer may respond; approval runs
/// the transfer payer -> requester inside this same message.
pub fn respond(ctx: &OperationContext, request_id: EntityId, approve: bool) -> Result<RespondOutcome> {
    let request = get(request_id).ok_or(Error::RequestNotFound)?;

    if ctx.caller != request.payer {
        return Err(Error::NotAuthorized);
    }
    if !request.is_pending() {
        return Err(Error::AlreadyResponded);
    }
    if request.is_stale(ctx.now_ns) {
        return Err(expire_now(ctx, request));
    }

    if approve {
        let transfer = ledger::transfer(
            ctx,
            request.requester,
            request.amount,
            Some("Money Request".to_string()),
            request.note.clone(),
        );
        match transfer {
            Ok(outcome) => {
                let mut request = request;
                request.status = RequestStatus::Approved;
                request.responded_at = Some(ctx.now_ns);
                request.approved_tx_id = Some(outcome.tx.id);
                store(&request);

                audit::log_action(
                    ctx,
                    AuditAction::MoneyRequestApproved,
                    EntityType::MoneyRequest,
                    Some(request.id.to_string()),
                    None,
                    Some(json!({
                        "request": request.to_json(),
                        "transaction_id": outcome.tx.id.to_string(),
                    })),
                    Severity::Info,
                );
                notify::request_responded(ctx, &request, true);

                Ok(RespondOutcome {
                    request,
                    tx: Some(outcome.tx),
                })
            }
            Err(error) => {
                // The ledger has already recorded the FAILED transaction;
                // the request stays PENDING so the payer can retry.
                audit::log_action(
                    ctx,
                    AuditAction::MoneyRequestFailed,
                    EntityType::MoneyRequest,
                    Some(request.id.to_string()),
                    None,
                    Some(json!({
                        "request": request.to_json(),
                        "error_code": error.code(),
                    })),
                    Severity::Warning,
                );
                Err(error)
            }
        }
    } else {
        let mut request = request;
        request.status = RequestStatus::Declined;
        request.responded_at = Some(ctx.now_ns);
        store(&request);

        audit::log_action(
            ctx,
            AuditAction::MoneyRequestDeclined,
            EntityType::MoneyRequest,
            Some(request.id.to_string()),
            None,
            Some(request.to_json()),
            Severity::Info,
        );
        notify::request_responded(ctx, &request, false);

        Ok(RespondOutcome { request, tx: None })
    }
}

/// Requester-side cancellation. Lands in the same terminal state as a
/// payer decline, distinguished only by the audit action.
pub fn cancel(ctx: &OperationContext, request_id: EntityId) -> Result<MoneyRequest> {
    let request = get(request_id).ok_or(Error::RequestNotFound)?;

    if ctx.caller != request.requester {
        return Err(Error::NotAuthorized);
    }
    if !request.is_pending() {
        return Err(Error::AlreadyResponded);
    }
    if request.is_stale(ctx.now_ns) {
        return Err(expire_now(ctx, request));
    }

    let mut request = request;
    request.status = RequestStatus::Declined;
    request.responded_at = Some(ctx.now_ns);
    store(&request);

    audit::log_action(
        ctx,
        AuditAction::MoneyRequestCancelled,
        EntityType::MoneyRequest,
        Some(request.id.to_string()),
        None,
        Some(request.to_json()),
        Severity::Info,
    );

    Ok(request)
}

/// Background sweep: persist EXPIRED for every PENDING request past its
/// deadline. Idempotent; a second run under the same clock does nothing.
pub fn expire_due(now_ns: u64) -> u64 {
    let stale: Vec<MoneyRequest> = REQUESTS.with(|requests| {
        requests
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, r)| r)
            .filter(|r| r.is_stale(now_ns))
            .collect()
    });

    let count = stale.len() as u64;
    for mut request in stale {
        request.status = RequestStatus::Expired;
        request.responded_at = Some(now_ns);
        store(&request);
        audit::log_system(
            now_ns,
            AuditAction::MoneyRequestExpired,
            EntityType::MoneyRequest,
            Some(request.id.to_string()),
            Some(request.to_json()),
            Severity::Info,
        );
    }

    if count > 0 {
        ic_cdk::println!("Expired {} stale money requests", count);
    }
    count
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// A request as presented to readers: a stale PENDING request reads as
/// expired even before the sweep has persisted the transition.
#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct RequestView {
    pub request: MoneyRequest,
    pub effective_status: RequestStatus,
}

impl RequestView {
    pub fn at(request: MoneyRequest, now_ns: u64) -> Self {
        let effective_status = request.effective_status(now_ns);
        RequestView {
            request,
            effective_status,
        }
    }
}

/// Fetch one request; only the two parties (or elevated roles) may read it.
pub fn get_request(caller: Principal, request_id: EntityId, now_ns: u64) -> Result<RequestView> {
    let request = get(request_id).ok_or(Error::RequestNotFound)?;
    if caller != request.requester
        && caller != request.payer
        && !directory::is_admin_or_finance(caller)
    {
        return Err(Error::NotAuthorized);
    }
    Ok(RequestView::at(request, now_ns))
}

/// Requests awaiting the payer's answer, excluding stale ones.
pub fn pending_for_payer(payer: Principal, now_ns: u64) -> Vec<MoneyRequest> {
    REQUESTS.with(|requests| {
        requests
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, r)| r)
            .filter(|r| r.payer == payer && r.is_pending() && r.expires_at > now_ns)
            .collect()
    })
}

fn list_filtered(
    side: impl Fn(&MoneyRequest) -> bool,
    status: Option<RequestStatus>,
    now_ns: u64,
    offset: u64,
    limit: u64,
) -> Vec<RequestView> {
    let mut matching: Vec<MoneyRequest> = REQUESTS.with(|requests| {
        requests
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, r)| r)
            .filter(|r| side(r))
            .filter(|r| status.map_or(true, |s| r.effective_status(now_ns) == s))
            .collect()
    });
    matching.reverse();
    matching
        .into_iter()
        .skip(offset as usize)
        .take(limit.min(200) as usize)
        .map(|r| RequestView::at(r, now_ns))
        .collect()
}

pub fn sent_by(
    requester: Principal,
    status: Option<RequestStatus>,
    now_ns: u64,
    offset: u64,
    limit: u64,
) -> Vec<RequestView> {
    list_filtered(|r| r.requester == requester, status, now_ns, offset, limit)
}

pub fn received_by(
    payer: Principal,
    status: Option<RequestStatus>,
    now_ns: u64,
    offset: u64,
    limit: u64,
) -> Vec<RequestView> {
    list_filtered(|r| r.payer == payer, status, now_ns, offset, limit)
}

/// PENDING requests whose deadline falls within the next `hours`.
pub fn expiring_soon(now_ns: u64, hours: u64) -> Vec<MoneyRequest> {
    let horizon = now_ns + hours * NANOS_PER_HOUR;
    REQUESTS.with(|requests| {
        requests
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .map(|(_, r)| r)
            .filter(|r| r.is_pending() && r.expires_at > now_ns && r.expires_at <= horizon)
            .collect()
    })
}

#[derive(CandidType, Deserialize, Clone, Debug, Default)]
pub struct RequestStatistics {
    pub sent_total: u64,
    pub sent_approved: u64,
    pub sent_declined: u64,
    pub sent_pending: u64,
    pub sent_expired: u64,
    pub received_total: u64,
    pub received_approved: u64,
    pub total_amount_approved: Pence,
}

pub fn statistics_for_user(user: Principal, now_ns: u64) -> RequestStatistics {
    let mut stats = RequestStatistics::default();
    REQUESTS.with(|requests| {
        for (_, r) in requests.borrow().iter().map(|e| e.into_pair()) {
            let status = r.effective_status(now_ns);
            if r.requester == user {
                stats.sent_total += 1;
                match status {
                    RequestStatus::Approved => {
                        stats.sent_approved += 1;
                        stats.total_amount_approved = stats
                            .total_amount_approved
                            .checked_add(r.amount)
                            .expect("approved total in range");
                    }
                    RequestStatus::Declined => stats.sent_declined += 1,
                    RequestStatus::Pending => stats.sent_pending += 1,
                    RequestStatus::Expired => stats.sent_expired += 1,
                }
            }
            if r.payer == user {
                stats.received_total += 1;
                if status == RequestStatus::Approved {
                    stats.received_approved += 1;
                }
            }
        }
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditQuery;
    use crate::config;
    use crate::directory::UserRole;
    use crate::ledger::accounts;

    fn admin() -> Principal {
        Principal::from_slice(&[0xAA; 29])
    }

    fn user(tag: u8) -> Principal {
        Principal::from_slice(&[tag; 29])
    }

    fn ctx_at(caller: Principal, now_ns: u64) -> OperationContext {
        OperationContext::new(caller, now_ns)
    }

    fn setup(balances: &[(Principal, i64)]) {
        config::set_admin(admin(), admin()).unwrap();
        for (i, (p, pounds)) in balances.iter().enumerate() {
            directory::register_user(
                &ctx_at(admin(), 1),
                *p,
                format!("user{}@example.com", i),
                format!("User {}", i),
                UserRole::Employee,
            )
            .unwrap();
            if *pounds != 0 {
                accounts::apply_delta(&ctx_at(admin(), 1), *p, Pence::from_pounds(*pounds)).unwrap();
            }
        }
    }

    fn audit_count(action: AuditAction) -> u64 {
        audit::query_entries(&AuditQuery {
            action: Some(action),
            ..Default::default()
        })
        .total_matching
    }

    #[test]
    fn test_create_validations() {
        let (q, p) = (user(1), user(2));
        setup(&[(q, 0), (p, 0)]);
        let now = 10 * NANOS_PER_DAY;

        assert_eq!(
            create(&ctx_at(q, now), q, Pence::from_pounds(5), None, None).err(),
            Some(Error::SelfTransfer)
        );
        assert_eq!(
            create(&ctx_at(q, now), p, Pence::ZERO, None, None).err(),
            Some(Error::InvalidAmount)
        );
        assert!(matches!(
            create(&ctx_at(q, now), p, Pence::from_pounds(5), None, Some(0)).err(),
            Some(Error::Validation(_))
        ));
        assert!(matches!(
            create(&ctx_at(q, now), p, Pence::from_pounds(5), None, Some(31)).err(),
            Some(Error::Validation(_))
        ));

        let request = create(&ctx_at(q, now), p, Pence::from_pounds(5), None, None).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.expires_at, now + 7 * NANOS_PER_DAY);

        // 30 days is the inclusive maximum.
        let long = create(&ctx_at(p, now), q, Pence::from_pounds(5), None, Some(30)).unwrap();
        assert_eq!(long.expires_at, now + 30 * NANOS_PER_DAY);
    }

    #[test]
    fn test_duplicate_pending_pair_rejected() {
        let (q, p) = (user(1), user(2));
        setup(&[(q, 0), (p, 0)]);
        let now = NANOS_PER_DAY;

        create(&ctx_at(q, now), p, Pence::from_pounds(5), None, None).unwrap();
        assert_eq!(
            create(&ctx_at(q, now), p, Pence::from_pounds(9), None, None).err(),
            Some(Error::DuplicateRequest)
        );

        // The reverse direction is a different pair.
        assert!(create(&ctx_at(p, now), q, Pence::from_pounds(5), None, None).is_ok());

        // Once the first is declined, a new one may be created.
        let pending = pending_for_payer(p, now);
        respond(&ctx_at(p, now + 1), pending[0].id, false).unwrap();
        assert!(create(&ctx_at(q, now + 2), p, Pence::from_pounds(9), None, None).is_ok());
    }

    #[test]
    fn test_approval_transfers_and_finalizes() {
        let (q, p) = (user(1), user(2));
        setup(&[(q, 0), (p, 100)]);
        let now = NANOS_PER_DAY;

        let request =
            create(&ctx_at(q, now), p, Pence::from_pounds(30), Some("rent".into()), Some(7))
                .unwrap();
        let outcome = respond(&ctx_at(p, now + 5), request.id, true).unwrap();

        assert_eq!(outcome.request.status, RequestStatus::Approved);
        assert_eq!(outcome.request.responded_at, Some(now + 5));
        let tx = outcome.tx.unwrap();
        assert_eq!(tx.sender, p);
        assert_eq!(tx.recipient(), Some(q));
        assert_eq!(tx.amount, Pence::from_pounds(30));
        assert_eq!(outcome.request.approved_tx_id, Some(tx.id));

        assert_eq!(accounts::get_account(q).unwrap().balance, Pence::from_pounds(30));
        assert_eq!(accounts::get_account(p).unwrap().balance, Pence::from_pounds(70));
        assert_eq!(audit_count(AuditAction::MoneyRequestApproved), 1);

        // A second approval attempt is rejected, nothing moves again.
        assert_eq!(
            respond(&ctx_at(p, now + 6), request.id, true).err(),
            Some(Error::AlreadyResponded)
        );
        assert_eq!(accounts::get_account(q).unwrap().balance, Pence::from_pounds(30));
    }

    #[test]
    fn test_approval_with_insufficient_payer_funds_stays_pending() {
        let (q, p) = (user(1), user(2));
        setup(&[(q, 0), (p, -240)]);
        let now = NANOS_PER_DAY;

        let request = create(&ctx_at(q, now), p, Pence::from_pounds(20), None, None).unwrap();
        let err = respond(&ctx_at(p, now + 1), request.id, true).err();
        assert!(matches!(err, Some(Error::InsufficientFunds { .. })));

        let request = get(request.id).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(accounts::get_account(p).unwrap().balance, Pence::from_pounds(-240));
        assert_eq!(accounts::get_account(q).unwrap().balance, Pence::ZERO);
        assert_eq!(audit_count(AuditAction::MoneyRequestFailed), 1);
        assert_eq!(audit_count(AuditAction::TransactionFailed), 1);

        // Fund the payer and retry: recoverable.
        accounts::apply_delta(&ctx_at(admin(), now), p, Pence::from_pounds(300)).unwrap();
        assert!(respond(&ctx_at(p, now + 2), request.id, true).is_ok());
    }

    #[test]
    fn test_only_payer_may_respond_and_only_requester_may_cancel() {
        let (q, p, x) = (user(1), user(2), user(3));
        setup(&[(q, 0), (p, 0), (x, 0)]);
        let now = NANOS_PER_DAY;

        let request = create(&ctx_at(q, now), p, Pence::from_pounds(5), None, None).unwrap();
        assert_eq!(respond(&ctx_at(q, now), request.id, true).err(), Some(Error::NotAuthorized));
        assert_eq!(respond(&ctx_at(x, now), request.id, false).err(), Some(Error::NotAuthorized));
        assert_eq!(cancel(&ctx_at(p, now), request.id).err(), Some(Error::NotAuthorized));

        let cancelled = cancel(&ctx_at(q, now + 1), request.id).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Declined);
        assert_eq!(audit_count(AuditAction::MoneyRequestCancelled), 1);
    }

    #[test]
    fn test_stale_request_auto_expires_on_respond() {
        let (q, p) = (user(1), user(2));
        setup(&[(q, 0), (p, 100)]);
        let now = NANOS_PER_DAY;

        let request = create(&ctx_at(q, now), p, Pence::from_pounds(5), None, Some(1)).unwrap();
        let after_expiry = now + 2 * NANOS_PER_DAY;

        assert_eq!(
            respond(&ctx_at(p, after_expiry), request.id, true).err(),
            Some(Error::RequestExpired)
        );
        let request = get(request.id).unwrap();
        assert_eq!(request.status, RequestStatus::Expired);
        assert_eq!(audit_count(AuditAction::MoneyRequestExpired), 1);

        // Terminal: responding again reports AlreadyResponded.
        assert_eq!(
            respond(&ctx_at(p, after_expiry + 1), request.id, false).err(),
            Some(Error::AlreadyResponded)
        );
    }

    #[test]
    fn test_expire_due_sweep_is_idempotent() {
        let (q, p, r) = (user(1), user(2), user(3));
        setup(&[(q, 0), (p, 0), (r, 0)]);
        let now = NANOS_PER_DAY;

        create(&ctx_at(q, now), p, Pence::from_pounds(5), None, Some(1)).unwrap();
        create(&ctx_at(q, now), r, Pence::from_pounds(5), None, Some(3)).unwrap();

        let sweep_at = now + 2 * NANOS_PER_DAY;
        assert_eq!(expire_due(sweep_at), 1);
        assert_eq!(audit_count(AuditAction::MoneyRequestExpired), 1);

        // Second run: same state, no new audit entries.
        assert_eq!(expire_due(sweep_at), 0);
        assert_eq!(audit_count(AuditAction::MoneyRequestExpired), 1);
    }

    #[test]
    fn test_views_present_stale_pending_as_expired() {
        let (q, p) = (user(1), user(2));
        setup(&[(q, 0), (p, 0)]);
        let now = NANOS_PER_DAY;

        create(&ctx_at(q, now), p, Pence::from_pounds(5), None, Some(1)).unwrap();
        let later = now + 3 * NANOS_PER_DAY;

        let sent = sent_by(q, None, later, 0, 10);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request.status, RequestStatus::Pending);
        assert_eq!(sent[0].effective_status, RequestStatus::Expired);

        // And it no longer shows as actionable for the payer.
        assert!(pending_for_payer(p, later).is_empty());
    }

    #[test]
    fn test_get_request_is_party_gated() {
        let (q, p, x) = (user(1), user(2), user(3));
        setup(&[(q, 0), (p, 0), (x, 0)]);
        let now = NANOS_PER_DAY;

        let request = create(&ctx_at(q, now), p, Pence::from_pounds(5), None, None).unwrap();
        assert!(get_request(q, request.id, now).is_ok());
        assert!(get_request(p, request.id, now).is_ok());
        assert_eq!(get_request(x, request.id, now).err(), Some(Error::NotAuthorized));
        assert_eq!(get_request(q, 424242, now).err(), Some(Error::RequestNotFound));
    }

    #[test]
    fn test_expiring_soon_window() {
        let (q, p, r) = (user(1), user(2), user(3));
        setup(&[(q, 0), (p, 0), (r, 0)]);
        let now = NANOS_PER_DAY;

        create(&ctx_at(q, now), p, Pence::from_pounds(5), None, Some(1)).unwrap();
        create(&ctx_at(q, now), r, Pence::from_pounds(5), None, Some(10)).unwrap();

        let soon = expiring_soon(now + 12 * NANOS_PER_HOUR, 24);
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].payer, p);
    }
}
