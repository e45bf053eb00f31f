//! Per-operation context and id generation.
//!
//! Request identity (caller, client ip, user agent) and the clock reading
//! travel through every mutating call as an explicit value. Nothing in the
//! services reads ambient state, which keeps them drivable from native
//! tests with a synthetic clock.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::StableCell;
use std::cell::RefCell;

use crate::{Memory, MEMORY_MANAGER};

pub const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const NANOS_PER_HOUR: u64 = 3_600 * NANOS_PER_SEC;
pub const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;

/// Opaque 128-bit entity identifier: creation time in the high bits, a
/// persisted sequence in the low bits. Strictly increasing, unique for the
/// lifetime of the canister.
pub type EntityId = u128;

const ID_SEQUENCE_MEMORY_ID: u8 = 5;

thread_local! {
    static ID_SEQUENCE: RefCell<StableCell<u64, Memory>> = RefCell::new(
        StableCell::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(ID_SEQUENCE_MEMORY_ID))),
            0,
        ),
    );
}

pub fn fresh_id(now_ns: u64) -> EntityId {
    let seq = ID_SEQUENCE.with(|cell| {
        let mut cell = cell.borrow_mut();
        let next = cell.get() + 1;
        cell.set(next);
        next
    });
    ((now_ns as u128) << 64) | seq as u128
}

/// Client attributes forwarded by the gateway for the audit trail.
#[derive(CandidType, Deserialize, Clone, Debug, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Identity and clock reading for one mutating operation.
#[derive(Clone, Debug)]
pub struct OperationContext {
    pub caller: Principal,
    pub now_ns: u64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl OperationContext {
    /// Capture the current message's caller and time. Canister-side only.
    pub fn capture(meta: Option<RequestMeta>) -> Self {
        let meta = meta.unwrap_or_default();
        OperationContext {
            caller: ic_cdk::api::msg_caller(),
            now_ns: ic_cdk::api::time(),
            ip_address: meta.ip_address,
            user_agent: meta.user_agent,
        }
    }

    /// Context for timer-driven work with no originating caller.
    pub fn system(now_ns: u64) -> Self {
        OperationContext {
            caller: Principal::anonymous(),
            now_ns,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Explicit construction, used by tests and internal callers.
    pub fn new(caller: Principal, now_ns: u64) -> Self {
        OperationContext {
            caller,
            now_ns,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn fresh_id(&self) -> EntityId {
        fresh_id(self.now_ns)
    }
}
