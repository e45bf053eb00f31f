//! User directory.
//!
//! The identity provider in front of the gateway mints stable principals;
//! this module holds the employment attributes the core needs: whether the
//! user is active and which role they carry. Registering a user also creates
//! their ledger account, so the 1:1 account-per-user invariant holds from
//! the first message that knows about the user.

use candid::{CandidType, Deserialize, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::storable::Bound;
use ic_stable_structures::{StableBTreeMap, Storable};
use serde::Serialize;
use serde_json::json;
use std::borrow::Cow;
use std::cell::RefCell;

use crate::audit::{self, AuditAction, EntityType, Severity};
use crate::context::OperationContext;
use crate::error::{Error, Result};
use crate::{config, ledger};
use crate::{Memory, MEMORY_MANAGER};

const USERS_MEMORY_ID: u8 = 10;

const MAX_NAME_LEN: usize = 255;
const MAX_EMAIL_LEN: usize = 255;

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserRole {
    Employee,
    Admin,
    Finance,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Employee => "EMPLOYEE",
            UserRole::Admin => "ADMIN",
            UserRole::Finance => "FINANCE",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Suspended,
    Closed,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Suspended => "SUSPENDED",
            UserStatus::Closed => "CLOSED",
        }
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug)]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: u64,
}

impl Storable for UserRecord {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode UserRecord"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode UserRecord")
    }

    const BOUND: Bound = Bound::Bounded {
        max_size: 1024,
        is_fixed_size: false,
    };
}

/// The read shape handed to callers; includes the principal.
#[derive(CandidType, Deserialize, Clone, Debug)]
pub struct UserProfile {
    pub user_id: Principal,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: u64,
}

impl UserProfile {
    fn from_record(user_id: Principal, record: UserRecord) -> Self {
        UserProfile {
            user_id,
            email: record.email,
            name: record.name,
            role: record.role,
            status: record.status,
            created_at: record.created_at,
        }
    }
}

thread_local! {
    static USERS: RefCell<StableBTreeMap<Principal, UserRecord, Memory>> = RefCell::new(
        StableBTreeMap::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(USERS_MEMORY_ID))),
        )
    );
}

fn require_registrar(caller: Principal) -> Result<()> {
    if config::is_admin(caller) {
        return Ok(());
    }
    match lookup(caller) {
        Some(rec) if rec.status == UserStatus::Active && rec.role == UserRole::Admin => Ok(()),
        _ => Err(Error::NotAuthorized),
    }
}

/// Register a user and create their ledger account. Admin-gated.
pub fn register_user(
    ctx: &OperationContext,
    user: Principal,
    email: String,
    name: String,
    role: UserRole,
) -> Result<UserProfile> {
    require_registrar(ctx.caller)?;

    if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "Name is required and cannot exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    if email.trim().is_empty() || email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        return Err(Error::Validation("A valid email address is required".to_string()));
    }
    if lookup(user).is_some() {
        return Err(Error::Validation("User is already registered".to_string()));
    }

    let record = UserRecord {
        email,
        name,
        role,
        status: UserStatus::Active,
        created_at: ctx.now_ns,
    };
    USERS.with(|users| {
        users.borrow_mut().insert(user, record.clone());
    });

    audit::log_action(
        ctx,
        AuditAction::UserCreated,
        EntityType::User,
        Some(user.to_text()),
        None,
        Some(json!({
            "email": record.email,
            "name": record.name,
            "role": record.role.as_str(),
            "status": record.status.as_str(),
        })),
        Severity::Info,
    );

    ledger::create_account(ctx, user);

    Ok(UserProfile::from_record(user, record))
}

/// Change a user's status. Admin-gated. Suspending or closing a user stops
/// all money movement on their behalf but never destroys their account row.
pub fn set_user_status(
    ctx: &OperationContext,
    user: Principal,
    status: UserStatus,
) -> Result<UserProfile> {
    require_registrar(ctx.caller)?;

    let mut record = lookup(user).ok_or(Error::UserNotFound(user))?;
    let old_status = record.status;
    record.status = status;
    USERS.with(|users| {
        users.borrow_mut().insert(user, record.clone());
    });

    let action = if status == UserStatus::Active {
        AuditAction::UserUpdated
    } else {
        AuditAction::UserDeactivated
    };
    audit::log_action(
        ctx,
        action,
        EntityType::User,
        Some(user.to_text()),
        Some(json!({ "status": old_status.as_str() })),
        Some(json!({ "status": status.as_str() })),
        Severity::Info,
    );

    Ok(UserProfile::from_record(user, record))
}

pub fn lookup(user: Principal) -> Option<UserRecord> {
    USERS.with(|users| users.borrow().get(&user))
}

pub fn profile(user: Principal) -> Option<UserProfile> {
    lookup(user).map(|rec| UserProfile::from_record(user, rec))
}

/// Fetch the record behind `user`, rejecting unknown or non-active users.
pub fn require_active(user: Principal) -> Result<UserRecord> {
    let record = lookup(user).ok_or(Error::UserNotFound(user))?;
    if record.status != UserStatus::Active {
        return Err(Error::UserInactive(user));
    }
    Ok(record)
}

/// Elevated-permission check used by the event pool lifecycle.
pub fn is_admin_or_finance(user: Principal) -> bool {
    matches!(
        lookup(user),
        Some(UserRecord {
            status: UserStatus::Active,
            role: UserRole::Admin | UserRole::Finance,
            ..
        })
    )
}

pub fn list_users(offset: u64, limit: u64) -> Vec<UserProfile> {
    USERS.with(|users| {
        users
            .borrow()
            .iter()
            .map(|e| e.into_pair())
            .skip(offset as usize)
            .take(limit.min(200) as usize)
            .map(|(p, rec)| UserProfile::from_record(p, rec))
            .collect()
    })
}

pub fn user_count() -> u64 {
    USERS.with(|users| users.borrow().len())
}
