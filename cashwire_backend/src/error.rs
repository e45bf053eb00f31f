//! Domain error taxonomy.
//!
//! Every error that crosses the canister boundary carries a stable
//! machine-readable code plus a human-facing message. Validation failures
//! never leave partial state behind; the ledger additionally records a
//! FAILED transaction and audit entry for rejected money movements.

use crate::amount::Pence;
use candid::{CandidType, Deserialize, Principal};
use std::fmt;

#[derive(CandidType, Deserialize, Clone, Debug, PartialEq)]
pub enum Error {
    AccountNotFound(Principal),
    UserNotFound(Principal),
    UserInactive(Principal),
    SelfTransfer,
    InvalidAmount,
    InsufficientFunds { balance: Pence, change: Pence },
    BalanceLimitExceeded { balance: Pence, change: Pence },
    TooManyRecipients { count: usize },
    AlreadyResponded,
    RequestExpired,
    RequestNotFound,
    DuplicateRequest,
    NotAuthorized,
    EventInactive,
    EventNotFound,
    DeadlinePassed,
    CancelWithContributions,
    StoreTimeout,
    Validation(String),
}

impl Error {
    /// Stable identifier consumed by the gateway; messages may change,
    /// codes may not.
    pub fn code(&self) -> &'static str {
        match self {
            Error::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Error::UserNotFound(_) => "USER_NOT_FOUND",
            Error::UserInactive(_) => "USER_INACTIVE",
            Error::SelfTransfer => "SELF_TRANSFER",
            Error::InvalidAmount => "INVALID_AMOUNT",
            Error::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Error::BalanceLimitExceeded { .. } => "BALANCE_LIMIT_EXCEEDED",
            Error::TooManyRecipients { .. } => "TOO_MANY_RECIPIENTS",
            Error::AlreadyResponded => "ALREADY_RESPONDED",
            Error::RequestExpired => "REQUEST_EXPIRED",
            Error::RequestNotFound => "REQUEST_NOT_FOUND",
            Error::DuplicateRequest => "DUPLICATE_REQUEST",
            Error::NotAuthorized => "NOT_AUTHORIZED",
            Error::EventInactive => "EVENT_INACTIVE",
            Error::EventNotFound => "EVENT_NOT_FOUND",
            Error::DeadlinePassed => "DEADLINE_PASSED",
            Error::CancelWithContributions => "CANCEL_WITH_CONTRIBUTIONS",
            Error::StoreTimeout => "STORE_TIMEOUT",
            Error::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AccountNotFound(user) => write!(f, "No account exists for user {}", user),
            Error::UserNotFound(user) => write!(f, "Unknown user {}", user),
            Error::UserInactive(user) => write!(f, "User {} is not active", user),
            Error::SelfTransfer => write!(f, "Cannot send money to yourself"),
            Error::InvalidAmount => write!(f, "Amount must be a positive decimal"),
            Error::InsufficientFunds { balance, change } => write!(
                f,
                "Transaction would exceed overdraft limit. Current: {}, Change: {}",
                balance, change
            ),
            Error::BalanceLimitExceeded { balance, change } => write!(
                f,
                "Transaction would exceed maximum balance. Current: {}, Change: {}",
                balance, change
            ),
            Error::TooManyRecipients { count } => {
                write!(f, "Too many recipients: {} (maximum 50)", count)
            }
            Error::AlreadyResponded => write!(f, "This request has already been responded to"),
            Error::RequestExpired => write!(f, "This request has expired"),
            Error::RequestNotFound => write!(f, "Money request not found"),
            Error::DuplicateRequest => {
                write!(f, "You already have a pending request to this user")
            }
            Error::NotAuthorized => write!(f, "You are not authorized to perform this action"),
            Error::EventInactive => write!(f, "Event account is not accepting contributions"),
            Error::EventNotFound => write!(f, "Event account not found"),
            Error::DeadlinePassed => write!(f, "Event deadline has passed"),
            Error::CancelWithContributions => write!(
                f,
                "Cannot cancel event with existing contributions. Close the event instead"
            ),
            Error::StoreTimeout => write!(f, "Operation already in progress, retry shortly"),
            Error::Validation(msg) => write!(f, "{}", msg),
        }
    }
}

/// The `{code, message}` pair that crosses the canister boundary.
#[derive(CandidType, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<Error> for ErrorBody {
    fn from(err: Error) -> Self {
        ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
