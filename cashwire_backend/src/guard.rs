use candid::Principal;
use std::cell::RefCell;
use std::collections::BTreeSet;

use crate::error::Error;

thread_local! {
    static PENDING_OPERATIONS: RefCell<BTreeSet<Principal>> = RefCell::new(BTreeSet::new());
}

/// Guard serializing mutating operations per caller.
/// Uses RAII pattern to automatically cleanup on drop.
///
/// Update messages execute one at a time, so today the guard can only
/// conflict with a message of the same caller suspended at an await point.
/// Acquisition failure is the lock-wait analogue and surfaces as the
/// retryable STORE_TIMEOUT error.
pub struct OperationGuard {
    caller: Principal,
}

impl OperationGuard {
    pub fn acquire(caller: Principal) -> Result<Self, Error> {
        PENDING_OPERATIONS.with(|ops| {
            let mut ops = ops.borrow_mut();
            if ops.contains(&caller) {
                return Err(Error::StoreTimeout);
            }
            ops.insert(caller);
            Ok(Self { caller })
        })
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        PENDING_OPERATIONS.with(|ops| {
            ops.borrow_mut().remove(&self.caller);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_prevents_concurrent_operations() {
        let caller = Principal::from_slice(&[1; 29]);

        let _guard1 = OperationGuard::acquire(caller).unwrap();

        // Second guard from same caller should fail
        let guard2 = OperationGuard::acquire(caller);
        assert_eq!(guard2.err(), Some(Error::StoreTimeout));

        // A different caller is unaffected
        let other = Principal::from_slice(&[2; 29]);
        assert!(OperationGuard::acquire(other).is_ok());
    }

    #[test]
    fn test_guard_cleanup_on_drop() {
        let caller = Principal::from_slice(&[3; 29]);
        {
            let _guard = OperationGuard::acquire(caller).unwrap();
        } // Guard dropped here

        assert!(OperationGuard::acquire(caller).is_ok());
    }
}
