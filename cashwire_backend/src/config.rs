use candid::{CandidType, Principal};
use ic_stable_structures::memory_manager::MemoryId;
use ic_stable_structures::{StableCell, Storable};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cell::RefCell;

use crate::error::Error;
use crate::{Memory, MEMORY_MANAGER};

const CONFIG_MEMORY_ID: u8 = 70;

/// Canister configuration that survives upgrades.
#[derive(Clone, Default, CandidType, Deserialize, Serialize)]
pub struct Config {
    pub admin_principal: Option<Principal>,
}

impl Storable for Config {
    fn to_bytes(&self) -> Cow<[u8]> {
        Cow::Owned(candid::encode_one(self).expect("Failed to encode Config"))
    }

    fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().into_owned()
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        candid::decode_one(&bytes).expect("Failed to decode Config")
    }

    const BOUND: ic_stable_structures::storable::Bound =
        ic_stable_structures::storable::Bound::Bounded {
            max_size: 200,
            is_fixed_size: false,
        };
}

thread_local! {
    static CONFIG: RefCell<StableCell<Config, Memory>> = RefCell::new(
        StableCell::init(
            MEMORY_MANAGER.with(|m| m.borrow().get(MemoryId::new(CONFIG_MEMORY_ID))),
            Config::default(),
        ),
    );
}

pub fn get_admin_principal() -> Option<Principal> {
    CONFIG.with(|c| c.borrow().get().admin_principal)
}

/// Check if caller is the canister admin.
pub fn is_admin(caller: Principal) -> bool {
    CONFIG.with(|c| {
        c.borrow()
            .get()
            .admin_principal
            .map_or(false, |admin| admin == caller)
    })
}

/// Set admin principal. First call bootstraps the admin; subsequent calls
/// require the current admin.
pub fn set_admin(caller: Principal, new_admin: Principal) -> Result<(), Error> {
    CONFIG.with(|c| {
        let mut config = c.borrow().get().clone();

        if let Some(current_admin) = config.admin_principal {
            if caller != current_admin {
                return Err(Error::NotAuthorized);
            }
        }

        config.admin_principal = Some(new_admin);
        c.borrow_mut().set(config);
        Ok(())
    })
}
