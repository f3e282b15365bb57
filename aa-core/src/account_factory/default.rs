use alloy::primitives::{Address, Bytes};
use wallet_core::constants::{DEFAULT_FACTORY_ADDRESS, DEFAULT_IMPLEMENTATION_ADDRESS};

use super::{AccountFactory, generate_salt, predict_clone_address};

/// The factory every passkey-derived account deploys through. Address
/// prediction is pure: owner + salt fully determine the account address,
/// which is what lets sign-in recompute an address without chain access.
pub struct DefaultAccountFactory {
    pub factory_address: Address,
    pub implementation_address: Address,
}

impl DefaultAccountFactory {
    pub fn new() -> Self {
        Self {
            factory_address: DEFAULT_FACTORY_ADDRESS,
            implementation_address: DEFAULT_IMPLEMENTATION_ADDRESS,
        }
    }

    pub fn with_addresses(factory_address: Address, implementation_address: Address) -> Self {
        Self {
            factory_address,
            implementation_address,
        }
    }
}

impl Default for DefaultAccountFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountFactory for DefaultAccountFactory {
    fn factory_address(&self) -> &Address {
        &self.factory_address
    }

    fn predict_address(&self, owner: &Address, salt_data: &Bytes) -> Address {
        let salt = generate_salt(owner, salt_data);
        predict_clone_address(self.implementation_address, salt, self.factory_address)
    }
}
