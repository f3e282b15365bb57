use alloy::{
    primitives::{Address, Bytes, U256},
    providers::Provider,
    sol,
    sol_types::SolCall,
};
use wallet_core::{
    chain::Chain,
    error::{AlloyRpcErrorToWalletError, WalletError},
    transaction::Call,
};

use crate::account_factory::{AccountFactory, DefaultAccountFactory};

sol! {
    function execute(address target, uint256 value, bytes data);
}

sol! {
    function executeBatch(address[] target, uint256[] value, bytes[] data);
}

pub trait SmartAccount {
    fn address(&self) -> &Address;

    /// Whether the account contract exists on-chain yet. Undeployed
    /// accounts carry factory init data in their first user operation.
    #[allow(async_fn_in_trait)]
    async fn is_deployed(&self, chain: &impl Chain) -> Result<bool, WalletError> {
        let code = chain
            .provider()
            .get_code_at(*self.address())
            .await
            .map_err(|err| err.to_wallet_error(chain))?;

        Ok(!code.is_empty())
    }

    /// Native-token balance, for the self-pay prefund check.
    #[allow(async_fn_in_trait)]
    async fn balance(&self, chain: &impl Chain) -> Result<U256, WalletError> {
        chain
            .provider()
            .get_balance(*self.address())
            .await
            .map_err(|err| err.to_wallet_error(chain))
    }

    /// Encode a call batch into the account's native call encoding. A batch
    /// of one uses the single-call entry to keep calldata small.
    fn encode_calls(&self, calls: &[Call]) -> Bytes {
        match calls {
            [call] => executeCall {
                target: call.target(),
                value: call.value,
                data: call.data.clone(),
            }
            .abi_encode()
            .into(),
            batch => executeBatchCall {
                target: batch.iter().map(|call| call.target()).collect(),
                value: batch.iter().map(|call| call.value).collect(),
                data: batch.iter().map(|call| call.data.clone()).collect(),
            }
            .abi_encode()
            .into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeterminedSmartAccount {
    pub address: Address,
}

impl SmartAccount for DeterminedSmartAccount {
    fn address(&self) -> &Address {
        &self.address
    }
}

/// Resolve the smart account bound to a passkey owner, without chain access.
pub struct SmartAccountFromOwner<'a> {
    pub owner_address: Address,
    pub salt_data: &'a Bytes,
}

impl SmartAccountFromOwner<'_> {
    pub fn to_determined_smart_account(&self) -> DeterminedSmartAccount {
        let factory = DefaultAccountFactory::new();
        DeterminedSmartAccount {
            address: factory.predict_address(&self.owner_address, self.salt_data),
        }
    }
}

/// Helper used by login flows: the account address a verified passkey
/// public key maps to.
pub fn account_address_for_public_key(public_key: &[u8]) -> Result<Address, WalletError> {
    let owner = wallet_core::credentials::owner_address_from_public_key(public_key)?;
    Ok(SmartAccountFromOwner {
        owner_address: owner,
        salt_data: &Bytes::default(),
    }
    .to_determined_smart_account()
    .address)
}
