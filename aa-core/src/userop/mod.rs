use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{Address, B256, Bytes};
use alloy::rpc::types::PackedUserOperation;
use wallet_core::{
    account::Account,
    chain::Chain,
    constants::ENTRYPOINT_ADDRESS_V0_7,
    credentials::{Key, PasskeyAuthenticator},
    error::{AlloyRpcErrorToWalletError, WalletError},
    rpc_clients::PaymasterClient,
    transaction::Call,
    userop::compute_user_op_hash,
};

mod builder;

pub use builder::{UserOpBuilder, UserOpBuilderConfig};

use crate::account_factory::{AccountFactory, DefaultAccountFactory};
use crate::signer::UserOpSigner;
use crate::smart_account::{DeterminedSmartAccount, SmartAccount};

/// Where gas sponsorship comes from for a prepared operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SponsorshipPolicy {
    /// Use the active chain's configured paymaster when one exists.
    ChainDefault,
    /// A paymaster endpoint the caller requested through capabilities.
    Capability { url: String },
    /// No sponsorship; the account pays its own prefund.
    SelfFunded,
}

/// A prepared-but-unsigned operation. Quotes age, so these are recomputed
/// while the confirmation surface is open; the generation counter marks
/// which copy is current.
#[derive(Debug, Clone)]
pub struct PreparedUserOperation {
    pub op: PackedUserOperation,
    pub chain_id: u64,
    pub entrypoint: Address,
    pub sponsored: bool,
    generation: u64,
}

impl PreparedUserOperation {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// A signed operation, ready for exactly one submission.
#[derive(Debug, Clone)]
pub struct SignedUserOperation {
    op: PackedUserOperation,
    chain_id: u64,
    entrypoint: Address,
    pub user_op_hash: B256,
}

impl SignedUserOperation {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// The account-abstraction transaction pipeline: prepare, sign, send.
///
/// One pipeline instance serves one in-flight request; the generation
/// counter guarantees only the most recently prepared operation can be
/// signed, and `send` consumes the signed operation so a submission cannot
/// be replayed without re-preparing.
pub struct UserOpPipeline {
    signer: UserOpSigner,
    generation: AtomicU64,
}

impl UserOpPipeline {
    pub fn new(authenticator: Arc<dyn PasskeyAuthenticator>) -> Self {
        Self {
            signer: UserOpSigner::new(authenticator),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn prepare<C: Chain>(
        &self,
        chain: &C,
        account: &Account,
        calls: &[Call],
        sponsorship: &SponsorshipPolicy,
    ) -> Result<PreparedUserOperation, WalletError> {
        if calls.is_empty() {
            return Err(WalletError::validation("empty call batch"));
        }

        let key = account
            .key
            .as_ref()
            .filter(|key| key.can_sign)
            .ok_or_else(|| WalletError::Unauthorized {
                address: account.address.to_string(),
            })?;
        let owner = key.owner_address()?;

        let smart_account = DeterminedSmartAccount {
            address: account.address,
        };
        let call_data = smart_account.encode_calls(calls);
        let is_deployed = smart_account.is_deployed(chain).await?;

        let factory = DefaultAccountFactory::new();
        let init_call_data = if is_deployed {
            Vec::new()
        } else {
            factory.init_calldata(owner, Bytes::default())
        };

        let paymaster: Option<PaymasterClient> = match sponsorship {
            SponsorshipPolicy::SelfFunded => None,
            SponsorshipPolicy::ChainDefault => chain.paymaster_client().cloned(),
            SponsorshipPolicy::Capability { url } => Some(PaymasterClient::for_url(url)?),
        };
        let sponsored = paymaster.is_some();

        let op = UserOpBuilder::new(UserOpBuilderConfig {
            account_address: account.address,
            entrypoint: ENTRYPOINT_ADDRESS_V0_7,
            factory_address: *factory.factory_address(),
            call_data,
            init_call_data,
            is_deployed,
            paymaster,
            chain,
        })
        .build()
        .await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, sponsored, "userop prepared");

        Ok(PreparedUserOperation {
            op,
            chain_id: chain.chain_id(),
            entrypoint: ENTRYPOINT_ADDRESS_V0_7,
            sponsored,
            generation,
        })
    }

    /// Sign the most recently prepared operation. A stale generation means
    /// a refresh happened after this copy was taken; signing it would
    /// submit outdated gas or sponsorship data.
    pub async fn sign(
        &self,
        prepared: PreparedUserOperation,
        key: &Key,
    ) -> Result<SignedUserOperation, WalletError> {
        let latest = self.generation.load(Ordering::SeqCst);
        if prepared.generation != latest {
            return Err(WalletError::validation(
                "prepared user operation superseded by a newer quote",
            ));
        }

        let user_op_hash =
            compute_user_op_hash(&prepared.op, prepared.entrypoint, prepared.chain_id)?;
        let signature = self.signer.sign_hash(key, user_op_hash).await?;

        let mut op = prepared.op;
        op.signature = signature;

        Ok(SignedUserOperation {
            op,
            chain_id: prepared.chain_id,
            entrypoint: prepared.entrypoint,
            user_op_hash,
        })
    }

    /// Submit to the bundler. Consumes the signed operation: retrying a
    /// send requires going back through `prepare`.
    pub async fn send<C: Chain>(
        &self,
        chain: &C,
        signed: SignedUserOperation,
    ) -> Result<Bytes, WalletError> {
        if signed.chain_id != chain.chain_id() {
            return Err(WalletError::ChainDisconnected {
                requested: signed.chain_id,
                active: chain.chain_id(),
            });
        }

        let hash = chain
            .bundler_client()
            .send_user_op(&signed.op, signed.entrypoint)
            .await
            .map_err(|err| err.to_bundler_error(chain))?;

        tracing::info!(user_op_hash = %signed.user_op_hash, "user operation submitted");

        Ok(hash)
    }
}
