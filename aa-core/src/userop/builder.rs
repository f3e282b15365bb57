use alloy::{
    primitives::{Address, Bytes, U256, aliases::U192},
    providers::Provider,
    rpc::types::PackedUserOperation,
    sol,
};
use wallet_core::{
    chain::Chain,
    error::{AlloyRpcErrorToWalletError, ContractErrorToWalletError, WalletError},
    rpc_clients::PaymasterClient,
    userop::required_prefund,
};

use crate::signer::encode_webauthn_signature;
use wallet_core::credentials::WebAuthnAssertion;

sol! {
    #[sol(rpc)]
    contract EntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// Placeholder signature used during gas estimation. Bundlers reject
/// operations whose signature field does not match the shape the account
/// will verify, so the dummy is a fully-formed WebAuthn envelope.
fn dummy_signature() -> Bytes {
    encode_webauthn_signature(&WebAuthnAssertion {
        credential_id: String::new(),
        authenticator_data: Bytes::from(vec![0xff; 37]),
        client_data_json:
            r#"{"type":"webauthn.get","challenge":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA","origin":"https://wallet.invalid"}"#
                .into(),
        r: U256::MAX >> 1,
        s: U256::MAX >> 2,
    })
}

pub struct UserOpBuilderConfig<'a, C: Chain> {
    pub account_address: Address,
    pub entrypoint: Address,
    pub factory_address: Address,
    pub call_data: Bytes,
    /// Factory calldata for the deployment operation; empty once deployed.
    pub init_call_data: Vec<u8>,
    pub is_deployed: bool,
    /// Resolved sponsorship endpoint, if any. `None` means self-funded.
    pub paymaster: Option<PaymasterClient>,
    pub chain: &'a C,
}

pub struct UserOpBuilder<'a, C: Chain> {
    config: UserOpBuilderConfig<'a, C>,
}

impl<'a, C: Chain> UserOpBuilder<'a, C> {
    pub fn new(config: UserOpBuilderConfig<'a, C>) -> Self {
        Self { config }
    }

    /// Construct an unsigned user operation: nonce, gas pricing, optional
    /// paymaster sponsorship, and gas limits, in that order.
    pub async fn build(self) -> Result<PackedUserOperation, WalletError> {
        let config = &self.config;
        let chain = config.chain;

        let entrypoint = EntryPoint::new(config.entrypoint, chain.provider().clone());
        let nonce = entrypoint
            .getNonce(config.account_address, U192::ZERO)
            .call()
            .await
            .map_err(|err| err.to_wallet_error(chain.chain_id()))?;

        let fees = chain
            .provider()
            .estimate_eip1559_fees()
            .await
            .map_err(|err| err.to_wallet_error(chain))?;

        tracing::debug!(
            nonce = %nonce,
            max_fee_per_gas = fees.max_fee_per_gas,
            "userop base fields determined"
        );

        let (factory, factory_data) = if config.is_deployed {
            (None, None)
        } else {
            (
                Some(config.factory_address),
                Some(Bytes::from(config.init_call_data.clone())),
            )
        };

        let mut userop = PackedUserOperation {
            sender: config.account_address,
            nonce,
            factory,
            factory_data,
            call_data: config.call_data.clone(),
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::from(fees.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(fees.max_priority_fee_per_gas),
            paymaster: None,
            paymaster_data: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            signature: dummy_signature(),
        };

        match &config.paymaster {
            Some(paymaster) => {
                let sponsorship = paymaster
                    .sponsor_user_op(&userop, config.entrypoint)
                    .await
                    .map_err(|err| err.to_paymaster_error(chain))?;

                tracing::debug!(paymaster = %sponsorship.paymaster, "sponsorship granted");

                userop.paymaster = Some(sponsorship.paymaster);
                userop.paymaster_data = Some(sponsorship.paymaster_data.clone());

                match (
                    sponsorship.call_gas_limit,
                    sponsorship.verification_gas_limit,
                    sponsorship.pre_verification_gas,
                ) {
                    (Some(call), Some(verification), Some(pre)) => {
                        userop.call_gas_limit = call;
                        userop.verification_gas_limit = verification;
                        userop.pre_verification_gas = pre;
                        userop.paymaster_verification_gas_limit =
                            sponsorship.paymaster_verification_gas_limit;
                        userop.paymaster_post_op_gas_limit =
                            sponsorship.paymaster_post_op_gas_limit;
                    }
                    _ => {
                        tracing::debug!("paymaster omitted gas limits, estimating via bundler");
                        self.apply_bundler_estimate(&mut userop).await?;
                    }
                }
            }
            None => {
                self.apply_bundler_estimate(&mut userop).await?;

                // Self-funded: refuse to go anywhere near signing when the
                // account cannot cover the prefund.
                let balance = chain
                    .provider()
                    .get_balance(config.account_address)
                    .await
                    .map_err(|err| err.to_wallet_error(chain))?;
                let required = required_prefund(&userop);
                if balance < required {
                    return Err(WalletError::InsufficientBalance {
                        address: config.account_address.to_string(),
                        balance: balance.to_string(),
                        required: required.to_string(),
                    });
                }
            }
        }

        Ok(userop)
    }

    async fn apply_bundler_estimate(
        &self,
        userop: &mut PackedUserOperation,
    ) -> Result<(), WalletError> {
        let estimate = self
            .config
            .chain
            .bundler_client()
            .estimate_user_op_gas(userop, self.config.entrypoint)
            .await
            .map_err(|err| err.to_bundler_error(self.config.chain))?;

        userop.call_gas_limit = estimate.call_gas_limit;
        userop.verification_gas_limit = estimate.verification_gas_limit;
        userop.pre_verification_gas = estimate.pre_verification_gas;
        if userop.paymaster.is_some() {
            userop.paymaster_verification_gas_limit =
                estimate.paymaster_verification_gas_limit;
            userop.paymaster_post_op_gas_limit = estimate.paymaster_post_op_gas_limit;
        }
        Ok(())
    }
}
