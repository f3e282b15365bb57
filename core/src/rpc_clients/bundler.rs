use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::{PackedUserOperation, UserOperationReceipt};
use alloy::transports::{IntoBoxTransport, TransportResult};
use serde::{Deserialize, Serialize};

/// A JSON-RPC client for an ERC-4337 bundler endpoint.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    pub(crate) inner: RpcClient,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOpGasEstimation {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    #[serde(alias = "paymasterVerificationGas")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(alias = "paymasterPostOpGas")]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

impl BundlerClient {
    pub fn new(transport: impl IntoBoxTransport) -> Self {
        let client = RpcClient::builder().transport(transport, false);
        Self { inner: client }
    }

    pub(crate) fn from_rpc_client(inner: RpcClient) -> Self {
        Self { inner }
    }

    /// Get a user operation receipt by hash. `None` until the operation is
    /// included on-chain.
    pub async fn get_user_op_receipt(
        &self,
        user_op_hash: Bytes,
    ) -> TransportResult<Option<UserOperationReceipt>> {
        self.inner
            .request("eth_getUserOperationReceipt", [user_op_hash])
            .await
    }

    /// Estimate gas limits for an unsigned user operation.
    pub async fn estimate_user_op_gas(
        &self,
        user_op: &PackedUserOperation,
        entrypoint: Address,
    ) -> TransportResult<UserOpGasEstimation> {
        self.inner
            .request("eth_estimateUserOperationGas", (user_op, entrypoint))
            .await
    }

    /// Submit a signed user operation; returns the operation hash.
    pub async fn send_user_op(
        &self,
        user_op: &PackedUserOperation,
        entrypoint: Address,
    ) -> TransportResult<Bytes> {
        self.inner
            .request("eth_sendUserOperation", (user_op, entrypoint))
            .await
    }
}
