use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::PackedUserOperation;
use alloy::transports::http::reqwest::{ClientBuilder as HttpClientBuilder, Url};
use alloy::transports::{IntoBoxTransport, TransportResult};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::rpc_clients::transport::TransportPool;

/// Sponsorship data returned by `pm_sponsorUserOperation`.
///
/// Gas limits are optional: a paymaster that omits them forces the caller
/// to fall back to bundler estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterSponsorship {
    pub paymaster: Address,
    pub paymaster_data: Bytes,
    pub pre_verification_gas: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub call_gas_limit: Option<U256>,
    pub paymaster_verification_gas_limit: Option<U256>,
    pub paymaster_post_op_gas_limit: Option<U256>,
}

/// A JSON-RPC client for an ERC-4337 paymaster endpoint.
#[derive(Debug, Clone)]
pub struct PaymasterClient {
    pub(crate) inner: RpcClient,
}

impl PaymasterClient {
    pub fn new(transport: impl IntoBoxTransport) -> Self {
        let client = RpcClient::builder().transport(transport, false);
        Self { inner: client }
    }

    pub(crate) fn from_rpc_client(inner: RpcClient) -> Self {
        Self { inner }
    }

    /// Client for a caller-supplied sponsorship endpoint (the
    /// `paymasterService` capability).
    pub fn for_url(url: &str) -> Result<Self, WalletError> {
        let url = Url::parse(url).map_err(|e| WalletError::RpcConfigError {
            message: format!("Failed to parse paymaster URL: {e}"),
        })?;
        let client = HttpClientBuilder::new()
            .build()
            .map_err(|e| WalletError::RpcConfigError {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self::new(TransportPool::new(client).transport(url)))
    }

    /// Request gas sponsorship for a user operation.
    pub async fn sponsor_user_op(
        &self,
        user_op: &PackedUserOperation,
        entrypoint: Address,
    ) -> TransportResult<PaymasterSponsorship> {
        self.inner
            .request("pm_sponsorUserOperation", (user_op, entrypoint))
            .await
    }
}
