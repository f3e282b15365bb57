use std::time::Duration;

use alloy::primitives::{B256, Bytes};
use alloy::rpc::types::UserOperationReceipt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use wallet_core::{
    chain::{Chain, ConfiguredChain},
    error::{AlloyRpcErrorToWalletError, WalletError},
};

/// Where receipts come from. The bundler client is the production source;
/// tests substitute scripted ones.
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    async fn user_op_receipt(
        &self,
        user_op_hash: Bytes,
    ) -> Result<Option<UserOperationReceipt>, WalletError>;
}

#[async_trait]
impl ReceiptSource for ConfiguredChain {
    async fn user_op_receipt(
        &self,
        user_op_hash: Bytes,
    ) -> Result<Option<UserOperationReceipt>, WalletError> {
        self.bundler_client()
            .get_user_op_receipt(user_op_hash)
            .await
            .map_err(|err| err.to_bundler_error(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatusCode {
    Pending,
    Confirmed,
}

/// Receipt fields surfaced to the dApp. `success` is the execution outcome;
/// a reverted-but-included operation still confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    pub success: bool,
    pub transaction_hash: B256,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatus {
    pub status: CallStatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipts: Option<Vec<CallReceipt>>,
}

impl CallStatus {
    pub fn pending() -> Self {
        Self {
            status: CallStatusCode::Pending,
            receipts: None,
        }
    }

    fn confirmed(receipt: &UserOperationReceipt) -> Self {
        Self {
            status: CallStatusCode::Confirmed,
            receipts: Some(vec![CallReceipt {
                success: receipt.success,
                transaction_hash: receipt.receipt.transaction_hash,
                block_hash: receipt.receipt.block_hash,
                block_number: receipt.receipt.block_number,
                gas_used: receipt.receipt.gas_used,
            }]),
        }
    }

    pub fn transaction_hash(&self) -> Option<B256> {
        self.receipts
            .as_ref()
            .and_then(|receipts| receipts.first())
            .map(|receipt| receipt.transaction_hash)
    }
}

/// Default per-poll timeout. Callers that must block until inclusion (the
/// legacy single-transaction method) pass a longer one, up to the ceiling.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Normalizes bundler receipt polling into `Pending -> Confirmed`.
///
/// A poll that runs out of time (or hits a transient transport error)
/// reports `Pending` rather than failing: the operation may still confirm
/// later, and callers are expected to re-poll. Polling is idempotent and
/// holds no state between calls.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    pub poll_interval: Duration,
    pub default_timeout: Duration,
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            default_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl StatusPoller {
    pub async fn poll(
        &self,
        source: &impl ReceiptSource,
        user_op_hash: Bytes,
        timeout: Option<Duration>,
    ) -> CallStatus {
        let timeout = timeout.unwrap_or(self.default_timeout).min(MAX_POLL_TIMEOUT);
        let deadline = Instant::now() + timeout;

        loop {
            match source.user_op_receipt(user_op_hash.clone()).await {
                Ok(Some(receipt)) => {
                    tracing::debug!(
                        user_op_hash = %user_op_hash,
                        success = receipt.success,
                        "user operation confirmed on-chain"
                    );
                    return CallStatus::confirmed(&receipt);
                }
                Ok(None) => {}
                Err(err) => {
                    // Transient transport failures are indistinguishable
                    // from "not yet included" for the caller's purposes.
                    tracing::debug!(error = %err, "receipt query failed, treating as pending");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return CallStatus::pending();
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use std::sync::Mutex;

    struct ScriptedSource {
        /// `None` entries are "no receipt yet"; the poller should keep
        /// asking until one appears or time runs out.
        responses: Mutex<Vec<Option<UserOperationReceipt>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Option<UserOperationReceipt>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl ReceiptSource for ScriptedSource {
        async fn user_op_receipt(
            &self,
            _user_op_hash: Bytes,
        ) -> Result<Option<UserOperationReceipt>, WalletError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(None)
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn receipt(success: bool) -> UserOperationReceipt {
        serde_json::from_value(serde_json::json!({
            "userOpHash": B256::from([1u8; 32]),
            "entryPoint": Address::ZERO,
            "sender": Address::ZERO,
            "nonce": "0x7",
            "paymaster": Address::ZERO,
            "actualGasCost": "0x1",
            "actualGasUsed": "0x1",
            "success": success,
            "reason": "",
            "logs": [],
            "receipt": {
                "transactionHash": B256::from([2u8; 32]),
                "transactionIndex": "0x0",
                "blockHash": B256::from([3u8; 32]),
                "blockNumber": "0x64",
                "from": Address::ZERO,
                "to": null,
                "cumulativeGasUsed": "0x5208",
                "gasUsed": "0x5208",
                "contractAddress": null,
                "logs": [],
                "logsBloom": format!("0x{}", "00".repeat(256)),
                "status": "0x1",
                "effectiveGasPrice": "0x1",
                "type": "0x2"
            }
        }))
        .expect("receipt fixture deserializes")
    }

    fn fast_poller() -> StatusPoller {
        StatusPoller {
            poll_interval: Duration::from_millis(10),
            default_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn timeout_without_receipt_is_pending_not_an_error() {
        let poller = fast_poller();
        let source = ScriptedSource::new(vec![]);

        for _ in 0..3 {
            let status = poller.poll(&source, Bytes::from(vec![1]), None).await;
            assert_eq!(status.status, CallStatusCode::Pending);
            assert!(status.receipts.is_none());
        }
    }

    #[tokio::test]
    async fn receipt_appearing_mid_poll_confirms() {
        let poller = fast_poller();
        let source = ScriptedSource::new(vec![None, None, Some(receipt(true))]);

        let status = poller
            .poll(
                &source,
                Bytes::from(vec![1]),
                Some(Duration::from_secs(5)),
            )
            .await;

        assert_eq!(status.status, CallStatusCode::Confirmed);
        let receipts = status.receipts.unwrap();
        assert_eq!(receipts.len(), 1);
        assert!(receipts[0].success);
        assert_eq!(status.transaction_hash(), Some(B256::from([2u8; 32])));
    }

    #[tokio::test]
    async fn reverted_but_included_still_confirms() {
        let poller = fast_poller();
        let source = ScriptedSource::new(vec![Some(receipt(false))]);

        let status = poller.poll(&source, Bytes::from(vec![1]), None).await;

        assert_eq!(status.status, CallStatusCode::Confirmed);
        assert!(!status.receipts.unwrap()[0].success);
    }

    #[test]
    fn wire_form_uses_screaming_status() {
        let value = serde_json::to_value(CallStatus::pending()).unwrap();
        assert_eq!(value["status"], "PENDING");
    }
}
