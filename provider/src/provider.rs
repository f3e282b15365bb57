use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use wallet_core::account::Account;
use wallet_core::error::{AlloyRpcErrorToWalletError, WalletError};
use wallet_core::transaction::Call;

use crate::backend::Backend;
use crate::events::{ProviderEvent, ProviderInfo};
use crate::internal::Internal;
use crate::queue::RpcCall;
use crate::rpc::{ParsedRequest, SendCallsParams, TransactionParams, WalletMethodCall, parse_request};

/// Ceiling for a single receipt poll on the legacy single-transaction
/// method, which blocks until a transaction hash exists.
const LEGACY_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// The dApp-facing request surface. Validates against the closed method
/// union, answers read-only methods from the store, and routes
/// state-changing methods through the queue and the active resolution
/// backend.
pub struct Provider {
    internal: Arc<Internal>,
    backend: Arc<RwLock<Arc<Backend>>>,
}

impl Provider {
    pub(crate) fn new(internal: Arc<Internal>, backend: Arc<RwLock<Arc<Backend>>>) -> Self {
        Self { internal, backend }
    }

    /// Discovery announcement payload for multi-provider selection.
    pub fn info(&self) -> ProviderInfo {
        ProviderInfo {
            uuid: self.internal.id.to_string(),
            name: "Passkey Smart Wallet".to_string(),
            icon: "data:image/svg+xml;base64,PHN2Zy8+".to_string(),
            rdns: "rs.wallet.passkey".to_string(),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.internal.events.subscribe()
    }

    pub async fn request(&self, call: RpcCall) -> Result<Value, WalletError> {
        let parsed = parse_request(&call)?;
        let backend = self.backend.read().await.clone();

        let method = match parsed {
            ParsedRequest::Passthrough => return self.passthrough(call).await,
            ParsedRequest::Method(method) => method,
        };

        let state = self.internal.store.get_state();

        match method {
            WalletMethodCall::EthAccounts => {
                if state.accounts.is_empty() {
                    return Err(WalletError::Disconnected);
                }
                Ok(json!(
                    state
                        .accounts
                        .iter()
                        .map(|account| account.address)
                        .collect::<Vec<_>>()
                ))
            }

            WalletMethodCall::EthChainId => Ok(json!(format!("0x{:x}", state.chain.id))),

            WalletMethodCall::WalletGetCapabilities => {
                let mut capabilities = serde_json::Map::new();
                for chain_id in self.internal.chains.chain_ids() {
                    let paymaster = self
                        .internal
                        .chains
                        .descriptor(chain_id)
                        .is_some_and(|descriptor| descriptor.paymaster_url.is_some());
                    capabilities.insert(
                        format!("0x{chain_id:x}"),
                        json!({
                            "atomicBatch": { "supported": true },
                            "paymasterService": { "supported": paymaster },
                        }),
                    );
                }
                Ok(Value::Object(capabilities))
            }

            WalletMethodCall::EthRequestAccounts => {
                if !state.accounts.is_empty() {
                    return Ok(json!(
                        state
                            .accounts
                            .iter()
                            .map(|account| account.address)
                            .collect::<Vec<_>>()
                    ));
                }

                let accounts = backend.load_accounts(&self.internal).await?;
                self.internal.events.emit(ProviderEvent::Connect {
                    chain_id: state.chain.id,
                });
                Ok(json!(
                    accounts
                        .iter()
                        .map(|account| account.address)
                        .collect::<Vec<_>>()
                ))
            }

            WalletMethodCall::EthSendTransaction(transaction) => {
                self.send_transaction(&backend, transaction).await
            }

            WalletMethodCall::WalletSendCalls(send_calls) => {
                self.send_calls(&backend, send_calls).await
            }

            WalletMethodCall::WalletGetCallsStatus { user_op_hash } => {
                if state.accounts.is_empty() {
                    return Err(WalletError::Disconnected);
                }
                let status = backend
                    .get_calls_status(&self.internal, user_op_hash, None)
                    .await?;
                Ok(serde_json::to_value(status)
                    .map_err(|err| WalletError::internal(err.to_string()))?)
            }

            WalletMethodCall::WalletGrantPermissions(params) => {
                if state.accounts.is_empty() {
                    return Err(WalletError::Disconnected);
                }
                backend.grant_permissions(&self.internal, params).await
            }

            WalletMethodCall::WalletRevokePermissions => {
                if state.accounts.is_empty() {
                    return Err(WalletError::Disconnected);
                }
                self.internal.store.set_state(|state| {
                    state.accounts.clear();
                });
                Ok(Value::Null)
            }

            WalletMethodCall::PersonalSign { message, address } => {
                let account = self.authorized_account(&state.accounts, address)?;
                let signature = backend
                    .sign_message(&self.internal, &account, message)
                    .await?;
                Ok(serde_json::to_value(signature)
                    .map_err(|err| WalletError::internal(err.to_string()))?)
            }

            WalletMethodCall::EthSignTypedData {
                address,
                typed_data,
            } => {
                let account = self.authorized_account(&state.accounts, address)?;
                let signature = backend
                    .sign_typed_data(&self.internal, &account, typed_data)
                    .await?;
                Ok(serde_json::to_value(signature)
                    .map_err(|err| WalletError::internal(err.to_string()))?)
            }
        }
    }

    /// Legacy single-call method: normalize to a one-element batch, then
    /// block until the operation has an on-chain transaction hash.
    async fn send_transaction(
        &self,
        backend: &Backend,
        transaction: TransactionParams,
    ) -> Result<Value, WalletError> {
        let state = self.internal.store.get_state();
        if state.accounts.is_empty() {
            return Err(WalletError::Disconnected);
        }
        self.check_chain(transaction.chain_id)?;

        let from = transaction.from;
        let account = self.authorized_account(&state.accounts, from)?;
        let calls = vec![transaction.into_call()];

        let hash = backend
            .send_calls(&self.internal, &account, calls, None)
            .await?;

        loop {
            let status = backend
                .get_calls_status(
                    &self.internal,
                    hash.clone(),
                    Some(LEGACY_RECEIPT_TIMEOUT),
                )
                .await?;
            if let Some(transaction_hash) = status.transaction_hash() {
                return Ok(json!(transaction_hash));
            }
            tracing::debug!(user_op_hash = %hash, "still pending, polling again");
        }
    }

    /// Batch method: returns the operation handle as soon as submission
    /// succeeds.
    async fn send_calls(
        &self,
        backend: &Backend,
        send_calls: SendCallsParams,
    ) -> Result<Value, WalletError> {
        let state = self.internal.store.get_state();
        if state.accounts.is_empty() {
            return Err(WalletError::Disconnected);
        }
        self.check_chain(send_calls.chain_id)?;

        let from = send_calls
            .from
            .or_else(|| state.accounts.first().map(|account| account.address))
            .ok_or(WalletError::Disconnected)?;
        let account = self.authorized_account(&state.accounts, from)?;

        let calls: Vec<Call> = send_calls.calls.into_iter().map(Call::from).collect();

        let hash = backend
            .send_calls(&self.internal, &account, calls, send_calls.capabilities)
            .await?;
        Ok(json!(hash))
    }

    fn authorized_account(
        &self,
        accounts: &[Account],
        address: Address,
    ) -> Result<Account, WalletError> {
        accounts
            .iter()
            .find(|account| account.address == address)
            .cloned()
            .ok_or_else(|| WalletError::Unauthorized {
                address: address.to_string(),
            })
    }

    fn check_chain(&self, requested: Option<alloy::primitives::U64>) -> Result<(), WalletError> {
        let active = self.internal.store.get_state().chain.id;
        if let Some(requested) = requested {
            let requested = requested.to::<u64>();
            if requested != active {
                return Err(WalletError::ChainDisconnected { requested, active });
            }
        }
        Ok(())
    }

    /// The escape hatch: anything outside the method union that is not a
    /// `wallet_*` call goes verbatim to the active chain's general
    /// transport.
    async fn passthrough(&self, call: RpcCall) -> Result<Value, WalletError> {
        let chain = self.internal.active_chain()?;
        tracing::debug!(method = %call.method, "forwarding to general transport");

        use alloy::providers::Provider as _;
        chain
            .provider
            .raw_request::<Value, Value>(Cow::Owned(call.method), call.params)
            .await
            .map_err(|err| err.to_wallet_error(&chain))
    }
}
