use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use serde_json::{Value, json};
use wallet_aa_core::status::CallStatus;
use wallet_core::account::Account;
use wallet_core::error::WalletError;
use wallet_core::transaction::Call;

use crate::internal::Internal;
use crate::rpc::{Capabilities, GrantPermissionsParams, SendCallsParams};

mod channel;
mod executor;
mod local;

pub use channel::{ChannelBackend, Envelope};
pub use executor::{CallExecutor, UserOpExecutor};
pub use local::LocalBackend;

/// Teardown hook returned by [`Backend::setup`]. Idempotent: running it a
/// second time is a no-op, and dropping it runs it.
pub struct Teardown {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl Teardown {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    pub fn noop() -> Self {
        Self { action: None }
    }

    pub fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}

#[derive(Debug, Clone)]
pub struct LoginPrompt {
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginDecision {
    SignUp { user_name: String },
    SignIn,
    Dismiss,
}

#[derive(Debug, Clone)]
pub struct CallsPrompt {
    pub account: Address,
    pub calls: Vec<Call>,
    pub chain_id: u64,
    pub sponsored: bool,
}

#[derive(Debug, Clone)]
pub struct PermissionsPrompt {
    pub params: GrantPermissionsParams,
    pub chain_id: u64,
}

#[derive(Debug, Clone)]
pub struct SignaturePrompt {
    pub account: Address,
    /// Hex message or typed-data JSON, whichever the request carried.
    pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Dismiss,
}

/// The confirmation-UI abstraction the local backend drives. One prompt is
/// presented at a time; returning [`Decision::Dismiss`] (or
/// [`LoginDecision::Dismiss`]) is the implicit user rejection.
#[async_trait]
pub trait DecisionSurface: Send + Sync {
    async fn login(&self, prompt: LoginPrompt) -> LoginDecision;
    async fn confirm_calls(&self, prompt: CallsPrompt) -> Decision;
    async fn confirm_permissions(&self, prompt: PermissionsPrompt) -> Decision;
    async fn confirm_signature(&self, prompt: SignaturePrompt) -> Decision;
}

/// The pluggable resolution strategy: how an enqueued request reaches a
/// human and comes back decided. Closed set of variants, selected at
/// construction; exactly one is active per wallet at a time.
pub enum Backend {
    /// Same-document confirmation surface driven off the store queue.
    Local(LocalBackend),
    /// Cross-context surface reached over a typed message channel.
    Channel(ChannelBackend),
}

impl Backend {
    /// Install the backend. Called exactly once per installation; the
    /// returned teardown runs before any replacement backend installs.
    pub fn setup(&self, internal: Arc<Internal>) -> Teardown {
        match self {
            Backend::Local(local) => local.spawn_driver(internal),
            Backend::Channel(channel) => channel.spawn_host(internal),
        }
    }

    /// Resolve a connect/request-accounts call into connected accounts.
    pub async fn load_accounts(
        &self,
        internal: &Arc<Internal>,
    ) -> Result<Vec<Account>, WalletError> {
        let result = internal.queue.submit("eth_requestAccounts", json!([])).await?;
        let addresses: Vec<Address> = serde_json::from_value(result)
            .map_err(|err| WalletError::internal(format!("malformed accounts result: {err}")))?;

        // A local surface binds accounts (with keys) during login; a
        // cross-context surface only reports addresses, so unknown ones
        // are recorded keyless here.
        let state = internal.store.get_state();
        let accounts: Vec<Account> = addresses
            .into_iter()
            .map(|address| {
                state.account_for(address).cloned().unwrap_or(Account {
                    address,
                    kind: wallet_core::account::AccountKind::SmartAccount,
                    key: None,
                    name: None,
                })
            })
            .collect();

        internal.store.set_state(|state| {
            for account in &accounts {
                if state.account_for(account.address).is_none() {
                    state.accounts.push(account.clone());
                }
            }
        });

        Ok(accounts)
    }

    /// Route an approved-or-pending call batch through confirmation and,
    /// on approval, the user-operation pipeline. Returns the operation
    /// hash.
    pub async fn send_calls(
        &self,
        internal: &Arc<Internal>,
        account: &Account,
        calls: Vec<Call>,
        capabilities: Option<Capabilities>,
    ) -> Result<Bytes, WalletError> {
        let chain_id = internal.store.get_state().chain.id;
        let params = SendCallsParams {
            version: Some("1.0".to_string()),
            chain_id: Some(alloy::primitives::U64::from(chain_id)),
            from: Some(account.address),
            calls: calls
                .iter()
                .map(|call| crate::rpc::CallParams {
                    to: call.to,
                    value: (!call.value.is_zero()).then_some(call.value),
                    data: (!call.data.is_empty()).then(|| call.data.clone()),
                })
                .collect(),
            capabilities,
        };

        let result = internal
            .queue
            .submit("wallet_sendCalls", json!([params]))
            .await?;
        serde_json::from_value(result)
            .map_err(|err| WalletError::internal(format!("malformed send result: {err}")))
    }

    /// Map bundler receipt state into the closed status vocabulary.
    pub async fn get_calls_status(
        &self,
        internal: &Arc<Internal>,
        user_op_hash: Bytes,
        timeout: Option<Duration>,
    ) -> Result<CallStatus, WalletError> {
        match self {
            Backend::Local(_) => {
                let chain = internal.active_chain()?;
                Ok(internal.poller.poll(&chain, user_op_hash, timeout).await)
            }
            Backend::Channel(_) => {
                let result = internal
                    .queue
                    .submit("wallet_getCallsStatus", json!([user_op_hash]))
                    .await?;
                serde_json::from_value(result).map_err(|err| {
                    WalletError::internal(format!("malformed status result: {err}"))
                })
            }
        }
    }

    pub async fn grant_permissions(
        &self,
        internal: &Arc<Internal>,
        params: GrantPermissionsParams,
    ) -> Result<Value, WalletError> {
        internal
            .queue
            .submit("wallet_grantPermissions", json!([params]))
            .await
    }

    pub async fn sign_message(
        &self,
        internal: &Arc<Internal>,
        account: &Account,
        message: Bytes,
    ) -> Result<Bytes, WalletError> {
        let result = internal
            .queue
            .submit("personal_sign", json!([message, account.address]))
            .await?;
        serde_json::from_value(result)
            .map_err(|err| WalletError::internal(format!("malformed signature result: {err}")))
    }

    pub async fn sign_typed_data(
        &self,
        internal: &Arc<Internal>,
        account: &Account,
        typed_data: String,
    ) -> Result<Bytes, WalletError> {
        let result = internal
            .queue
            .submit("eth_signTypedData_v4", json!([account.address, typed_data]))
            .await?;
        serde_json::from_value(result)
            .map_err(|err| WalletError::internal(format!("malformed signature result: {err}")))
    }
}
