use std::sync::Arc;

use alloy::primitives::{Address, Bytes, eip191_hash_message};
use serde_json::{Value, json};
use wallet_aa_core::signer::UserOpSigner;
use wallet_aa_core::userop::SponsorshipPolicy;
use wallet_core::error::WalletError;
use wallet_core::transaction::Call;

use super::executor::{CallExecutor, UserOpExecutor};
use super::{
    CallsPrompt, Decision, DecisionSurface, LoginDecision, LoginPrompt, PermissionsPrompt,
    SignaturePrompt, Teardown,
};
use crate::internal::Internal;
use crate::login::LoginFlow;
use crate::queue::{QueuedRequest, RequestStatus, RpcCall};
use crate::rpc::{GrantPermissionsParams, SendCallsParams};

/// Same-document resolution backend: a driver task watches the queue and
/// walks each pending entry through the decision surface.
pub struct LocalBackend {
    surface: Arc<dyn DecisionSurface>,
    executor: Arc<dyn CallExecutor>,
}

impl LocalBackend {
    pub fn new(surface: Arc<dyn DecisionSurface>) -> Self {
        Self {
            surface,
            executor: Arc::new(UserOpExecutor),
        }
    }

    pub fn with_executor(surface: Arc<dyn DecisionSurface>, executor: Arc<dyn CallExecutor>) -> Self {
        Self { surface, executor }
    }

    pub(crate) fn spawn_driver(&self, internal: Arc<Internal>) -> Teardown {
        let surface = self.surface.clone();
        let executor = self.executor.clone();
        let handle = tokio::spawn(driver_loop(internal, surface, executor));
        Teardown::new(move || handle.abort())
    }
}

/// Presents the oldest still-pending entry, one at a time. Handling is
/// sequential, so at most one entry is under active review.
async fn driver_loop(
    internal: Arc<Internal>,
    surface: Arc<dyn DecisionSurface>,
    executor: Arc<dyn CallExecutor>,
) {
    let mut queue_rx = internal.store.subscribe_queue();

    loop {
        let next: Option<QueuedRequest> = queue_rx
            .borrow_and_update()
            .iter()
            .find(|entry| !entry.status.is_terminal())
            .cloned();

        match next {
            Some(entry) => handle_entry(&internal, surface.as_ref(), executor.as_ref(), entry).await,
            None => {
                if queue_rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Every path out of here writes a terminal status; an entry must never be
/// left pending.
async fn handle_entry(
    internal: &Arc<Internal>,
    surface: &dyn DecisionSurface,
    executor: &dyn CallExecutor,
    entry: QueuedRequest,
) {
    let id = entry.request.id;
    let status = match process(internal, surface, executor, &entry.request).await {
        Ok(result) => RequestStatus::Success { result },
        Err(error) => {
            tracing::debug!(request_id = id, error = %error, "request resolved with error");
            RequestStatus::Error { error }
        }
    };
    internal.queue.complete(id, status);
}

async fn process(
    internal: &Arc<Internal>,
    surface: &dyn DecisionSurface,
    executor: &dyn CallExecutor,
    request: &RpcCall,
) -> Result<Value, WalletError> {
    let chain_id = internal.store.get_state().chain.id;

    match request.method.as_str() {
        "eth_requestAccounts" => {
            let decision = surface.login(LoginPrompt { chain_id }).await;
            let flow = LoginFlow::new(
                internal.passkey_server.clone(),
                internal.authenticator.clone(),
            );
            let account = match decision {
                LoginDecision::SignUp { user_name } => {
                    flow.sign_up(&internal.store, &user_name).await?
                }
                LoginDecision::SignIn => flow.sign_in(&internal.store).await?,
                LoginDecision::Dismiss => return Err(WalletError::user_rejected()),
            };
            Ok(json!([account.address]))
        }

        "wallet_sendCalls" => {
            let (params,): (SendCallsParams,) = decode_params(request)?;
            let from = params
                .from
                .ok_or_else(|| WalletError::validation("wallet_sendCalls: missing from"))?;
            let account = internal
                .store
                .get_state()
                .account_for(from)
                .cloned()
                .ok_or_else(|| WalletError::Unauthorized {
                    address: from.to_string(),
                })?;

            let calls: Vec<Call> = params.calls.into_iter().map(Call::from).collect();

            let capability_url = params
                .capabilities
                .as_ref()
                .and_then(|capabilities| capabilities.paymaster_service.as_ref())
                .and_then(|service| service.url.clone());
            let chain = internal.active_chain()?;
            let sponsored =
                capability_url.is_some() || chain.paymaster_client.is_some();
            let sponsorship = match capability_url {
                Some(url) => SponsorshipPolicy::Capability { url },
                None => SponsorshipPolicy::ChainDefault,
            };

            let prompt = CallsPrompt {
                account: account.address,
                calls: calls.clone(),
                chain_id,
                sponsored,
            };

            let hash = executor
                .execute(internal, &account, &calls, &sponsorship, surface, prompt)
                .await?;
            Ok(serde_json::to_value(hash)
                .map_err(|err| WalletError::internal(err.to_string()))?)
        }

        "wallet_grantPermissions" => {
            let (params,): (GrantPermissionsParams,) = decode_params(request)?;
            let expiry = params.expiry;
            let decision = surface
                .confirm_permissions(PermissionsPrompt { params, chain_id })
                .await;
            if decision != Decision::Approve {
                return Err(WalletError::user_rejected());
            }
            let context = format!("0x{}", uuid::Uuid::new_v4().simple());
            Ok(json!({ "context": context, "expiry": expiry }))
        }

        "personal_sign" => {
            let (message, address): (Bytes, Address) = decode_params(request)?;
            let signature = confirm_and_sign(
                internal,
                surface,
                address,
                format!("{message}"),
                eip191_hash_message(&message),
            )
            .await?;
            Ok(serde_json::to_value(signature)
                .map_err(|err| WalletError::internal(err.to_string()))?)
        }

        "eth_signTypedData_v4" => {
            let (address, typed_data): (Address, String) = decode_params(request)?;
            let typed: alloy::dyn_abi::TypedData = serde_json::from_str(&typed_data)
                .map_err(|err| {
                    WalletError::validation(format!("invalid typed data: {err}"))
                })?;
            let hash = typed.eip712_signing_hash().map_err(|err| {
                WalletError::validation(format!("invalid typed data: {err}"))
            })?;
            let signature =
                confirm_and_sign(internal, surface, address, typed_data, hash).await?;
            Ok(serde_json::to_value(signature)
                .map_err(|err| WalletError::internal(err.to_string()))?)
        }

        other => Err(WalletError::UnsupportedMethod {
            method: other.to_string(),
        }),
    }
}

async fn confirm_and_sign(
    internal: &Arc<Internal>,
    surface: &dyn DecisionSurface,
    address: Address,
    preview: String,
    hash: alloy::primitives::B256,
) -> Result<Bytes, WalletError> {
    let account = internal
        .store
        .get_state()
        .account_for(address)
        .cloned()
        .ok_or_else(|| WalletError::Unauthorized {
            address: address.to_string(),
        })?;
    let key = account
        .key
        .as_ref()
        .ok_or_else(|| WalletError::Unauthorized {
            address: address.to_string(),
        })?;

    let decision = surface
        .confirm_signature(SignaturePrompt {
            account: address,
            preview,
        })
        .await;
    if decision != Decision::Approve {
        return Err(WalletError::user_rejected());
    }

    UserOpSigner::new(internal.authenticator.clone())
        .sign_hash(key, hash)
        .await
}

fn decode_params<T: serde::de::DeserializeOwned>(request: &RpcCall) -> Result<T, WalletError> {
    serde_json::from_value(request.params.clone()).map_err(|err| {
        WalletError::validation(format!("invalid params for {}: {err}", request.method))
    })
}
