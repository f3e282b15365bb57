use alloy::transports::{RpcError as AlloyRpcError, TransportErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::Chain;

#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {0}")]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    /// Rpc server returned an unsupported feature.
    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// Returned when a local pre-processing step fails.
    #[error("local usage error: {message}")]
    InternalError { message: String },

    /// JSON serialization error.
    #[error("serialization error: {message}")]
    SerError { message: String },

    /// JSON deserialization error.
    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcErrorResponse {
    /// The error code.
    pub code: i64,
    /// The error message (if any).
    pub message: String,
    /// The error data (if any).
    pub data: Option<String>,
}

impl std::fmt::Display for RpcErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, ", data: {data}")?;
        }
        Ok(())
    }
}

/// How a credential operation failed, mapped to a user-facing message by
/// the confirmation surface.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialErrorKind {
    /// The user or device declined the credential ceremony.
    #[error("credential request was declined")]
    UserDeclined,

    /// Server-side verification of the assertion or attestation failed.
    #[error("credential verification failed")]
    InvalidSignature,

    /// The server does not know the presented credential.
    #[error("credential not found")]
    CredentialNotFound,

    #[error("credential operation failed: {message}")]
    Other { message: String },
}

impl CredentialErrorKind {
    /// Human-readable message for confirmation surfaces. The provider-facing
    /// error stays within the closed [`WalletError`] vocabulary.
    pub fn user_message(&self) -> &'static str {
        match self {
            CredentialErrorKind::UserDeclined => "Request was cancelled",
            CredentialErrorKind::InvalidSignature => {
                "Failed to verify your passkey, please try again"
            }
            CredentialErrorKind::CredentialNotFound => {
                "Invalid passkey, please sign up or try a different passkey"
            }
            CredentialErrorKind::Other { .. } => "Failed to sign in, please try again",
        }
    }
}

#[derive(Error, Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum WalletError {
    /// The user declined a request, explicitly or by dismissing the
    /// confirmation surface.
    #[error("user rejected the request")]
    UserRejected,

    /// No connected account matches the requested address.
    #[error("no account for address {address}")]
    Unauthorized { address: String },

    /// A `wallet_*` method outside the supported set.
    #[error("unsupported method: {method}")]
    UnsupportedMethod { method: String },

    /// The request named a chain id that is not the active one.
    #[error("chain {requested} is not the active chain ({active})")]
    ChainDisconnected { requested: u64, active: u64 },

    /// No accounts are connected at all.
    #[error("wallet is not connected")]
    Disconnected,

    /// A passkey ceremony failed; `kind` selects the user-facing message.
    #[error("credential verification failed: {kind}")]
    CredentialVerification { kind: CredentialErrorKind },

    /// The account cannot cover the user operation's prefund and no
    /// sponsorship is available.
    #[error("insufficient balance on {address}: have {balance}, need {required}")]
    InsufficientBalance {
        address: String,
        balance: String,
        required: String,
    },

    #[error("RPC error on chain {chain_id} at {rpc_url}: {message}")]
    RpcError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Bundler error on chain {chain_id} at {rpc_url}: {message}")]
    BundlerError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Paymaster error on chain {chain_id} at {rpc_url}: {message}")]
    PaymasterError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Contract interaction error on chain {chain_id}: {message}")]
    ContractError { chain_id: u64, message: String },

    #[error("Bad RPC configuration: {message}")]
    RpcConfigError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl WalletError {
    /// EIP-1193 provider error code for the dApp-facing rejection.
    pub fn provider_code(&self) -> i64 {
        match self {
            WalletError::UserRejected => 4001,
            WalletError::Unauthorized { .. } => 4100,
            WalletError::UnsupportedMethod { .. } => 4200,
            WalletError::Disconnected => 4900,
            WalletError::ChainDisconnected { .. } => 4901,
            WalletError::CredentialVerification {
                kind: CredentialErrorKind::UserDeclined,
            } => 4001,
            _ => -32603,
        }
    }

    pub fn user_rejected() -> Self {
        WalletError::UserRejected
    }

    pub fn validation(message: impl Into<String>) -> Self {
        WalletError::ValidationError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        WalletError::InternalError {
            message: message.into(),
        }
    }
}

fn to_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            TransportErrorKind::Custom(err) => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

/// Stamp chain id and endpoint onto alloy transport failures so callers can
/// tell which collaborator (general RPC, bundler, paymaster) misbehaved.
pub trait AlloyRpcErrorToWalletError {
    fn to_wallet_error(&self, chain: &impl Chain) -> WalletError;
    fn to_bundler_error(&self, chain: &impl Chain) -> WalletError;
    fn to_paymaster_error(&self, chain: &impl Chain) -> WalletError;
}

impl AlloyRpcErrorToWalletError for AlloyRpcError<TransportErrorKind> {
    fn to_wallet_error(&self, chain: &impl Chain) -> WalletError {
        WalletError::RpcError {
            chain_id: chain.chain_id(),
            rpc_url: chain.rpc_url().to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }

    fn to_bundler_error(&self, chain: &impl Chain) -> WalletError {
        WalletError::BundlerError {
            chain_id: chain.chain_id(),
            rpc_url: chain.bundler_url().to_string(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }

    fn to_paymaster_error(&self, chain: &impl Chain) -> WalletError {
        WalletError::PaymasterError {
            chain_id: chain.chain_id(),
            rpc_url: chain
                .paymaster_url()
                .map(|url| url.to_string())
                .unwrap_or_default(),
            message: self.to_string(),
            kind: to_rpc_error_kind(self),
        }
    }
}

pub trait ContractErrorToWalletError {
    fn to_wallet_error(self, chain_id: u64) -> WalletError;
}

impl ContractErrorToWalletError for alloy::contract::Error {
    fn to_wallet_error(self, chain_id: u64) -> WalletError {
        WalletError::ContractError {
            chain_id,
            message: self.to_string(),
        }
    }
}
