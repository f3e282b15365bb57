use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use thiserror::Error;
use wallet_aa_core::smart_account::account_address_for_public_key;
use wallet_core::account::Account;
use wallet_core::credentials::{
    AssertionOptions, CredentialCreationOptions, Key, PasskeyAuthenticator, WebAuthnAssertion,
    WebAuthnCredential,
};
use wallet_core::error::{CredentialErrorKind, WalletError};

use crate::store::Store;

#[derive(Debug, Clone)]
pub struct RegistrationChallenge {
    pub user_name: String,
    pub challenge: Bytes,
    pub rp_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthenticationChallenge {
    pub challenge: Bytes,
    /// Server-side handle correlating the challenge with its verification.
    pub uuid: String,
}

/// Credential id and public key as verified by the passkey server.
#[derive(Debug, Clone)]
pub struct VerifiedCredential {
    pub id: String,
    pub public_key: Bytes,
}

#[derive(Debug, Error)]
pub enum PasskeyServerError {
    #[error("passkey not found")]
    CredentialNotFound,
    #[error("verification failed")]
    VerificationFailed,
    #[error("passkey server error: {0}")]
    Other(String),
}

/// The credential-issuing collaborator. Out of scope for implementation;
/// the wallet only depends on these four operations.
#[async_trait]
pub trait PasskeyServer: Send + Sync {
    async fn start_registration(
        &self,
        user_name: &str,
    ) -> Result<RegistrationChallenge, PasskeyServerError>;

    async fn verify_registration(
        &self,
        user_name: &str,
        credential: &WebAuthnCredential,
    ) -> Result<VerifiedCredential, PasskeyServerError>;

    async fn start_authentication(&self)
    -> Result<AuthenticationChallenge, PasskeyServerError>;

    async fn verify_authentication(
        &self,
        assertion: &WebAuthnAssertion,
        uuid: &str,
    ) -> Result<VerifiedCredential, PasskeyServerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    AwaitingCredential,
    AccountBound(Address),
    Rejected,
    Failed(CredentialErrorKind),
}

fn server_error_kind(err: PasskeyServerError) -> CredentialErrorKind {
    match err {
        PasskeyServerError::CredentialNotFound => CredentialErrorKind::CredentialNotFound,
        PasskeyServerError::VerificationFailed => CredentialErrorKind::InvalidSignature,
        PasskeyServerError::Other(message) => CredentialErrorKind::Other { message },
    }
}

/// Sign-up / sign-in state machine.
///
/// Both flows end by binding an account derived deterministically from the
/// verified public key. Re-authenticating with a passkey that maps to an
/// already-known address updates that account in place rather than
/// appending a duplicate.
pub struct LoginFlow {
    server: Arc<dyn PasskeyServer>,
    authenticator: Arc<dyn PasskeyAuthenticator>,
    state: Mutex<LoginState>,
}

impl LoginFlow {
    pub fn new(
        server: Arc<dyn PasskeyServer>,
        authenticator: Arc<dyn PasskeyAuthenticator>,
    ) -> Self {
        Self {
            server,
            authenticator,
            state: Mutex::new(LoginState::Idle),
        }
    }

    pub fn state(&self) -> LoginState {
        self.state.lock().expect("login state lock").clone()
    }

    fn transition(&self, next: LoginState) {
        *self.state.lock().expect("login state lock") = next;
    }

    fn fail(&self, kind: CredentialErrorKind) -> WalletError {
        tracing::debug!(user_message = kind.user_message(), "login failed");
        if kind == CredentialErrorKind::UserDeclined {
            self.transition(LoginState::Rejected);
            WalletError::user_rejected()
        } else {
            self.transition(LoginState::Failed(kind.clone()));
            WalletError::CredentialVerification { kind }
        }
    }

    fn classify(&self, err: WalletError) -> WalletError {
        match err {
            WalletError::CredentialVerification { kind } => self.fail(kind),
            WalletError::UserRejected => self.fail(CredentialErrorKind::UserDeclined),
            other => self.fail(CredentialErrorKind::Other {
                message: other.to_string(),
            }),
        }
    }

    /// Register a fresh passkey and bind the derived account.
    pub async fn sign_up(&self, store: &Store, user_name: &str) -> Result<Account, WalletError> {
        self.transition(LoginState::AwaitingCredential);

        let challenge = self
            .server
            .start_registration(user_name)
            .await
            .map_err(|err| self.fail(server_error_kind(err)))?;

        let credential = self
            .authenticator
            .create_credential(CredentialCreationOptions {
                user_name: challenge.user_name.clone(),
                challenge: challenge.challenge,
                rp_id: challenge.rp_id.clone(),
            })
            .await
            .map_err(|err| self.classify(err))?;

        let verified = self
            .server
            .verify_registration(user_name, &credential)
            .await
            .map_err(|err| self.fail(server_error_kind(err)))?;

        self.bind(store, verified, challenge.rp_id, Some(user_name))
    }

    /// Authenticate an existing passkey and rebind its account.
    pub async fn sign_in(&self, store: &Store) -> Result<Account, WalletError> {
        self.transition(LoginState::AwaitingCredential);

        let challenge = self
            .server
            .start_authentication()
            .await
            .map_err(|err| self.fail(server_error_kind(err)))?;

        let assertion = self
            .authenticator
            .get_assertion(AssertionOptions {
                challenge: challenge.challenge,
                credential_id: None,
                rp_id: None,
            })
            .await
            .map_err(|err| self.classify(err))?;

        let verified = self
            .server
            .verify_authentication(&assertion, &challenge.uuid)
            .await
            .map_err(|err| self.fail(server_error_kind(err)))?;

        self.bind(store, verified, None, None)
    }

    fn bind(
        &self,
        store: &Store,
        verified: VerifiedCredential,
        rp_id: Option<String>,
        name: Option<&str>,
    ) -> Result<Account, WalletError> {
        let address = account_address_for_public_key(&verified.public_key)
            .map_err(|err| self.classify(err))?;

        let key = Key::from_webauthn_credential(
            WebAuthnCredential {
                id: verified.id,
                public_key: verified.public_key,
            },
            rp_id,
        );

        let mut account = Account::new(address, key.clone());
        account.name = name.map(str::to_string);

        store.set_state(|state| {
            match state
                .accounts
                .iter_mut()
                .find(|existing| existing.address == address)
            {
                Some(existing) => {
                    // Same passkey, same derived address: refresh the
                    // signing capability instead of duplicating the entry.
                    existing.key = Some(key);
                    account = existing.clone();
                }
                None => state.accounts.push(account.clone()),
            }
        });

        tracing::info!(address = %address, "account bound");
        self.transition(LoginState::AccountBound(address));
        Ok(account)
    }
}
