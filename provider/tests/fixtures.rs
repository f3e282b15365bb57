#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Bytes, U256};
use async_trait::async_trait;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use sha2::{Digest, Sha256};

use wallet_core::chain::ChainDescriptor;
use wallet_core::credentials::{
    AssertionOptions, CredentialCreationOptions, PasskeyAuthenticator, WebAuthnAssertion,
    WebAuthnCredential, encode_challenge,
};
use wallet_core::error::{CredentialErrorKind, WalletError};
use wallet_provider::backend::{
    CallsPrompt, Decision, DecisionSurface, LoginDecision, LoginPrompt, PermissionsPrompt,
    SignaturePrompt,
};
use wallet_provider::login::{
    AuthenticationChallenge, PasskeyServer, PasskeyServerError, RegistrationChallenge,
    VerifiedCredential,
};

pub fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "wallet_provider=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn test_chains() -> Vec<ChainDescriptor> {
    vec![
        ChainDescriptor {
            chain_id: 11155111,
            name: "sepolia".into(),
            rpc_url: "http://127.0.0.1:1/".into(),
            bundler_url: "http://127.0.0.1:1/".into(),
            paymaster_url: None,
        },
        ChainDescriptor {
            chain_id: 84532,
            name: "base-sepolia".into(),
            rpc_url: "http://127.0.0.1:1/".into(),
            bundler_url: "http://127.0.0.1:1/".into(),
            paymaster_url: Some("http://127.0.0.1:1/".into()),
        },
    ]
}

// --- Platform authenticator double ---

/// Deterministic P256 authenticator. Produces real assertions, so the
/// whole verify path runs against genuine signatures.
pub struct TestAuthenticator {
    signing_key: SigningKey,
    credential_id: String,
    decline: AtomicBool,
}

impl TestAuthenticator {
    pub fn new(seed: u8) -> Self {
        Self {
            signing_key: SigningKey::from_slice(&[seed; 32]).unwrap(),
            credential_id: format!("credential-{seed}"),
            decline: AtomicBool::new(false),
        }
    }

    pub fn public_key(&self) -> Bytes {
        Bytes::from(
            self.signing_key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        )
    }

    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    /// Simulate the user cancelling the platform ceremony.
    pub fn set_decline(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }
}

#[async_trait]
impl PasskeyAuthenticator for TestAuthenticator {
    async fn create_credential(
        &self,
        _options: CredentialCreationOptions,
    ) -> Result<WebAuthnCredential, WalletError> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(WalletError::CredentialVerification {
                kind: CredentialErrorKind::UserDeclined,
            });
        }
        Ok(WebAuthnCredential {
            id: self.credential_id.clone(),
            public_key: self.public_key(),
        })
    }

    async fn get_assertion(
        &self,
        options: AssertionOptions,
    ) -> Result<WebAuthnAssertion, WalletError> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(WalletError::CredentialVerification {
                kind: CredentialErrorKind::UserDeclined,
            });
        }

        let client_data_json = format!(
            r#"{{"type":"webauthn.get","challenge":"{}","origin":"https://wallet.test"}}"#,
            encode_challenge(&options.challenge)
        );
        let authenticator_data = Bytes::from(vec![1u8; 37]);

        let mut payload = authenticator_data.to_vec();
        payload.extend_from_slice(&Sha256::digest(client_data_json.as_bytes()));
        let signature: Signature = self.signing_key.sign(&payload);
        let bytes = signature.to_bytes();

        Ok(WebAuthnAssertion {
            credential_id: self.credential_id.clone(),
            authenticator_data,
            client_data_json,
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..]),
        })
    }
}

// --- Passkey server double ---

/// In-memory credential registry standing in for the external passkey
/// server.
pub struct MockPasskeyServer {
    credentials: Mutex<HashMap<String, Bytes>>,
    challenges: Mutex<HashMap<String, Bytes>>,
    counter: AtomicU64,
}

impl MockPasskeyServer {
    pub fn new() -> Self {
        Self {
            credentials: Mutex::new(HashMap::new()),
            challenges: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(1),
        }
    }

    /// Pre-register a credential, optionally with a mismatched public key
    /// to provoke verification failures.
    pub fn register_credential(&self, id: &str, public_key: Bytes) {
        self.credentials
            .lock()
            .unwrap()
            .insert(id.to_string(), public_key);
    }

    fn fresh_challenge(&self) -> Bytes {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut challenge = vec![0u8; 24];
        challenge.extend_from_slice(&n.to_be_bytes());
        Bytes::from(challenge)
    }
}

#[async_trait]
impl PasskeyServer for MockPasskeyServer {
    async fn start_registration(
        &self,
        user_name: &str,
    ) -> Result<RegistrationChallenge, PasskeyServerError> {
        Ok(RegistrationChallenge {
            user_name: user_name.to_string(),
            challenge: self.fresh_challenge(),
            rp_id: Some("wallet.test".into()),
        })
    }

    async fn verify_registration(
        &self,
        _user_name: &str,
        credential: &WebAuthnCredential,
    ) -> Result<VerifiedCredential, PasskeyServerError> {
        self.credentials
            .lock()
            .unwrap()
            .insert(credential.id.clone(), credential.public_key.clone());
        Ok(VerifiedCredential {
            id: credential.id.clone(),
            public_key: credential.public_key.clone(),
        })
    }

    async fn start_authentication(
        &self,
    ) -> Result<AuthenticationChallenge, PasskeyServerError> {
        let uuid = self
            .counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string();
        let challenge = self.fresh_challenge();
        self.challenges
            .lock()
            .unwrap()
            .insert(uuid.clone(), challenge.clone());
        Ok(AuthenticationChallenge { challenge, uuid })
    }

    async fn verify_authentication(
        &self,
        assertion: &WebAuthnAssertion,
        uuid: &str,
    ) -> Result<VerifiedCredential, PasskeyServerError> {
        let challenge = self
            .challenges
            .lock()
            .unwrap()
            .remove(uuid)
            .ok_or(PasskeyServerError::VerificationFailed)?;

        let public_key = self
            .credentials
            .lock()
            .unwrap()
            .get(&assertion.credential_id)
            .cloned()
            .ok_or(PasskeyServerError::CredentialNotFound)?;

        if !assertion.matches_challenge(&challenge) {
            return Err(PasskeyServerError::VerificationFailed);
        }
        assertion
            .verify(&public_key)
            .map_err(|_| PasskeyServerError::VerificationFailed)?;

        Ok(VerifiedCredential {
            id: assertion.credential_id.clone(),
            public_key,
        })
    }
}

// --- Call executor double ---

/// Executor that skips the network pipeline: consults the surface, then
/// reports a fixed operation hash.
pub struct MockExecutor {
    pub hash: Bytes,
}

#[async_trait]
impl wallet_provider::backend::CallExecutor for MockExecutor {
    async fn execute(
        &self,
        _internal: &Arc<wallet_provider::internal::Internal>,
        _account: &wallet_core::account::Account,
        _calls: &[wallet_core::transaction::Call],
        _sponsorship: &wallet_aa_core::userop::SponsorshipPolicy,
        surface: &dyn DecisionSurface,
        prompt: CallsPrompt,
    ) -> Result<Bytes, WalletError> {
        match surface.confirm_calls(prompt).await {
            Decision::Approve => Ok(self.hash.clone()),
            Decision::Dismiss => Err(WalletError::user_rejected()),
        }
    }
}

// --- Decision surface double ---

/// Surface with pre-programmed decisions.
pub struct ScriptedSurface {
    pub login_decision: Mutex<LoginDecision>,
    pub decision: Mutex<Decision>,
}

impl ScriptedSurface {
    pub fn approving(login_decision: LoginDecision) -> Arc<Self> {
        Arc::new(Self {
            login_decision: Mutex::new(login_decision),
            decision: Mutex::new(Decision::Approve),
        })
    }

    pub fn dismissing() -> Arc<Self> {
        Arc::new(Self {
            login_decision: Mutex::new(LoginDecision::Dismiss),
            decision: Mutex::new(Decision::Dismiss),
        })
    }

    pub fn set_decision(&self, decision: Decision) {
        *self.decision.lock().unwrap() = decision;
    }
}

#[async_trait]
impl DecisionSurface for ScriptedSurface {
    async fn login(&self, _prompt: LoginPrompt) -> LoginDecision {
        self.login_decision.lock().unwrap().clone()
    }

    async fn confirm_calls(&self, _prompt: CallsPrompt) -> Decision {
        *self.decision.lock().unwrap()
    }

    async fn confirm_permissions(&self, _prompt: PermissionsPrompt) -> Decision {
        *self.decision.lock().unwrap()
    }

    async fn confirm_signature(&self, _prompt: SignaturePrompt) -> Decision {
        *self.decision.lock().unwrap()
    }
}
