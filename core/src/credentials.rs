use alloy::primitives::{Address, Bytes, U256, keccak256};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CredentialErrorKind, WalletError};

/// A passkey credential reference: the authenticator-assigned id and the
/// verified P256 public key (65-byte uncompressed SEC1 point).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnCredential {
    pub id: String,
    pub public_key: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    #[serde(rename = "webauthn-p256")]
    WebauthnP256,
}

/// Signing capability descriptor attached to an account. Immutable once
/// created; never persisted with `can_sign` intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    #[serde(rename = "type")]
    pub kind: KeyKind,
    pub credential: WebAuthnCredential,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    pub can_sign: bool,
}

impl Key {
    pub fn from_webauthn_credential(
        credential: WebAuthnCredential,
        rp_id: Option<String>,
    ) -> Self {
        Self {
            kind: KeyKind::WebauthnP256,
            credential,
            rp_id,
            can_sign: true,
        }
    }

    /// The Ethereum-style address of the passkey owner, derived from the
    /// credential's public key. Used as the smart account's designated
    /// signer for deterministic address prediction.
    pub fn owner_address(&self) -> Result<Address, WalletError> {
        owner_address_from_public_key(&self.credential.public_key)
    }
}

/// keccak256 of the raw 64-byte P256 point, truncated to 20 bytes, mirroring
/// how EOA addresses are derived from secp256k1 keys.
pub fn owner_address_from_public_key(public_key: &[u8]) -> Result<Address, WalletError> {
    let point = match public_key {
        [0x04, rest @ ..] if rest.len() == 64 => rest,
        _ => {
            return Err(WalletError::validation(
                "public key must be a 65-byte uncompressed SEC1 point",
            ));
        }
    };
    let hash = keccak256(point);
    Ok(Address::from_slice(&hash[12..]))
}

/// Base64url (unpadded) challenge encoding used inside `clientDataJSON`.
pub fn encode_challenge(challenge: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(challenge)
}

/// A live WebAuthn assertion produced by an authenticator over a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnAssertion {
    pub credential_id: String,
    pub authenticator_data: Bytes,
    pub client_data_json: String,
    pub r: U256,
    pub s: U256,
}

impl WebAuthnAssertion {
    /// Verify the assertion signature against a credential public key.
    ///
    /// WebAuthn signs `authenticatorData || sha256(clientDataJSON)`; the
    /// ECDSA layer applies its own SHA-256 on top.
    pub fn verify(&self, public_key: &[u8]) -> Result<(), WalletError> {
        let key = VerifyingKey::from_sec1_bytes(public_key).map_err(|_| {
            WalletError::CredentialVerification {
                kind: CredentialErrorKind::InvalidSignature,
            }
        })?;

        let signature =
            Signature::from_scalars(self.r.to_be_bytes::<32>(), self.s.to_be_bytes::<32>())
                .map_err(|_| WalletError::CredentialVerification {
                    kind: CredentialErrorKind::InvalidSignature,
                })?;

        let client_data_hash = Sha256::digest(self.client_data_json.as_bytes());
        let mut payload =
            Vec::with_capacity(self.authenticator_data.len() + client_data_hash.len());
        payload.extend_from_slice(&self.authenticator_data);
        payload.extend_from_slice(&client_data_hash);

        key.verify(&payload, &signature)
            .map_err(|_| WalletError::CredentialVerification {
                kind: CredentialErrorKind::InvalidSignature,
            })
    }

    /// Whether the assertion's `clientDataJSON` carries the expected
    /// challenge. Defends against an authenticator replaying an assertion
    /// for a different payload.
    pub fn matches_challenge(&self, challenge: &[u8]) -> bool {
        let Ok(client_data) =
            serde_json::from_str::<serde_json::Value>(&self.client_data_json)
        else {
            return false;
        };
        client_data
            .get("challenge")
            .and_then(|value| value.as_str())
            .is_some_and(|encoded| encoded == encode_challenge(challenge))
    }
}

#[derive(Debug, Clone)]
pub struct CredentialCreationOptions {
    /// User-chosen label shown by the platform authenticator.
    pub user_name: String,
    pub challenge: Bytes,
    pub rp_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssertionOptions {
    pub challenge: Bytes,
    /// Restrict the ceremony to one known credential; `None` lets the
    /// authenticator pick among resident keys.
    pub credential_id: Option<String>,
    pub rp_id: Option<String>,
}

/// The platform authenticator seam. Implementations wrap whatever produces
/// real device ceremonies; tests substitute a deterministic signer.
///
/// A device-level cancel must surface as
/// [`WalletError::CredentialVerification`] with
/// [`CredentialErrorKind::UserDeclined`], distinct from network errors.
#[async_trait]
pub trait PasskeyAuthenticator: Send + Sync {
    async fn create_credential(
        &self,
        options: CredentialCreationOptions,
    ) -> Result<WebAuthnCredential, WalletError>;

    async fn get_assertion(
        &self,
        options: AssertionOptions,
    ) -> Result<WebAuthnAssertion, WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use p256::ecdsa::signature::Signer;

    fn test_signing_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    fn public_key_bytes(key: &SigningKey) -> Bytes {
        Bytes::from(
            key.verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        )
    }

    fn sign_assertion(key: &SigningKey, challenge: &[u8]) -> WebAuthnAssertion {
        let client_data_json = format!(
            r#"{{"type":"webauthn.get","challenge":"{}","origin":"https://wallet.test"}}"#,
            encode_challenge(challenge)
        );
        let authenticator_data = Bytes::from(vec![1u8; 37]);

        let client_data_hash = Sha256::digest(client_data_json.as_bytes());
        let mut payload = authenticator_data.to_vec();
        payload.extend_from_slice(&client_data_hash);

        let signature: Signature = key.sign(&payload);
        let bytes = signature.to_bytes();

        WebAuthnAssertion {
            credential_id: "test-credential".into(),
            authenticator_data,
            client_data_json,
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..]),
        }
    }

    #[test]
    fn verifies_valid_assertion() {
        let key = test_signing_key();
        let assertion = sign_assertion(&key, b"challenge-bytes");

        assertion.verify(&public_key_bytes(&key)).unwrap();
        assert!(assertion.matches_challenge(b"challenge-bytes"));
    }

    #[test]
    fn rejects_tampered_client_data() {
        let key = test_signing_key();
        let mut assertion = sign_assertion(&key, b"challenge-bytes");
        assertion.client_data_json = assertion
            .client_data_json
            .replace("wallet.test", "evil.test");

        let err = assertion.verify(&public_key_bytes(&key)).unwrap_err();
        assert!(matches!(
            err,
            WalletError::CredentialVerification {
                kind: CredentialErrorKind::InvalidSignature
            }
        ));
    }

    #[test]
    fn challenge_mismatch_is_detected() {
        let key = test_signing_key();
        let assertion = sign_assertion(&key, b"challenge-bytes");
        assert!(!assertion.matches_challenge(b"different-challenge"));
    }

    #[test]
    fn owner_address_is_deterministic() {
        let key = test_signing_key();
        let public_key = public_key_bytes(&key);

        let a = owner_address_from_public_key(&public_key).unwrap();
        let b = owner_address_from_public_key(&public_key).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Address::ZERO);
    }

    #[test]
    fn owner_address_rejects_compressed_points() {
        let err = owner_address_from_public_key(&[0x02; 33]).unwrap_err();
        assert!(matches!(err, WalletError::ValidationError { .. }));
    }
}
