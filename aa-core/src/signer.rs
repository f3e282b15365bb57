use std::sync::Arc;

use alloy::{
    primitives::{B256, Bytes, U256},
    sol,
    sol_types::SolValue,
};
use wallet_core::{
    credentials::{AssertionOptions, Key, PasskeyAuthenticator, WebAuthnAssertion},
    error::{CredentialErrorKind, WalletError},
};

sol! {
    /// The signature layout the account implementation's WebAuthn verifier
    /// expects: the raw assertion material plus the offsets it needs to
    /// check `clientDataJSON` without parsing JSON on-chain.
    struct WebAuthnAuth {
        bytes authenticatorData;
        string clientDataJSON;
        uint256 challengeIndex;
        uint256 typeIndex;
        uint256 r;
        uint256 s;
    }
}

/// ABI-encode an assertion into the account's signature layout.
pub fn encode_webauthn_signature(assertion: &WebAuthnAssertion) -> Bytes {
    let challenge_index = assertion
        .client_data_json
        .find(r#""challenge""#)
        .unwrap_or_default();
    let type_index = assertion
        .client_data_json
        .find(r#""type""#)
        .unwrap_or_default();

    WebAuthnAuth {
        authenticatorData: assertion.authenticator_data.clone(),
        clientDataJSON: assertion.client_data_json.clone(),
        challengeIndex: U256::from(challenge_index),
        typeIndex: U256::from(type_index),
        r: assertion.r,
        s: assertion.s,
    }
    .abi_encode()
    .into()
}

/// Signs user operation hashes (and bare message hashes) with a live
/// WebAuthn assertion from the platform authenticator.
pub struct UserOpSigner {
    authenticator: Arc<dyn PasskeyAuthenticator>,
}

impl UserOpSigner {
    pub fn new(authenticator: Arc<dyn PasskeyAuthenticator>) -> Self {
        Self { authenticator }
    }

    /// Obtain an assertion over `hash` and wrap it into the account's
    /// signature encoding.
    ///
    /// A device-level cancel surfaces as a user rejection from the
    /// authenticator and is passed through untouched; a malformed or
    /// mismatched assertion is a verification failure.
    pub async fn sign_hash(&self, key: &Key, hash: B256) -> Result<Bytes, WalletError> {
        if !key.can_sign {
            return Err(WalletError::validation(
                "key has no live signing capability; re-authenticate first",
            ));
        }

        let assertion = self
            .authenticator
            .get_assertion(AssertionOptions {
                challenge: Bytes::from(hash.to_vec()),
                credential_id: Some(key.credential.id.clone()),
                rp_id: key.rp_id.clone(),
            })
            .await?;

        if !assertion.matches_challenge(hash.as_slice()) {
            return Err(WalletError::CredentialVerification {
                kind: CredentialErrorKind::InvalidSignature,
            });
        }
        assertion.verify(&key.credential.public_key)?;

        tracing::debug!(credential_id = %assertion.credential_id, "assertion verified");

        Ok(encode_webauthn_signature(&assertion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    #[test]
    fn encoding_records_client_data_offsets() {
        let assertion = WebAuthnAssertion {
            credential_id: "cred".into(),
            authenticator_data: Bytes::from(vec![9u8; 37]),
            client_data_json:
                r#"{"type":"webauthn.get","challenge":"abc","origin":"https://wallet.test"}"#
                    .into(),
            r: U256::from(1),
            s: U256::from(2),
        };

        let encoded = encode_webauthn_signature(&assertion);
        let decoded = WebAuthnAuth::abi_decode(&encoded).unwrap();

        assert_eq!(decoded.clientDataJSON, assertion.client_data_json);
        assert_eq!(
            decoded.typeIndex,
            U256::from(assertion.client_data_json.find(r#""type""#).unwrap())
        );
        assert_eq!(
            decoded.challengeIndex,
            U256::from(assertion.client_data_json.find(r#""challenge""#).unwrap())
        );
        assert_eq!(decoded.r, U256::from(1));
        assert_eq!(decoded.s, U256::from(2));
    }
}
