use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::credentials::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    #[serde(rename = "smartAccount")]
    SmartAccount,
}

/// A connected smart account. Owned by the store; created only by a
/// successful sign-up/sign-in flow and removed only on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    /// Live signing capability. `None` after rehydration from storage until
    /// a fresh credential assertion re-attaches it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Key>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Account {
    pub fn new(address: Address, key: Key) -> Self {
        Self {
            address,
            kind: AccountKind::SmartAccount,
            key: Some(key),
            name: None,
        }
    }

    pub fn can_sign(&self) -> bool {
        self.key.as_ref().is_some_and(|key| key.can_sign)
    }

    /// The storage projection: signing material stripped.
    pub fn redacted(&self) -> PersistedAccount {
        PersistedAccount {
            address: self.address,
            kind: self.kind,
            name: self.name.clone(),
        }
    }
}

/// What actually lands in durable storage for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAccount {
    pub address: Address,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<PersistedAccount> for Account {
    fn from(persisted: PersistedAccount) -> Self {
        Account {
            address: persisted.address,
            kind: persisted.kind,
            key: None,
            name: persisted.name,
        }
    }
}
