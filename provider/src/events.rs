use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// dApp-facing provider notifications, decoupled from any single in-flight
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Connect { chain_id: u64 },
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnect,
}

#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<ProviderEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// What the wallet advertises through multi-provider discovery so hosts
/// can select it among several installed wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Stable unique id for this wallet session.
    pub uuid: String,
    pub name: String,
    /// Data-URI icon.
    pub icon: String,
    /// Reverse-DNS identifier.
    pub rdns: String,
}
