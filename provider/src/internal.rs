use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use wallet_aa_core::status::StatusPoller;
use wallet_core::chain::{ChainRegistry, ConfiguredChain};
use wallet_core::credentials::PasskeyAuthenticator;
use wallet_core::error::WalletError;

use crate::events::EventEmitter;
use crate::login::PasskeyServer;
use crate::queue::RequestQueue;
use crate::store::Store;

/// Shared context threaded through the provider core, the resolution
/// backends, and the login flow. One instance per wallet session; no
/// process-wide singletons.
pub struct Internal {
    pub id: Uuid,
    pub store: Store,
    pub chains: Arc<ChainRegistry>,
    pub queue: Arc<RequestQueue>,
    pub events: EventEmitter,
    pub authenticator: Arc<dyn PasskeyAuthenticator>,
    pub passkey_server: Arc<dyn PasskeyServer>,
    pub poller: StatusPoller,
    /// How often a prepared-but-unsent user operation is recomputed while
    /// the confirmation surface is open.
    pub refresh_interval: Duration,
}

impl Internal {
    pub fn active_chain(&self) -> Result<ConfiguredChain, WalletError> {
        self.chains.get(self.store.get_state().chain.id)
    }
}
