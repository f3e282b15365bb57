use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;
use wallet_aa_core::status::StatusPoller;
use wallet_core::chain::{ChainDescriptor, ChainRegistry};
use wallet_core::credentials::PasskeyAuthenticator;
use wallet_core::error::WalletError;

use crate::backend::{Backend, Teardown};
use crate::events::{EventEmitter, ProviderEvent, ProviderInfo};
use crate::internal::Internal;
use crate::login::PasskeyServer;
use crate::provider::Provider;
use crate::queue::RequestQueue;
use crate::storage::Storage;
use crate::store::{ChainRef, Store};

pub struct WalletConfig {
    /// Static chain list; the first entry is the initially active chain.
    pub chains: Vec<ChainDescriptor>,
    /// Whether to surface a discovery announcement.
    pub announce_provider: bool,
    pub storage: Arc<dyn Storage>,
    pub backend: Backend,
    pub authenticator: Arc<dyn PasskeyAuthenticator>,
    pub passkey_server: Arc<dyn PasskeyServer>,
    /// Recompute interval for prepared-but-unsent user operations.
    pub refresh_interval: Duration,
    /// Optional cap on how long an enqueued request may await resolution.
    pub request_timeout: Option<Duration>,
}

impl WalletConfig {
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(20);
}

struct BackendSlot {
    backend: Arc<RwLock<Arc<Backend>>>,
    teardown: Teardown,
}

/// One wallet session: store, queue, provider, and the active resolution
/// backend, with explicit teardown. Construct inside a tokio runtime.
pub struct Wallet {
    internal: Arc<Internal>,
    provider: Arc<Provider>,
    slot: tokio::sync::Mutex<BackendSlot>,
    tasks: Vec<JoinHandle<()>>,
    announced: Option<ProviderInfo>,
}

impl Wallet {
    pub fn create(config: WalletConfig) -> Result<Self, WalletError> {
        let default_chain = config
            .chains
            .first()
            .ok_or_else(|| WalletError::validation("at least one chain must be configured"))?;
        let chain_ref = ChainRef {
            id: default_chain.chain_id,
            name: default_chain.name.clone(),
        };

        let chains = Arc::new(ChainRegistry::new(config.chains));
        let store = Store::load(config.storage, chain_ref);
        let (queue, settlement_task) = RequestQueue::start(store.clone(), config.request_timeout);

        let internal = Arc::new(Internal {
            id: Uuid::new_v4(),
            store: store.clone(),
            chains,
            queue,
            events: EventEmitter::new(),
            authenticator: config.authenticator,
            passkey_server: config.passkey_server,
            poller: StatusPoller::default(),
            refresh_interval: config.refresh_interval,
        });

        let backend = Arc::new(config.backend);
        let teardown = backend.setup(internal.clone());
        let backend_slot = Arc::new(RwLock::new(backend));

        let provider = Arc::new(Provider::new(internal.clone(), backend_slot.clone()));

        let event_bridge = tokio::spawn(event_bridge(internal.clone()));

        let announced = config.announce_provider.then(|| {
            let info = provider.info();
            tracing::info!(uuid = %info.uuid, rdns = %info.rdns, "announcing wallet provider");
            info
        });

        Ok(Self {
            internal,
            provider,
            slot: tokio::sync::Mutex::new(BackendSlot {
                backend: backend_slot,
                teardown,
            }),
            tasks: vec![settlement_task, event_bridge],
            announced,
        })
    }

    pub fn provider(&self) -> Arc<Provider> {
        self.provider.clone()
    }

    /// The session's state container. Confirmation surfaces subscribe to
    /// it; host applications normally only touch the provider.
    pub fn store(&self) -> Store {
        self.internal.store.clone()
    }

    pub fn announcement(&self) -> Option<&ProviderInfo> {
        self.announced.as_ref()
    }

    /// Replace the active resolution backend. The previous backend's
    /// resources are torn down before the new one is installed.
    pub async fn set_backend(&self, backend: Backend) {
        let mut slot = self.slot.lock().await;
        slot.teardown.run();

        let backend = Arc::new(backend);
        slot.teardown = backend.setup(self.internal.clone());
        *slot.backend.write().await = backend;
    }

    /// Tear down the session: backend resources, background tasks, and
    /// every still-pending request (force-rejected, never leaked).
    pub async fn destroy(&self) {
        let mut slot = self.slot.lock().await;
        slot.teardown.run();

        self.internal.queue.clear();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Forwards store changes to dApp-facing provider events, independent of
/// any in-flight request.
async fn event_bridge(internal: Arc<Internal>) {
    let mut accounts_rx = internal.store.subscribe_accounts();
    let mut chain_rx = internal.store.subscribe_chain();
    let mut had_accounts = !accounts_rx.borrow().is_empty();

    loop {
        tokio::select! {
            changed = accounts_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let accounts: Vec<_> = accounts_rx
                    .borrow_and_update()
                    .iter()
                    .map(|account| account.address)
                    .collect();
                internal
                    .events
                    .emit(ProviderEvent::AccountsChanged(accounts.clone()));
                if accounts.is_empty() && had_accounts {
                    internal.events.emit(ProviderEvent::Disconnect);
                }
                had_accounts = !accounts.is_empty();
            }
            changed = chain_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let chain_id = chain_rx.borrow_and_update().id;
                internal.events.emit(ProviderEvent::ChainChanged(chain_id));
            }
        }
    }
}
