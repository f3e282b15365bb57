use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use wallet_core::account::{Account, PersistedAccount};

use crate::queue::QueuedRequest;
use crate::storage::Storage;

/// Storage key for the persisted projection.
pub const STORE_KEY: &str = "wallet.store";

/// The active chain, stored by id (plus its display name for persistence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRef {
    pub id: u64,
    pub name: String,
}

/// The single source of truth: connected accounts, active chain, and the
/// pending-request queue.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub accounts: Vec<Account>,
    pub chain: ChainRef,
    pub request_queue: Vec<QueuedRequest>,
}

impl State {
    pub fn account_for(&self, address: alloy::primitives::Address) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|account| account.address == address)
    }
}

/// The projection that survives restarts: accounts with signing material
/// stripped, plus the active chain. The request queue and live keys are
/// process-lifetime only.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    accounts: Vec<PersistedAccount>,
    chain: ChainRef,
}

struct StoreInner {
    state: Mutex<State>,
    storage: Arc<dyn Storage>,
    accounts_tx: watch::Sender<Vec<Account>>,
    chain_tx: watch::Sender<ChainRef>,
    queue_tx: watch::Sender<Vec<QueuedRequest>>,
}

/// Reactive state container with selector-scoped subscriptions: a
/// subscriber on accounts does not wake on unrelated queue churn.
///
/// All mutation goes through [`Store::set_state`]; updaters run under one
/// lock so no two of them interleave (whole-snapshot last-writer-wins).
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new(storage: Arc<dyn Storage>, initial: State) -> Self {
        let (accounts_tx, _) = watch::channel(initial.accounts.clone());
        let (chain_tx, _) = watch::channel(initial.chain.clone());
        let (queue_tx, _) = watch::channel(initial.request_queue.clone());

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(initial),
                storage,
                accounts_tx,
                chain_tx,
                queue_tx,
            }),
        }
    }

    /// Seed initial state from the persisted projection. Rehydrated
    /// accounts come back without signing capability; a fresh credential
    /// assertion re-attaches it later.
    pub fn load(storage: Arc<dyn Storage>, default_chain: ChainRef) -> Self {
        let initial = match storage.get_item(STORE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedState>(&raw) {
                Ok(persisted) => State {
                    accounts: persisted.accounts.into_iter().map(Account::from).collect(),
                    chain: persisted.chain,
                    request_queue: Vec::new(),
                },
                Err(err) => {
                    tracing::warn!(error = %err, "discarding unreadable persisted state");
                    State {
                        accounts: Vec::new(),
                        chain: default_chain,
                        request_queue: Vec::new(),
                    }
                }
            },
            Ok(None) => State {
                accounts: Vec::new(),
                chain: default_chain,
                request_queue: Vec::new(),
            },
            Err(err) => {
                tracing::warn!(error = %err, "storage unavailable, starting empty");
                State {
                    accounts: Vec::new(),
                    chain: default_chain,
                    request_queue: Vec::new(),
                }
            }
        };

        Self::new(storage, initial)
    }

    pub fn get_state(&self) -> State {
        self.inner.state.lock().expect("store lock").clone()
    }

    /// Apply a pure updater to the snapshot, persist the redacted
    /// projection, and notify only the subscribers whose slice changed.
    pub fn set_state(&self, updater: impl FnOnce(&mut State)) {
        let snapshot = {
            let mut state = self.inner.state.lock().expect("store lock");
            updater(&mut state);

            let persisted = PersistedState {
                accounts: state.accounts.iter().map(Account::redacted).collect(),
                chain: state.chain.clone(),
            };
            match serde_json::to_string(&persisted) {
                Ok(raw) => {
                    if let Err(err) = self.inner.storage.set_item(STORE_KEY, &raw) {
                        tracing::warn!(error = %err, "failed to persist store snapshot");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to serialize store snapshot");
                }
            }

            state.clone()
        };

        self.inner.accounts_tx.send_if_modified(|current| {
            if *current != snapshot.accounts {
                *current = snapshot.accounts.clone();
                true
            } else {
                false
            }
        });
        self.inner.chain_tx.send_if_modified(|current| {
            if *current != snapshot.chain {
                *current = snapshot.chain.clone();
                true
            } else {
                false
            }
        });
        self.inner.queue_tx.send_if_modified(|current| {
            if *current != snapshot.request_queue {
                *current = snapshot.request_queue.clone();
                true
            } else {
                false
            }
        });
    }

    pub fn subscribe_accounts(&self) -> watch::Receiver<Vec<Account>> {
        self.inner.accounts_tx.subscribe()
    }

    pub fn subscribe_chain(&self) -> watch::Receiver<ChainRef> {
        self.inner.chain_tx.subscribe()
    }

    pub fn subscribe_queue(&self) -> watch::Receiver<Vec<QueuedRequest>> {
        self.inner.queue_tx.subscribe()
    }
}
