use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wallet_core::error::WalletError;

use crate::store::Store;

/// A raw JSON-RPC call as received from the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RequestStatus {
    Pending,
    Success { result: Value },
    Error { error: WalletError },
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// One entry in the pending-request queue. Identity is the RPC id; the
/// status is written to a terminal value exactly once, by whoever resolves
/// the request (a confirmation surface, a channel peer, or a forced clear).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub request: RpcCall,
    #[serde(flatten)]
    pub status: RequestStatus,
}

struct Waiters {
    pending: HashMap<u64, oneshot::Sender<Result<Value, WalletError>>>,
    /// Ids that have been observed in the queue at least once. An id that
    /// was seen and then vanished without a terminal status was orphaned;
    /// its waiter is rejected rather than left to hang.
    seen: HashSet<u64>,
}

/// The durable, observable coordination point between the provider core
/// and whichever resolution backend is installed.
///
/// `submit` parks an entry in the store's queue and returns a future keyed
/// by request id; a background settlement task is the single writer that
/// observes terminal statuses, removes the entries, and settles the
/// corresponding futures.
pub struct RequestQueue {
    store: Store,
    waiters: Mutex<Waiters>,
    next_id: AtomicU64,
    /// Optional cap on how long a submission may stay pending.
    timeout: Option<Duration>,
}

impl RequestQueue {
    /// Create the queue and spawn its settlement task. The handle must be
    /// aborted on wallet teardown.
    pub fn start(store: Store, timeout: Option<Duration>) -> (Arc<Self>, JoinHandle<()>) {
        let queue = Arc::new(Self {
            store: store.clone(),
            waiters: Mutex::new(Waiters {
                pending: HashMap::new(),
                seen: HashSet::new(),
            }),
            next_id: AtomicU64::new(1),
            timeout,
        });

        let task = tokio::spawn({
            let queue = queue.clone();
            let mut queue_rx = store.subscribe_queue();
            async move {
                loop {
                    queue.settle();
                    if queue_rx.changed().await.is_err() {
                        break;
                    }
                }
            }
        });

        (queue, task)
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue a request and wait for its terminal status.
    pub async fn submit(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let id = self.next_request_id();
        let request = RpcCall {
            id,
            method: method.to_string(),
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("waiters lock")
            .pending
            .insert(id, tx);

        self.store.set_state(|state| {
            state.request_queue.push(QueuedRequest {
                request,
                status: RequestStatus::Pending,
            });
        });

        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    tracing::debug!(request_id = id, "request timed out awaiting resolution");
                    self.drop_entry(id);
                    return Err(WalletError::user_rejected());
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(result) => result,
            // The sender vanished without settling; treat like a cleared
            // queue entry.
            Err(_) => Err(WalletError::user_rejected()),
        }
    }

    /// Write a terminal status onto a pending entry. No-op when the entry
    /// is already terminal or gone, which makes implicit-rejection paths
    /// (dismissal, channel close) safe to fire alongside explicit ones.
    pub fn complete(&self, id: u64, status: RequestStatus) {
        if !status.is_terminal() {
            return;
        }
        self.store.set_state(|state| {
            if let Some(entry) = state
                .request_queue
                .iter_mut()
                .find(|entry| entry.request.id == id && !entry.status.is_terminal())
            {
                entry.status = status;
            }
        });
    }

    /// Force-reject every pending entry and waiter. Used on teardown so no
    /// caller promise is ever leaked.
    pub fn clear(&self) {
        self.store.set_state(|state| {
            state.request_queue.clear();
        });

        let waiters: Vec<_> = {
            let mut guard = self.waiters.lock().expect("waiters lock");
            guard.seen.clear();
            guard.pending.drain().collect()
        };
        for (id, tx) in waiters {
            tracing::debug!(request_id = id, "force-rejecting pending request");
            let _ = tx.send(Err(WalletError::user_rejected()));
        }
    }

    /// Remove a single entry (timeout path) without touching others.
    fn drop_entry(&self, id: u64) {
        self.store.set_state(|state| {
            state.request_queue.retain(|entry| entry.request.id != id);
        });
        let mut guard = self.waiters.lock().expect("waiters lock");
        guard.pending.remove(&id);
        guard.seen.remove(&id);
    }

    /// The single settlement path: resolve terminal entries, remove them
    /// from the queue, and reject waiters whose entries vanished.
    fn settle(&self) {
        let queue = self.store.get_state().request_queue;

        let terminal: Vec<QueuedRequest> = queue
            .iter()
            .filter(|entry| entry.status.is_terminal())
            .cloned()
            .collect();

        if !terminal.is_empty() {
            let terminal_ids: HashSet<u64> =
                terminal.iter().map(|entry| entry.request.id).collect();
            self.store.set_state(|state| {
                state
                    .request_queue
                    .retain(|entry| !terminal_ids.contains(&entry.request.id));
            });
        }

        let live_ids: HashSet<u64> = queue
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .map(|entry| entry.request.id)
            .collect();

        let mut settlements: Vec<(oneshot::Sender<Result<Value, WalletError>>, Result<Value, WalletError>)> =
            Vec::new();
        {
            let mut guard = self.waiters.lock().expect("waiters lock");

            for entry in &terminal {
                let id = entry.request.id;
                guard.seen.remove(&id);
                if let Some(tx) = guard.pending.remove(&id) {
                    let outcome = match &entry.status {
                        RequestStatus::Success { result } => Ok(result.clone()),
                        RequestStatus::Error { error } => Err(error.clone()),
                        RequestStatus::Pending => unreachable!("terminal entries only"),
                    };
                    settlements.push((tx, outcome));
                }
            }

            // Entries that were observed pending earlier and are now gone
            // without a terminal status: the queue was pruned underneath
            // the caller. Reject instead of hanging forever.
            let orphaned: Vec<u64> = guard
                .seen
                .iter()
                .copied()
                .filter(|id| !live_ids.contains(id) && guard.pending.contains_key(id))
                .collect();
            for id in orphaned {
                guard.seen.remove(&id);
                if let Some(tx) = guard.pending.remove(&id) {
                    tracing::debug!(request_id = id, "queue entry vanished, rejecting caller");
                    settlements.push((tx, Err(WalletError::user_rejected())));
                }
            }

            guard.seen.extend(live_ids);
        }

        for (tx, outcome) in settlements {
            let _ = tx.send(outcome);
        }
    }
}
