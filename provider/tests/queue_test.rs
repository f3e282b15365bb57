use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wallet_core::error::WalletError;
use wallet_provider::queue::{RequestQueue, RequestStatus};
use wallet_provider::storage::MemoryStorage;
use wallet_provider::store::{ChainRef, Store};

fn test_store() -> Store {
    Store::load(
        Arc::new(MemoryStorage::new()),
        ChainRef {
            id: 11155111,
            name: "sepolia".into(),
        },
    )
}

/// Wait until the queue holds a pending entry and return its id.
async fn pending_entry_id(store: &Store) -> u64 {
    let mut queue_rx = store.subscribe_queue();
    loop {
        if let Some(entry) = queue_rx
            .borrow_and_update()
            .iter()
            .find(|entry| !entry.status.is_terminal())
        {
            return entry.request.id;
        }
        queue_rx.changed().await.expect("store alive");
    }
}

#[tokio::test]
async fn settlement_resolves_caller_and_removes_entry() {
    let store = test_store();
    let (queue, _task) = RequestQueue::start(store.clone(), None);

    let submission = tokio::spawn({
        let queue = queue.clone();
        async move { queue.submit("wallet_sendCalls", json!([{}])).await }
    });

    let id = pending_entry_id(&store).await;
    queue.complete(
        id,
        RequestStatus::Success {
            result: json!("0xabc"),
        },
    );

    let result = submission.await.unwrap().unwrap();
    assert_eq!(result, json!("0xabc"));

    // The entry is removed as soon as the settlement path observes it.
    let mut queue_rx = store.subscribe_queue();
    loop {
        if queue_rx.borrow_and_update().is_empty() {
            break;
        }
        queue_rx.changed().await.expect("store alive");
    }
}

#[tokio::test]
async fn completion_is_exactly_once() {
    let store = test_store();
    let (queue, _task) = RequestQueue::start(store.clone(), None);

    let submission = tokio::spawn({
        let queue = queue.clone();
        async move { queue.submit("wallet_grantPermissions", json!([{}])).await }
    });

    let id = pending_entry_id(&store).await;
    queue.complete(
        id,
        RequestStatus::Success {
            result: json!("first"),
        },
    );
    // A second write must not overwrite the terminal status or
    // double-settle the caller.
    queue.complete(
        id,
        RequestStatus::Error {
            error: WalletError::user_rejected(),
        },
    );

    let result = submission.await.unwrap().unwrap();
    assert_eq!(result, json!("first"));
}

#[tokio::test]
async fn error_status_rejects_the_caller() {
    let store = test_store();
    let (queue, _task) = RequestQueue::start(store.clone(), None);

    let submission = tokio::spawn({
        let queue = queue.clone();
        async move { queue.submit("eth_requestAccounts", json!([])).await }
    });

    let id = pending_entry_id(&store).await;
    queue.complete(
        id,
        RequestStatus::Error {
            error: WalletError::user_rejected(),
        },
    );

    let err = submission.await.unwrap().unwrap_err();
    assert_eq!(err, WalletError::UserRejected);
}

#[tokio::test]
async fn clearing_the_queue_force_rejects_every_pending_entry() {
    let store = test_store();
    let (queue, _task) = RequestQueue::start(store.clone(), None);

    let first = tokio::spawn({
        let queue = queue.clone();
        async move { queue.submit("wallet_sendCalls", json!([{}])).await }
    });
    let second = tokio::spawn({
        let queue = queue.clone();
        async move { queue.submit("eth_requestAccounts", json!([])).await }
    });

    // Both entries pending, neither resolved.
    pending_entry_id(&store).await;
    queue.clear();

    assert_eq!(first.await.unwrap().unwrap_err(), WalletError::UserRejected);
    assert_eq!(second.await.unwrap().unwrap_err(), WalletError::UserRejected);
    assert!(store.get_state().request_queue.is_empty());
}

#[tokio::test]
async fn an_entry_pruned_without_terminal_status_rejects_its_caller() {
    let store = test_store();
    let (queue, _task) = RequestQueue::start(store.clone(), None);

    let submission = tokio::spawn({
        let queue = queue.clone();
        async move { queue.submit("wallet_sendCalls", json!([{}])).await }
    });

    let id = pending_entry_id(&store).await;
    // Give the settlement task a chance to observe the pending entry.
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Something prunes the entry without ever writing a terminal status.
    store.set_state(|state| {
        state.request_queue.retain(|entry| entry.request.id != id);
    });

    let err = submission.await.unwrap().unwrap_err();
    assert_eq!(err, WalletError::UserRejected);
}

#[tokio::test]
async fn submission_timeout_rejects_and_prunes() {
    let store = test_store();
    let (queue, _task) =
        RequestQueue::start(store.clone(), Some(Duration::from_millis(50)));

    let err = queue
        .submit("wallet_sendCalls", json!([{}]))
        .await
        .unwrap_err();
    assert_eq!(err, WalletError::UserRejected);
    assert!(store.get_state().request_queue.is_empty());
}
