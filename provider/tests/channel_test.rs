mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use fixtures::{MockPasskeyServer, TestAuthenticator, test_chains};
use serde_json::json;
use tokio::sync::mpsc;
use wallet_core::error::WalletError;
use wallet_provider::backend::{Backend, ChannelBackend, Envelope};
use wallet_provider::queue::{QueuedRequest, RequestStatus, RpcCall};
use wallet_provider::storage::MemoryStorage;
use wallet_provider::wallet::{Wallet, WalletConfig};

struct ChannelHarness {
    wallet: Wallet,
    /// Envelopes the host forwarded to the (simulated) embedded surface.
    from_host: mpsc::UnboundedReceiver<Envelope>,
    /// Sender the embedded surface uses to talk back to the host.
    to_host: mpsc::UnboundedSender<Envelope>,
}

fn channel_wallet() -> ChannelHarness {
    let (host_tx, from_host) = mpsc::unbounded_channel();
    let (to_host, host_rx) = mpsc::unbounded_channel();

    let wallet = Wallet::create(WalletConfig {
        chains: test_chains(),
        announce_provider: false,
        storage: Arc::new(MemoryStorage::new()),
        backend: Backend::Channel(ChannelBackend::new(host_tx, host_rx)),
        authenticator: Arc::new(TestAuthenticator::new(1)),
        passkey_server: Arc::new(MockPasskeyServer::new()),
        refresh_interval: WalletConfig::DEFAULT_REFRESH_INTERVAL,
        request_timeout: None,
    })
    .unwrap();

    ChannelHarness {
        wallet,
        from_host,
        to_host,
    }
}

fn request_accounts_call(id: u64) -> RpcCall {
    RpcCall {
        id,
        method: "eth_requestAccounts".into(),
        params: json!([]),
    }
}

#[tokio::test]
async fn nothing_is_forwarded_before_the_loaded_handshake() {
    let mut harness = channel_wallet();
    let provider = harness.wallet.provider();

    let pending = tokio::spawn(async move {
        provider.request(request_accounts_call(1)).await
    });

    // The request is enqueued, but the surface has not announced itself.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.from_host.try_recv().is_err());

    // Handshake arrives; the queued entry is forwarded.
    harness.to_host.send(Envelope::Loaded).unwrap();
    let forwarded = tokio::time::timeout(Duration::from_secs(1), harness.from_host.recv())
        .await
        .expect("forward after handshake")
        .expect("channel open");

    let Envelope::Request { request } = forwarded else {
        panic!("expected a request envelope");
    };
    assert_eq!(request.request.method, "eth_requestAccounts");

    // The surface resolves it; the caller settles with the addresses.
    let address = "0x2222222222222222222222222222222222222222";
    harness
        .to_host
        .send(Envelope::Response {
            request: QueuedRequest {
                request: request.request,
                status: RequestStatus::Success {
                    result: json!([address]),
                },
            },
        })
        .unwrap();

    let result = pending.await.unwrap().unwrap();
    assert_eq!(result, json!([address]));

    // The keyless account reported by the remote surface is now connected.
    let state = harness.wallet.store().get_state();
    assert_eq!(state.accounts.len(), 1);
    assert!(state.accounts[0].key.is_none());

    harness.wallet.destroy().await;
}

#[tokio::test]
async fn channel_close_rejects_the_in_flight_entry() {
    let mut harness = channel_wallet();
    let provider = harness.wallet.provider();

    harness.to_host.send(Envelope::Loaded).unwrap();

    let pending = tokio::spawn(async move {
        provider.request(request_accounts_call(1)).await
    });

    // Wait until the entry is under review in the remote surface.
    let forwarded = tokio::time::timeout(Duration::from_secs(1), harness.from_host.recv())
        .await
        .expect("forwarded")
        .expect("channel open");
    assert!(matches!(forwarded, Envelope::Request { .. }));

    // The surface navigates away without deciding.
    drop(harness.to_host);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, WalletError::UserRejected);

    harness.wallet.destroy().await;
}

#[tokio::test]
async fn responses_for_other_requests_are_ignored() {
    let mut harness = channel_wallet();
    let provider = harness.wallet.provider();

    harness.to_host.send(Envelope::Loaded).unwrap();

    let pending = tokio::spawn(async move {
        provider.request(request_accounts_call(1)).await
    });

    let forwarded = tokio::time::timeout(Duration::from_secs(1), harness.from_host.recv())
        .await
        .expect("forwarded")
        .expect("channel open");
    let Envelope::Request { request } = forwarded else {
        panic!("expected a request envelope");
    };

    // A response correlated to some other id must not settle this entry.
    harness
        .to_host
        .send(Envelope::Response {
            request: QueuedRequest {
                request: RpcCall {
                    id: request.request.id + 999,
                    method: "eth_requestAccounts".into(),
                    params: json!([]),
                },
                status: RequestStatus::Success { result: json!([]) },
            },
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    // The correctly correlated response settles it.
    harness
        .to_host
        .send(Envelope::Response {
            request: QueuedRequest {
                request: request.request,
                status: RequestStatus::Error {
                    error: WalletError::user_rejected(),
                },
            },
        })
        .unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, WalletError::UserRejected);

    harness.wallet.destroy().await;
}
