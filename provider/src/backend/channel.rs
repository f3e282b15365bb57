use std::sync::Arc;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use wallet_core::error::WalletError;

use super::Teardown;
use crate::internal::Internal;
use crate::queue::{QueuedRequest, RequestStatus};

/// Typed envelope for the cross-context confirmation protocol. Request and
/// response are correlated by the queued request's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Envelope {
    /// Announcement from the embedded surface that it is ready to receive.
    Loaded,
    /// Host -> surface: the entry currently under review.
    Request { request: QueuedRequest },
    /// Surface -> host: the same entry, now carrying a terminal status.
    Response { request: QueuedRequest },
}

/// Cross-context resolution backend: the confirmation surface lives in
/// another context (an embedded frame, another process) and is reached
/// over a message channel.
///
/// Host obligations: no forwarding before the `Loaded` handshake, exactly
/// one active request at a time, and an unexpected channel close counts as
/// an implicit user rejection of the in-flight entry.
pub struct ChannelBackend {
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl ChannelBackend {
    pub fn new(
        outbound: mpsc::UnboundedSender<Envelope>,
        inbound: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            outbound,
            inbound: Mutex::new(Some(inbound)),
        }
    }

    pub(crate) fn spawn_host(&self, internal: Arc<Internal>) -> Teardown {
        let Some(inbound) = self.inbound.lock().expect("channel lock").take() else {
            tracing::warn!("channel backend set up twice; ignoring");
            return Teardown::noop();
        };
        let outbound = self.outbound.clone();
        let handle = tokio::spawn(host_loop(internal, outbound, inbound));
        Teardown::new(move || handle.abort())
    }
}

async fn host_loop(
    internal: Arc<Internal>,
    outbound: mpsc::UnboundedSender<Envelope>,
    mut inbound: mpsc::UnboundedReceiver<Envelope>,
) {
    // Nothing is forwarded until the surface announces itself.
    loop {
        match inbound.recv().await {
            Some(Envelope::Loaded) => break,
            Some(_) => continue,
            None => {
                tracing::debug!("channel closed before handshake");
                return;
            }
        }
    }
    tracing::debug!("channel surface loaded");

    let mut queue_rx = internal.store.subscribe_queue();
    let mut in_flight: Option<u64> = None;

    loop {
        if in_flight.is_none() {
            let next: Option<QueuedRequest> = queue_rx
                .borrow_and_update()
                .iter()
                .find(|entry| !entry.status.is_terminal())
                .cloned();

            if let Some(entry) = next {
                let id = entry.request.id;
                if outbound.send(Envelope::Request { request: entry }).is_err() {
                    tracing::debug!("channel closed while forwarding");
                    return;
                }
                in_flight = Some(id);
            }
        }

        tokio::select! {
            changed = queue_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            message = inbound.recv() => match message {
                Some(Envelope::Response { request }) => {
                    if in_flight == Some(request.request.id) {
                        internal.queue.complete(request.request.id, request.status);
                        in_flight = None;
                    } else {
                        tracing::debug!(
                            response_id = request.request.id,
                            "dropping response for request not under review"
                        );
                    }
                }
                Some(Envelope::Loaded) => {}
                Some(Envelope::Request { .. }) => {
                    tracing::debug!("unexpected request envelope from surface");
                }
                None => {
                    // Unexpected close or navigation of the embedded
                    // surface: the in-flight entry is implicitly rejected.
                    if let Some(id) = in_flight.take() {
                        internal.queue.complete(
                            id,
                            RequestStatus::Error {
                                error: WalletError::user_rejected(),
                            },
                        );
                    }
                    tracing::debug!("channel closed, host loop exiting");
                    return;
                }
            }
        }
    }
}
