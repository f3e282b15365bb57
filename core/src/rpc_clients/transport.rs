use alloy::{
    rpc::json_rpc::{RequestPacket, ResponsePacket},
    transports::{
        TransportError, TransportErrorKind, TransportFut, TransportResult, http::reqwest,
    },
};
use std::task;
use tower::Service;
use tracing::{Instrument, debug, debug_span};

/// An HTTP JSON-RPC transport backed by a shared `reqwest` client.
///
/// Every endpoint of a chain (general RPC, bundler, paymaster) gets its own
/// transport instance, but they all draw from one connection pool.
#[derive(Clone, Debug)]
pub struct PooledTransport {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl PooledTransport {
    pub fn new(client: reqwest::Client, url: reqwest::Url) -> Self {
        Self { client, url }
    }

    async fn do_request(self, req: RequestPacket) -> TransportResult<ResponsePacket> {
        let resp = self
            .client
            .post(self.url)
            .json(&req)
            .send()
            .await
            .map_err(TransportErrorKind::custom)?;
        let status = resp.status();
        debug!(?status, "received response from server");

        let body = resp.bytes().await.map_err(TransportErrorKind::custom)?;

        if !status.is_success() {
            return Err(TransportErrorKind::http_error(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }

        serde_json::from_slice(&body)
            .map_err(|err| TransportError::deser_err(err, String::from_utf8_lossy(&body)))
    }
}

impl Service<RequestPacket> for PooledTransport {
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    #[inline]
    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    #[inline]
    fn call(&mut self, req: RequestPacket) -> Self::Future {
        let this = self.clone();
        let span = debug_span!("PooledTransport", url = ?this.url);
        Box::pin(this.do_request(req).instrument(span))
    }
}

/// Hands out [`PooledTransport`]s that share one connection pool.
#[derive(Clone, Debug)]
pub struct TransportPool {
    shared_client: reqwest::Client,
}

impl TransportPool {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            shared_client: client,
        }
    }

    pub fn transport(&self, url: reqwest::Url) -> PooledTransport {
        PooledTransport::new(self.shared_client.clone(), url)
    }
}
