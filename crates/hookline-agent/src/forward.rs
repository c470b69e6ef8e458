//! Local forwarding: restores tunnel payloads to HTTP requests, sends
//! them to the target and returns the raw response.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use hookline_proto::{rawhttp, TunnelFrame};
use http::header::{CONTENT_LENGTH, HOST};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use crate::error::AgentError;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;

/// Forwards restored webhook requests to the local target.
pub struct Forwarder {
    target: reqwest::Url,
    client: reqwest::Client,
    transfer_timeout: Option<Duration>,
    writer: Arc<Mutex<WsSink>>,
}

impl Forwarder {
    pub fn new(
        target_url: &str,
        transfer_timeout: Option<Duration>,
        writer: Arc<Mutex<WsSink>>,
    ) -> Result<Arc<Self>, AgentError> {
        let target =
            reqwest::Url::parse(target_url).map_err(|e| AgentError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(AgentError::Forward)?;
        Ok(Arc::new(Self {
            target,
            client,
            transfer_timeout,
            writer,
        }))
    }

    /// Handles one inbound data frame end to end. Local failures come
    /// back to the broker as a synthesised 502 response for the same
    /// request id.
    pub async fn handle(self: Arc<Self>, text: String) {
        let frame = match TunnelFrame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "malformed tunnel frame dropped");
                return;
            }
        };

        info!(req_id = %frame.req_id, "forwarding webhook to local target");
        let payload = match self.forward(&frame.payload).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(req_id = %frame.req_id, error = %e, "local forward failed");
                rawhttp::bad_gateway_response()
            }
        };

        self.send(TunnelFrame::new(frame.req_id, payload)).await;
    }

    async fn forward(&self, raw: &[u8]) -> Result<Vec<u8>, AgentError> {
        let parsed = rawhttp::parse_request(raw)?;

        let url = self
            .target
            .join(&parsed.target)
            .map_err(|e| AgentError::InvalidUrl(e.to_string()))?;

        // The client re-derives host and framing for the new target
        let mut headers = parsed.headers;
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);

        let mut request = self
            .client
            .request(parsed.method, url)
            .headers(headers)
            .body(parsed.body);
        if let Some(timeout) = self.transfer_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        info!(status = status.as_u16(), "local target answered");
        Ok(rawhttp::dump_response(status, &headers, &body))
    }

    async fn send(&self, frame: TunnelFrame) {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "response frame could not be encoded");
                return;
            }
        };
        if let Err(e) = self.writer.lock().await.send(Message::Text(text.into())).await {
            warn!(error = %e, "tunnel write failed");
        }
    }
}
