//! Webhook ingress: request/response correlation over the tunnel.
//!
//! The tunnel is a single shared duplex; multiplexing relies purely on
//! the frame's request id. The per-channel write mutex guarantees frames
//! are never interleaved on the wire, and ordering across concurrent
//! webhooks is deliberately unspecified.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ws::Message;
use axum::extract::{Path, State};
use axum::http::header::{CONNECTION, CONTENT_LENGTH};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use futures_util::SinkExt;
use hookline_proto::{rawhttp, TunnelFrame};
use tracing::debug;

use crate::broker::Broker;
use crate::error::BrokerError;

/// `ANY /webhook/{channel_id}`.
pub async fn webhook_handler(
    State(broker): State<Arc<Broker>>,
    Path(channel_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BrokerError> {
    dispatch(broker, channel_id, method, uri, headers, body).await
}

/// `ANY /webhook/{channel_id}/...`.
pub async fn webhook_subpath_handler(
    State(broker): State<Arc<Broker>>,
    Path((channel_id, _rest)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BrokerError> {
    dispatch(broker, channel_id, method, uri, headers, body).await
}

async fn dispatch(
    broker: Arc<Broker>,
    channel_id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, BrokerError> {
    let state = broker
        .registry()
        .lookup(&channel_id)
        .await
        .ok_or(BrokerError::NotFound)?;
    if !state.is_attached() {
        return Err(BrokerError::NotFound);
    }

    let raw = rawhttp::dump_request(&method, &uri, &headers, &body);
    let req_id = uuid::Uuid::new_v4().to_string();
    let text = TunnelFrame::new(req_id.clone(), raw)
        .encode()
        .map_err(|e| BrokerError::Internal(e.to_string()))?;

    // The ticket deregisters on drop, covering every exit path.
    let mut ticket = broker.pending().register(&req_id);
    debug!(channel_id = %channel_id, req_id = %req_id, "forwarding webhook over tunnel");

    {
        let mut slot = state.tunnel().await;
        let sink = slot.as_mut().ok_or(BrokerError::NotFound)?;
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            return Err(BrokerError::BadGateway(format!("tunnel write failed: {e}")));
        }
    }

    let closed = state.closed();
    tokio::select! {
        biased;
        result = ticket.recv() => match result {
            Ok(bytes) => build_response(&bytes),
            Err(_) => Err(BrokerError::BadGateway("rendezvous abandoned".into())),
        },
        () = closed.cancelled() => {
            Err(BrokerError::BadGateway("tunnel closed before response".into()))
        }
        () = tokio::time::sleep(broker.config().response_timeout) => Err(BrokerError::Timeout),
    }
}

/// Restores the agent's raw HTTP/1.1 response as the webhook reply.
fn build_response(bytes: &[u8]) -> Result<Response, BrokerError> {
    let parsed = rawhttp::parse_response(bytes)
        .map_err(|e| BrokerError::BadGateway(format!("undecodable tunnel response: {e}")))?;

    let mut response = Response::new(Body::from(parsed.body));
    *response.status_mut() = parsed.status;
    for (name, value) in &parsed.headers {
        // Framing is re-established by this server
        if name == CONNECTION || name == CONTENT_LENGTH {
            continue;
        }
        response.headers_mut().append(name, value.clone());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn build_response_copies_status_headers_and_body() {
        let raw =
            b"HTTP/1.1 201 Created\r\nx-upstream: local\r\ncontent-length: 2\r\n\r\nok".to_vec();
        let response = build_response(&raw).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-upstream"], "local");
    }

    #[test]
    fn build_response_rejects_garbage() {
        let err = build_response(b"definitely not http").unwrap_err();
        assert!(matches!(err, BrokerError::BadGateway(_)));
    }
}
