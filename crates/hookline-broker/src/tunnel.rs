//! Tunnel session handling: websocket attach and inbound demux.
//!
//! Attach is atomic across the upgrade: the pre-upgrade checks reject
//! obvious losers with an HTTP status, and the post-upgrade install
//! under the per-channel mutex settles any race, closing the freshly
//! upgraded socket of the loser with a policy close code.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use hookline_proto::TunnelFrame;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::middleware::bearer_token;
use crate::registry::AttachError;

#[derive(Debug, Deserialize)]
pub struct TunnelParams {
    /// Channel token fallback for websocket clients that cannot set an
    /// Authorization header.
    token: Option<String>,
}

/// `GET /ws/{channel_id}`: validates the channel token, enforces
/// at-most-one attachment and upgrades to the tunnel.
pub async fn tunnel_handler(
    State(broker): State<Arc<Broker>>,
    Path(channel_id): Path<String>,
    Query(params): Query<TunnelParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, BrokerError> {
    if let Some(secret) = broker.secret() {
        let token = bearer_token(&headers)
            .map(str::to_owned)
            .or(params.token)
            .ok_or(BrokerError::Unauthorized)?;
        hookline_auth::validate_channel_token(secret, &token, &channel_id)
            .map_err(|_| BrokerError::Unauthorized)?;
    }

    let state = broker
        .registry()
        .lookup(&channel_id)
        .await
        .ok_or(BrokerError::Forbidden)?;
    if state.is_attached() {
        return Err(BrokerError::Conflict);
    }

    // The upgrade happens outside any channel lock; run_session settles
    // the attach race afterwards.
    Ok(ws.on_upgrade(move |socket| run_session(broker, channel_id, socket)))
}

/// `GET /ws` and `GET /ws/`: the channel id is mandatory.
pub async fn tunnel_missing_channel() -> BrokerError {
    BrokerError::BadRequest("missing channel_id".into())
}

async fn run_session(broker: Arc<Broker>, channel_id: String, socket: WebSocket) {
    let (sink, mut stream) = socket.split();

    if let Err((err, mut sink)) = broker.registry().attach(&channel_id, sink).await {
        let reason = match err {
            AttachError::AlreadyAttached => "channel already attached",
            AttachError::NotFound => "channel not registered",
        };
        warn!(channel_id = %channel_id, reason, "attach rejected after upgrade");
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: Utf8Bytes::from_static(reason),
            })))
            .await;
        return;
    }

    info!(channel_id = %channel_id, "agent attached");
    let cancel = broker.cancel().clone();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => deliver_frame(&broker, text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => deliver_frame(&broker, text),
                        Err(_) => warn!(channel_id = %channel_id, "non-UTF-8 frame dropped"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    // pings and pongs are handled by the transport
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(channel_id = %channel_id, error = %e, "tunnel read error");
                        break;
                    }
                }
            }
        }
    }

    // Detachment is the single source of truth for "channel gone";
    // reconnects require re-minting.
    if let Some(mut sink) = broker.registry().detach(&channel_id).await {
        let _ = sink.send(Message::Close(None)).await;
    }
    info!(channel_id = %channel_id, "agent detached");
}

/// Routes one inbound data frame to its pending webhook. Malformed
/// frames are dropped without terminating the session.
fn deliver_frame(broker: &Broker, text: &str) {
    match TunnelFrame::decode(text) {
        Ok(frame) => broker.pending().deliver(&frame.req_id, frame.payload),
        Err(e) => warn!(error = %e, "malformed tunnel frame dropped"),
    }
}
