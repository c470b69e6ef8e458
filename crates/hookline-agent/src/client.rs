//! Tunnel client: channel minting, websocket dial and the receive loop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hookline_retry::{Failure, Retrier, RetryError};
use http::header::AUTHORIZATION;
use http::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::forward::Forwarder;

/// Agent runtime configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Broker base URL, e.g. `https://hooks.example.com`.
    pub server_url: String,
    /// Local server webhooks are forwarded to.
    pub target_url: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Per-request timeout for local forwards; `None` disables it.
    pub transfer_timeout: Option<Duration>,
    /// Session token presented to the mint endpoint when the broker is
    /// token-gated.
    pub session_token: Option<String>,
}

impl AgentConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            target_url: "http://localhost:3000".to_owned(),
            insecure: false,
            transfer_timeout: Some(Duration::from_secs(10)),
            session_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MintResponse {
    channel_id: String,
    #[serde(default)]
    channel_token: Option<String>,
}

/// Mints a channel, attaches the tunnel and serves webhooks until the
/// broker closes the tunnel or the token fires.
pub async fn run(config: AgentConfig, cancel: CancellationToken) -> Result<(), AgentError> {
    let server = config.server_url.trim_end_matches('/').to_owned();
    let http = build_http_client(config.insecure)?;

    let minted = mint_channel(&http, &server, config.session_token.as_deref(), &cancel).await?;
    info!(channel_id = %minted.channel_id, "channel issued");
    info!(
        "set the webhook destination to {server}/webhook/{}",
        minted.channel_id
    );

    let ws_url = websocket_url(&server, &minted.channel_id)?;
    let mut request = ws_url
        .as_str()
        .into_client_request()
        .map_err(AgentError::WebSocket)?;
    if let Some(token) = &minted.channel_token {
        let value = format!("Bearer {token}")
            .parse()
            .map_err(|_| AgentError::InvalidUrl("channel token is not header-safe".into()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let stream = connect(request, config.insecure).await?;
    info!("tunnel to the broker established");

    let (sink, mut stream) = stream.split();
    let writer = Arc::new(Mutex::new(sink));
    let forwarder = Forwarder::new(
        &config.target_url,
        config.transfer_timeout,
        writer.clone(),
    )?;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("shutting down agent");
                let _ = writer.lock().await.send(Message::Close(None)).await;
                return Ok(());
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let forwarder = forwarder.clone();
                    tokio::spawn(async move { forwarder.handle(text.as_str().to_owned()).await });
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        let forwarder = forwarder.clone();
                        tokio::spawn(async move { forwarder.handle(text).await });
                    }
                    Err(_) => warn!("non-UTF-8 frame dropped"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("tunnel closed by the broker");
                    return Ok(());
                }
                // pings are answered by the transport
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

fn build_http_client(insecure: bool) -> Result<reqwest::Client, AgentError> {
    let mut builder = reqwest::Client::builder();
    if insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build().map_err(AgentError::Forward)
}

/// POSTs `/new` with exponential backoff; a 401 aborts retrying.
async fn mint_channel(
    http: &reqwest::Client,
    server: &str,
    session_token: Option<&str>,
    cancel: &CancellationToken,
) -> Result<MintResponse, AgentError> {
    let result = Retrier::exponential()
        .max_attempts(5)
        .cancel_token(cancel.clone())
        .run(|| async {
            let mut request = http.post(format!("{server}/new"));
            if let Some(token) = session_token {
                request = request.bearer_auth(token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| Failure::Retryable(AgentError::Mint(e.to_string())))?;

            match response.status() {
                status if status.is_success() => response
                    .json::<MintResponse>()
                    .await
                    .map_err(|e| Failure::Retryable(AgentError::Mint(e.to_string()))),
                StatusCode::UNAUTHORIZED => Err(hookline_retry::skip(AgentError::Unauthorized)),
                status => Err(Failure::Retryable(AgentError::Mint(format!(
                    "mint endpoint returned {status}"
                )))),
            }
        })
        .await;

    result.map_err(|e| match e {
        RetryError::MaxRetry(inner) | RetryError::Skipped(inner) => inner,
        RetryError::Cancelled => AgentError::Cancelled,
    })
}

fn websocket_url(server: &str, channel_id: &str) -> Result<String, AgentError> {
    let url = reqwest::Url::parse(server).map_err(|e| AgentError::InvalidUrl(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(AgentError::InvalidUrl(format!(
                "unsupported scheme: {other}"
            )))
        }
    };
    let host = url
        .host_str()
        .ok_or_else(|| AgentError::InvalidUrl("missing host".into()))?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    Ok(format!("{scheme}://{authority}/ws/{channel_id}"))
}

async fn connect(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    insecure: bool,
) -> Result<crate::forward::WsStream, AgentError> {
    if insecure {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| AgentError::Tls(e.to_string()))?;
        let (stream, _) = tokio_tungstenite::connect_async_tls_with_config(
            request,
            None,
            false,
            Some(Connector::NativeTls(connector)),
        )
        .await?;
        Ok(stream)
    } else {
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(stream)
    }
}
