//! Broker HTTP server: route assembly, minting and inventory endpoints,
//! run loop with graceful shutdown and the minted-channel reaper.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::cluster::{DnsPeerDirectory, PeerDirectory, StaticPeerDirectory};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::middleware::{RequestLogLayer, SessionAuthLayer};
use crate::net;
use crate::routing::traefik_config_handler;
use crate::tunnel::{tunnel_handler, tunnel_missing_channel};
use crate::webhook::{webhook_handler, webhook_subpath_handler};

/// Builds the broker's router. Exposed separately from [`run`] so tests
/// can serve it on an ephemeral port.
pub fn router(broker: Arc<Broker>) -> Router {
    let mint_routes = {
        let routes = Router::new().route("/new", post(mint_handler));
        match broker.secret() {
            Some(secret) => routes.route_layer(SessionAuthLayer::new(secret)),
            None => routes,
        }
    };

    Router::new()
        .route("/internal/channels", get(internal_channels_handler))
        .route("/traefik-config", get(traefik_config_handler))
        .route("/ws", get(tunnel_missing_channel))
        .route("/ws/", get(tunnel_missing_channel))
        .route("/ws/{channel_id}", get(tunnel_handler))
        .route("/webhook/{channel_id}", any(webhook_handler))
        .route("/webhook/{channel_id}/{*rest}", any(webhook_subpath_handler))
        .route("/healthz", get(health_handler))
        .merge(mint_routes)
        .layer(RequestLogLayer::new())
        .with_state(broker)
}

/// Runs a broker node until the token fires, then drains within the
/// configured grace budget.
pub async fn run(config: BrokerConfig, cancel: CancellationToken) -> Result<(), BrokerError> {
    let mut config = config;
    let ip = config.advertise_ip.unwrap_or_else(net::local_ip);
    config.advertise_ip = Some(ip);

    let peers: Arc<dyn PeerDirectory> = match config.peer_domain.clone().filter(|d| !d.is_empty())
    {
        Some(domain) => {
            let directory = DnsPeerDirectory::new(domain, config.port, ip);
            directory.spawn_refresh(config.memberlist_sync_duration, cancel.clone());
            directory
        }
        None => Arc::new(StaticPeerDirectory::default()),
    };

    let broker = Broker::new(config.clone(), peers, cancel.clone())?;
    spawn_reaper(broker.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        server_url = %broker.server_url(),
        node = %net::node_name(),
        token_gated = broker.secret().is_some(),
        "broker listening"
    );

    serve(listener, broker, cancel).await
}

/// Serves an already-bound listener. Split out for tests.
pub async fn serve(
    listener: tokio::net::TcpListener,
    broker: Arc<Broker>,
    cancel: CancellationToken,
) -> Result<(), BrokerError> {
    let grace = broker.config().shutdown_grace;
    let app = router(broker.clone());

    let shutdown = cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    tokio::select! {
        result = &mut server => return flatten(result),
        () = cancel.cancelled() => {}
    }

    info!("shutdown signal received, closing tunnels");
    broker.close_all_tunnels().await;

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => flatten(result)?,
        Err(_) => {
            warn!("shutdown grace period exceeded, aborting listener");
            server.abort();
        }
    }
    info!("broker shutdown complete");
    Ok(())
}

fn flatten(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), BrokerError> {
    match result {
        Ok(io_result) => io_result.map_err(BrokerError::Io),
        Err(join) => Err(BrokerError::Internal(format!("server task failed: {join}"))),
    }
}

/// Periodically removes minted channels that never attached.
fn spawn_reaper(broker: Arc<Broker>) {
    tokio::spawn(async move {
        let max_age = broker.config().cleanup_duration;
        let mut ticker = tokio::time::interval(max_age);
        // the immediate first tick would reap nothing
        ticker.tick().await;
        loop {
            tokio::select! {
                () = broker.cancel().cancelled() => return,
                _ = ticker.tick() => {
                    let reaped = broker.registry().reap(max_age).await;
                    if !reaped.is_empty() {
                        info!(count = reaped.len(), "reaped idle minted channels");
                    }
                }
            }
        }
    });
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MintResponse {
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_token: Option<String>,
}

/// `POST /new`: allocates and pre-registers a fresh channel. When token
/// gating is enabled the response also carries the channel token the
/// agent must present on attach.
async fn mint_handler(
    State(broker): State<Arc<Broker>>,
) -> Result<Json<MintResponse>, BrokerError> {
    let channel_id = broker
        .registry()
        .mint()
        .await
        .map_err(|e| BrokerError::Internal(e.to_string()))?;

    let channel_token = broker
        .secret()
        .map(|secret| hookline_auth::issue_channel_token(secret, &channel_id))
        .transpose()
        .map_err(|e| BrokerError::Internal(e.to_string()))?;

    info!(channel_id = %channel_id, "minted new channel");
    Ok(Json(MintResponse {
        channel_id,
        channel_token,
    }))
}

/// `GET /internal/channels`: this broker's inventory for peers.
async fn internal_channels_handler(State(broker): State<Arc<Broker>>) -> impl IntoResponse {
    Json(broker.registry().snapshot(broker.server_url()).await)
}

/// `GET /healthz`.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "OK" }))
}
