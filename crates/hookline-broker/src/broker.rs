//! The broker aggregate: composition root for all shared state.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cluster::PeerDirectory;
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::net;
use crate::pending::PendingRequests;
use crate::registry::ChannelRegistry;

/// Write half of an attached tunnel websocket.
pub type TunnelSink = SplitSink<WebSocket, Message>;

/// Everything one broker node owns: the channel registry, the
/// pending-request table, the peer directory and the outbound HTTP
/// client. Constructed once at startup and threaded to handlers as
/// shared state; there are no process-wide singletons.
pub struct Broker {
    registry: ChannelRegistry<TunnelSink>,
    pending: Arc<PendingRequests>,
    peers: Arc<dyn PeerDirectory>,
    http: reqwest::Client,
    config: BrokerConfig,
    server_url: String,
    secret: Option<Vec<u8>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("server_url", &self.server_url)
            .field("token_gated", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

impl Broker {
    pub fn new(
        config: BrokerConfig,
        peers: Arc<dyn PeerDirectory>,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, BrokerError> {
        let ip = config.advertise_ip.unwrap_or_else(net::local_ip);
        let server_url = config.server_url(ip);

        let http = reqwest::Client::builder()
            .timeout(config.peer_fetch_timeout)
            .build()
            .map_err(|e| BrokerError::Internal(format!("http client: {e}")))?;

        let secret = config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_bytes().to_vec());

        Ok(Arc::new(Self {
            registry: ChannelRegistry::new(),
            pending: Arc::new(PendingRequests::new()),
            peers,
            http,
            config,
            server_url,
            secret,
            cancel,
        }))
    }

    pub fn registry(&self) -> &ChannelRegistry<TunnelSink> {
        &self.registry
    }

    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    pub fn peers(&self) -> &Arc<dyn PeerDirectory> {
        &self.peers
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// The address this broker advertises in inventories and routing
    /// documents.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Token secret when gating is enabled.
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref()
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Number of in-flight webhook correlations.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Detaches every channel and closes its tunnel. Used at shutdown;
    /// in-flight webhooks observe the per-channel close and fail with
    /// 502 rather than waiting out their timeout.
    pub async fn close_all_tunnels(&self) {
        for id in self.registry.ids().await {
            if let Some(mut sink) = self.registry.detach(&id).await {
                let _ = sink.send(Message::Close(None)).await;
                info!(channel_id = %id, "tunnel closed at shutdown");
            }
        }
    }
}
