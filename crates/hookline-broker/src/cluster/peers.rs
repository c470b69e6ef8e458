//! Peer directory: which other brokers are currently live.
//!
//! The membership protocol itself is external; the broker consumes this
//! contract only. The DNS implementation suits headless-service
//! deployments where one domain resolves to every pod in the fleet.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Live peer brokers, excluding this node.
#[async_trait]
pub trait PeerDirectory: Send + Sync + std::fmt::Debug {
    async fn live_peers(&self) -> Vec<SocketAddr>;
}

/// Fixed peer set; used in tests and static deployments.
#[derive(Debug, Default)]
pub struct StaticPeerDirectory {
    peers: Vec<SocketAddr>,
}

impl StaticPeerDirectory {
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl PeerDirectory for StaticPeerDirectory {
    async fn live_peers(&self) -> Vec<SocketAddr> {
        self.peers.clone()
    }
}

/// Resolves a peer domain to the fleet's addresses, excluding self.
///
/// The cache is refreshed on a periodic cadence by [`spawn_refresh`];
/// a cold cache resolves inline on first use.
///
/// [`spawn_refresh`]: DnsPeerDirectory::spawn_refresh
#[derive(Debug)]
pub struct DnsPeerDirectory {
    domain: String,
    port: u16,
    self_ip: IpAddr,
    cached: RwLock<Option<Vec<SocketAddr>>>,
}

impl DnsPeerDirectory {
    pub fn new(domain: impl Into<String>, port: u16, self_ip: IpAddr) -> Arc<Self> {
        Arc::new(Self {
            domain: domain.into(),
            port,
            self_ip,
            cached: RwLock::new(None),
        })
    }

    /// Re-resolves the domain and replaces the cache.
    pub async fn refresh(&self) {
        match tokio::net::lookup_host((self.domain.as_str(), self.port)).await {
            Ok(addrs) => {
                let peers: Vec<SocketAddr> =
                    addrs.filter(|addr| addr.ip() != self.self_ip).collect();
                debug!(domain = %self.domain, peers = peers.len(), "peer directory refreshed");
                *self.cached.write().await = Some(peers);
            }
            Err(e) => {
                // Common right after startup while DNS converges; keep
                // whatever the last resolution produced.
                debug!(domain = %self.domain, error = %e, "DNS lookup failed, will retry");
            }
        }
    }

    /// Runs the refresh loop until the token fires.
    pub fn spawn_refresh(self: &Arc<Self>, interval: std::time::Duration, cancel: CancellationToken) {
        let directory = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("stopping peer directory refresh");
                        return;
                    }
                    _ = ticker.tick() => directory.refresh().await,
                }
            }
        });
    }
}

#[async_trait]
impl PeerDirectory for DnsPeerDirectory {
    async fn live_peers(&self) -> Vec<SocketAddr> {
        if let Some(peers) = self.cached.read().await.clone() {
            return peers;
        }
        self.refresh().await;
        self.cached.read().await.clone().unwrap_or_default()
    }
}
