//! Broker configuration.

use std::net::IpAddr;
use std::time::Duration;

/// Environment variable holding the shared token secret. Token gating is
/// enabled iff it is set and non-empty.
pub const SECRET_ENV: &str = "HOOKLINE_SECRET";

/// Runtime configuration for one broker node.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// HTTP listen port; also the port peers are assumed to serve on.
    pub port: u16,
    /// DNS name resolving to the peer brokers (headless service domain).
    /// `None` disables peer discovery.
    pub peer_domain: Option<String>,
    /// Reap cadence and maximum idle age for minted-but-unattached
    /// channels.
    pub cleanup_duration: Duration,
    /// Gossip bind port, kept for membership-layer wiring.
    pub memberlist_port: u16,
    /// Peer-directory refresh cadence.
    pub memberlist_sync_duration: Duration,
    /// Hard timeout for a webhook awaiting its tunnel response.
    pub response_timeout: Duration,
    /// Hard per-call timeout for peer inventory fetches.
    pub peer_fetch_timeout: Duration,
    /// Grace budget for draining connections at shutdown.
    pub shutdown_grace: Duration,
    /// Shared secret enabling token gating when present.
    pub secret: Option<String>,
    /// Advertised self IP; discovered via [`crate::net::local_ip`] when
    /// unset.
    pub advertise_ip: Option<IpAddr>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            peer_domain: None,
            cleanup_duration: Duration::from_secs(60),
            memberlist_port: 7946,
            memberlist_sync_duration: Duration::from_secs(15),
            response_timeout: Duration::from_secs(30),
            peer_fetch_timeout: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(10),
            secret: None,
            advertise_ip: None,
        }
    }
}

impl BrokerConfig {
    /// Reads the token secret from the environment.
    pub fn secret_from_env() -> Option<String> {
        std::env::var(SECRET_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
    }

    /// The callable address other nodes and the proxy use for this
    /// broker.
    pub fn server_url(&self, ip: IpAddr) -> String {
        format!("http://{ip}:{}", self.port)
    }

    /// Whether token gating is enabled.
    pub fn token_gated(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}
