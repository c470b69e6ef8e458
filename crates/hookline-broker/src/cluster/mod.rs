//! Cluster view aggregation.
//!
//! Merges this broker's channel inventory with those of its live peers
//! into the fleet-wide view the routing publisher works from. Peer
//! fetches run in parallel under a hard per-call timeout; a peer that
//! cannot answer simply contributes nothing this cycle.

mod peers;

pub use peers::{DnsPeerDirectory, PeerDirectory, StaticPeerDirectory};

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::future::join_all;
use hookline_proto::ChannelInventory;
use tracing::debug;

use crate::broker::Broker;

/// Fleet-wide channel ownership, keyed by broker address.
#[derive(Debug, Default)]
pub struct ClusterView {
    pub inventories: HashMap<String, ChannelInventory>,
}

/// Builds the cluster view: local snapshot, parallel peer fetches, merge
/// with the local inventory authoritative for this broker's own address.
pub async fn aggregate(broker: &Broker) -> ClusterView {
    let local = broker.registry().snapshot(broker.server_url()).await;
    let peers = broker.peers().live_peers().await;

    let fetches = peers
        .iter()
        .map(|addr| fetch_peer_inventory(broker.http(), *addr));
    let results = join_all(fetches).await;

    let mut inventories = HashMap::new();
    for inventory in results.into_iter().flatten() {
        // The local snapshot is newer than anything a peer echoes back
        // about this broker.
        if inventory.server_url != local.server_url {
            inventories.insert(inventory.server_url.clone(), inventory);
        }
    }
    inventories.insert(local.server_url.clone(), local);

    ClusterView { inventories }
}

/// Fetches one peer's inventory; any failure is skipped.
async fn fetch_peer_inventory(
    client: &reqwest::Client,
    addr: SocketAddr,
) -> Option<ChannelInventory> {
    let url = format!("http://{addr}/internal/channels");
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(peer = %addr, error = %e, "peer inventory fetch failed");
            return None;
        }
    };
    if !response.status().is_success() {
        debug!(peer = %addr, status = %response.status(), "peer inventory fetch rejected");
        return None;
    }
    match response.json::<ChannelInventory>().await {
        Ok(inventory) => Some(inventory),
        Err(e) => {
            debug!(peer = %addr, error = %e, "peer inventory malformed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::config::BrokerConfig;

    fn test_broker(peers: Vec<SocketAddr>) -> Arc<Broker> {
        let config = BrokerConfig {
            advertise_ip: Some("127.0.0.1".parse().unwrap()),
            peer_fetch_timeout: std::time::Duration::from_millis(200),
            ..Default::default()
        };
        Broker::new(
            config,
            Arc::new(StaticPeerDirectory::new(peers)),
            CancellationToken::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn local_inventory_is_authoritative() {
        let broker = test_broker(Vec::new());
        let id = broker.registry().mint().await.unwrap();

        let view = aggregate(&broker).await;
        let local = &view.inventories[broker.server_url()];
        assert!(local.ws_channels.contains(&id));
        assert_eq!(view.inventories.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_peers_are_skipped() {
        // Nothing listens on this port; the fetch fails and is skipped.
        let broker = test_broker(vec!["127.0.0.1:1".parse().unwrap()]);
        let view = aggregate(&broker).await;
        assert_eq!(view.inventories.len(), 1);
        assert!(view.inventories.contains_key(broker.server_url()));
    }
}
