//! Self-address discovery.
//!
//! Containerised deployments inject `POD_IP`; elsewhere the routable
//! address is learned by connecting a UDP socket outward and reading the
//! local endpoint. No packets are sent by the probe.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::{debug, info};

const POD_IP_ENV: &str = "POD_IP";
const HOSTNAME_ENV: &str = "HOSTNAME";

/// The IP this broker should advertise to peers and the proxy.
pub fn local_ip() -> IpAddr {
    if let Some(ip) = pod_ip() {
        info!(%ip, "using POD_IP from environment");
        return ip;
    }
    if let Some(ip) = probe_local_ip() {
        info!(%ip, "using probed local IP");
        return ip;
    }
    debug!("falling back to loopback address");
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn pod_ip() -> Option<IpAddr> {
    let raw = std::env::var(POD_IP_ENV).ok()?;
    match raw.parse::<IpAddr>() {
        Ok(ip @ IpAddr::V4(_)) => Some(ip),
        _ => None,
    }
}

fn probe_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Node name for log context and membership identity.
pub fn node_name() -> String {
    std::env::var(HOSTNAME_ENV)
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| {
            let id = uuid::Uuid::new_v4().to_string();
            format!("node-{}", &id[..8])
        })
}
