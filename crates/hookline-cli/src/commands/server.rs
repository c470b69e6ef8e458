//! `hookline server`: run a broker node.

use std::time::Duration;

use hookline_broker::BrokerConfig;
use tokio_util::sync::CancellationToken;

pub struct ServerArgs {
    pub port: u16,
    pub peer_domain: Option<String>,
    pub cleanup_duration: Duration,
    pub memberlist_port: u16,
    pub memberlist_sync_duration: Duration,
}

pub async fn run(args: ServerArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let config = BrokerConfig {
        port: args.port,
        peer_domain: args.peer_domain,
        cleanup_duration: args.cleanup_duration,
        memberlist_port: args.memberlist_port,
        memberlist_sync_duration: args.memberlist_sync_duration,
        secret: BrokerConfig::secret_from_env(),
        ..Default::default()
    };

    hookline_broker::run(config, cancel).await?;
    Ok(())
}
