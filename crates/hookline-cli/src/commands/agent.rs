//! `hookline agent`: attach a tunnel and forward webhooks locally.

use std::time::Duration;

use hookline_agent::AgentConfig;
use tokio_util::sync::CancellationToken;

pub struct AgentArgs {
    pub server_url: String,
    pub target_url: String,
    pub insecure: bool,
    pub transfer_request_timeout: Duration,
    pub disable_transfer_request_timeout: bool,
    pub token: Option<String>,
}

pub async fn run(args: AgentArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let transfer_timeout = if args.disable_transfer_request_timeout {
        None
    } else {
        Some(args.transfer_request_timeout)
    };

    let config = AgentConfig {
        server_url: args.server_url,
        target_url: args.target_url,
        insecure: args.insecure,
        transfer_timeout,
        session_token: args.token,
    };

    hookline_agent::run(config, cancel).await?;
    Ok(())
}
