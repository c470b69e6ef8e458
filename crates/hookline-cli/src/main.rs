//! hookline binary: broker server, local agent and echo target.

mod commands;
mod duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use duration::parse_duration;

#[derive(Parser)]
#[command(name = "hookline")]
#[command(about = "Webhook-over-websocket reverse tunnel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a broker node
    Server {
        /// HTTP listen port
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// DNS domain resolving to the peer brokers
        #[arg(long)]
        peer_domain: Option<String>,

        /// Reap age for minted channels that never attached
        #[arg(long, default_value = "60s", value_parser = parse_duration)]
        cleanup_duration: std::time::Duration,

        /// Membership gossip bind port
        #[arg(long, default_value_t = 7946)]
        memberlist_port: u16,

        /// Peer directory refresh cadence
        #[arg(long, default_value = "15s", value_parser = parse_duration)]
        memberlist_sync_duration: std::time::Duration,
    },

    /// Run the local agent
    Agent {
        /// Broker base URL (e.g. https://hooks.example.com)
        #[arg(long)]
        server_url: String,

        /// Local server to forward webhook requests to
        #[arg(long, default_value = "http://localhost:3000")]
        target_url: String,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,

        /// Timeout for transfers to the local server
        #[arg(long, default_value = "10s", value_parser = parse_duration)]
        transfer_request_timeout: std::time::Duration,

        /// Disable the transfer timeout
        #[arg(long)]
        disable_transfer_request_timeout: bool,

        /// Session token for a token-gated broker
        #[arg(long)]
        token: Option<String>,
    },

    /// Run a local echo target
    Echo {
        /// Listen port
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug,hyper=info,tower=info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, initiating graceful shutdown");
        cancel_on_signal.cancel();
    });

    let result = match cli.command {
        Commands::Server {
            port,
            peer_domain,
            cleanup_duration,
            memberlist_port,
            memberlist_sync_duration,
        } => {
            commands::server::run(
                commands::server::ServerArgs {
                    port,
                    peer_domain,
                    cleanup_duration,
                    memberlist_port,
                    memberlist_sync_duration,
                },
                cancel,
            )
            .await
        }
        Commands::Agent {
            server_url,
            target_url,
            insecure,
            transfer_request_timeout,
            disable_transfer_request_timeout,
            token,
        } => {
            commands::agent::run(
                commands::agent::AgentArgs {
                    server_url,
                    target_url,
                    insecure,
                    transfer_request_timeout,
                    disable_transfer_request_timeout,
                    token,
                },
                cancel,
            )
            .await
        }
        Commands::Echo { port } => commands::echo::run(port, cancel).await,
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        return Err(e);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C");
        }
        () = terminate => {
            info!("Received SIGTERM");
        }
    }
}
