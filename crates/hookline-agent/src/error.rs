//! Agent error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("channel minting failed: {0}")]
    Mint(String),

    #[error("unauthorized: the broker rejected the session token")]
    Unauthorized,

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("local forward failed: {0}")]
    Forward(#[from] reqwest::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] hookline_proto::ProtocolError),

    #[error("cancelled")]
    Cancelled,
}
