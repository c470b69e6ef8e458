//! The hookline agent.
//!
//! Mints a channel on a broker, attaches the websocket tunnel and
//! forwards each inbound webhook to a local target, returning the raw
//! HTTP response over the tunnel. Each request is forwarded on its own
//! task; the tunnel write half is serialised behind a mutex.

pub mod client;
pub mod error;
pub mod forward;

pub use client::{run, AgentConfig};
pub use error::AgentError;
