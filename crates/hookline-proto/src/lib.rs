//! Wire formats shared by the hookline broker and agent.
//!
//! A tunnel carries [`TunnelFrame`] messages: JSON text frames binding a
//! correlation id to an opaque byte payload. The payload is a raw
//! HTTP/1.1 byte stream produced and consumed by the [`rawhttp`] module.
//! Brokers additionally exchange [`ChannelInventory`] snapshots and emit
//! the [`routing`] document consumed by the external proxy.

pub mod error;
pub mod frame;
pub mod inventory;
pub mod rawhttp;
pub mod routing;

pub use error::ProtocolError;
pub use frame::TunnelFrame;
pub use inventory::ChannelInventory;
pub use routing::RoutingDocument;
