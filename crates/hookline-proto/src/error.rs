//! Error types for the wire formats.

use thiserror::Error;

/// Errors raised while encoding or decoding tunnel traffic.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame exceeds the size bound.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame is not valid JSON or does not match the frame shape.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Raw HTTP payload could not be parsed.
    #[error("malformed HTTP payload: {0}")]
    MalformedHttp(String),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),
}
