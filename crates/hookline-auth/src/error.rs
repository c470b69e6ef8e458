//! Authentication error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Token failed signature or expiry validation.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// Token is valid but of the wrong kind for the endpoint.
    #[error("invalid token kind: expected {expected}")]
    WrongKind { expected: &'static str },

    /// Channel token subject does not match the requested channel.
    #[error("token subject does not match channel id")]
    SubjectMismatch,

    /// OAuth state is structurally invalid or carries a bad signature.
    #[error("invalid OAuth state")]
    InvalidState,
}
