//! Token primitives for the hookline security boundary.
//!
//! Two bearer token kinds exist, both HS256-signed against a shared
//! symmetric secret: *session* tokens (subject = user identity, 24 h)
//! gate the channel minting endpoint, and *channel* tokens (subject =
//! channel id, 30 d) gate tunnel attachment. The [`state`] module holds
//! the signed-nonce primitive used for OAuth round trips.

pub mod error;
pub mod state;
pub mod token;

pub use error::AuthError;
pub use token::{
    issue_channel_token, issue_session_token, parse_token, validate_channel_token,
    validate_session_token, Claims, TokenKind,
};
