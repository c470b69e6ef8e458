//! Session and channel bearer tokens.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Session token lifetime.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Channel token lifetime.
pub const CHANNEL_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Discriminates session tokens from channel tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Channel,
}

/// Claims carried by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User identity (session) or channel id (channel).
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

/// Issues a session token for the given user identity.
pub fn issue_session_token(secret: &[u8], username: &str) -> Result<String, AuthError> {
    issue(secret, username, TokenKind::Session, SESSION_TTL)
}

/// Issues a channel token whose subject is the channel id.
pub fn issue_channel_token(secret: &[u8], channel_id: &str) -> Result<String, AuthError> {
    issue(secret, channel_id, TokenKind::Channel, CHANNEL_TTL)
}

fn issue(
    secret: &[u8],
    subject: &str,
    kind: TokenKind,
    ttl: Duration,
) -> Result<String, AuthError> {
    let now = unix_now();
    let claims = Claims {
        sub: subject.to_owned(),
        iat: now,
        exp: now + ttl.as_secs(),
        kind,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?;
    Ok(token)
}

/// Parses and validates a signed token, checking signature and expiry.
pub fn parse_token(secret: &[u8], token: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(data.claims)
}

/// Validates a session token.
pub fn validate_session_token(secret: &[u8], token: &str) -> Result<Claims, AuthError> {
    let claims = parse_token(secret, token)?;
    if claims.kind != TokenKind::Session {
        return Err(AuthError::WrongKind {
            expected: "session",
        });
    }
    Ok(claims)
}

/// Validates a channel token and checks its subject against the channel id.
pub fn validate_channel_token(
    secret: &[u8],
    token: &str,
    channel_id: &str,
) -> Result<(), AuthError> {
    let claims = parse_token(secret, token)?;
    if claims.kind != TokenKind::Channel {
        return Err(AuthError::WrongKind {
            expected: "channel",
        });
    }
    if claims.sub != channel_id {
        return Err(AuthError::SubjectMismatch);
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-key-for-testing-only";

    #[test]
    fn session_token_roundtrip() {
        let token = issue_session_token(SECRET, "octocat").unwrap();
        let claims = validate_session_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, "octocat");
        assert_eq!(claims.kind, TokenKind::Session);
        assert!(claims.exp - claims.iat == SESSION_TTL.as_secs());
    }

    #[test]
    fn channel_token_matches_subject() {
        let token = issue_channel_token(SECRET, "c1").unwrap();
        assert!(validate_channel_token(SECRET, &token, "c1").is_ok());
        assert!(matches!(
            validate_channel_token(SECRET, &token, "c2"),
            Err(AuthError::SubjectMismatch)
        ));
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let session = issue_session_token(SECRET, "octocat").unwrap();
        let channel = issue_channel_token(SECRET, "c1").unwrap();

        assert!(matches!(
            validate_channel_token(SECRET, &session, "octocat"),
            Err(AuthError::WrongKind { expected: "channel" })
        ));
        assert!(matches!(
            validate_session_token(SECRET, &channel),
            Err(AuthError::WrongKind { expected: "session" })
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue_session_token(SECRET, "octocat").unwrap();
        assert!(validate_session_token(b"other-secret", &token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let now = unix_now();
        let claims = Claims {
            sub: "octocat".into(),
            iat: now - 100,
            exp: now - 90,
            kind: TokenKind::Session,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(validate_session_token(SECRET, &token).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_token(SECRET, "not-a-token").is_err());
    }
}
