//! Signed OAuth state nonce.
//!
//! Format: `base64url(nonce) + "." + base64url(HMAC-SHA256(nonce))`
//! where the nonce is 16 random bytes and the MAC is keyed by the shared
//! secret. Validation is constant-time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;

/// Generates a fresh signed state string.
pub fn generate_oauth_state(secret: &[u8]) -> Result<String, AuthError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let nonce_part = URL_SAFE_NO_PAD.encode(nonce);
    let sig = compute_hmac(secret, nonce_part.as_bytes())?;
    Ok(format!("{nonce_part}.{}", URL_SAFE_NO_PAD.encode(sig)))
}

/// Verifies that `state` was produced by [`generate_oauth_state`] with
/// the same secret.
pub fn validate_oauth_state(secret: &[u8], state: &str) -> Result<(), AuthError> {
    let (nonce_part, sig_part) = state.split_once('.').ok_or(AuthError::InvalidState)?;
    let sig = URL_SAFE_NO_PAD
        .decode(sig_part.as_bytes())
        .map_err(|_| AuthError::InvalidState)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| AuthError::InvalidState)?;
    mac.update(nonce_part.as_bytes());
    mac.verify_slice(&sig).map_err(|_| AuthError::InvalidState)
}

fn compute_hmac(secret: &[u8], data: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| AuthError::InvalidState)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
