// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed OAuth `state` parameter.
//!
//! The state binds a callback to the session that started the flow:
//! `base64url(username|nonce|issued_at_hex|hmac_hex)`. The nonce is also kept
//! in an HttpOnly cookie, so a callback is only accepted from the browser that
//! initiated it, for the same user, within [`STATE_TTL_SECS`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How long an issued state stays valid.
pub const STATE_TTL_SECS: i64 = 10 * 60;

/// Tolerated clock difference for states issued "in the future".
const CLOCK_SKEW_SECS: i64 = 60;

/// Random bytes in each nonce.
const NONCE_BYTES: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("state parameter missing")]
    Missing,
    #[error("state parameter malformed")]
    Malformed,
    #[error("state signature mismatch")]
    BadSignature,
    #[error("state expired")]
    Expired,
    #[error("state issued for a different user")]
    WrongUser,
    #[error("state does not match this session")]
    NonceMismatch,
    #[error("random number generation failed")]
    Rng,
    #[error("invalid state signing key")]
    Key,
}

/// State parameter plus the nonce to store in the caller's session.
#[derive(Debug, Clone)]
pub struct IssuedState {
    pub state: String,
    pub nonce: String,
}

/// Hex-encoded random token of `bytes` random bytes.
pub fn random_hex(bytes: usize) -> Result<String, StateError> {
    let mut buf = vec![0u8; bytes];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| StateError::Rng)?;
    Ok(hex::encode(buf))
}

fn sign(payload: &str, key: &[u8]) -> Result<HmacSha256, StateError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| StateError::Key)?;
    mac.update(payload.as_bytes());
    Ok(mac)
}

/// Issue a new state for `username`.
pub fn issue(username: &str, key: &[u8], now: DateTime<Utc>) -> Result<IssuedState, StateError> {
    let nonce = random_hex(NONCE_BYTES)?;
    let payload = format!("{}|{}|{:x}", username, nonce, now.timestamp());
    let signature = hex::encode(sign(&payload, key)?.finalize().into_bytes());

    let state = URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature).as_bytes());
    Ok(IssuedState { state, nonce })
}

/// Verify a callback `state` against the current session.
pub fn verify(
    state: &str,
    key: &[u8],
    username: &str,
    session_nonce: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), StateError> {
    if state.is_empty() {
        return Err(StateError::Missing);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(state)
        .map_err(|_| StateError::Malformed)?;
    let decoded = String::from_utf8(bytes).map_err(|_| StateError::Malformed)?;

    // Usernames cannot contain '|', so split from the right.
    let parts: Vec<&str> = decoded.rsplitn(4, '|').collect();
    let &[signature_hex, issued_hex, nonce, state_user] = parts.as_slice() else {
        return Err(StateError::Malformed);
    };

    let signature = hex::decode(signature_hex).map_err(|_| StateError::Malformed)?;
    let payload = format!("{}|{}|{}", state_user, nonce, issued_hex);
    sign(&payload, key)?
        .verify_slice(&signature)
        .map_err(|_| StateError::BadSignature)?;

    let issued_at = i64::from_str_radix(issued_hex, 16).map_err(|_| StateError::Malformed)?;
    let age = now.timestamp() - issued_at;
    if age > STATE_TTL_SECS || age < -CLOCK_SKEW_SECS {
        return Err(StateError::Expired);
    }

    if state_user != username {
        return Err(StateError::WrongUser);
    }

    let session_nonce = session_nonce.ok_or(StateError::NonceMismatch)?;
    if !bool::from(nonce.as_bytes().ct_eq(session_nonce.as_bytes())) {
        return Err(StateError::NonceMismatch);
    }

    Ok(())
}
