//! Unverified JWT claim decoding.
//!
//! The client never verifies signatures; the backend does. Claims are only read to
//! learn the expiry and to build a provisional identity. Every helper returns
//! `None` on malformed input.

use crate::{auth::types::Identity, codec};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Decodes the payload segment of a compact JWT.
#[must_use]
pub fn decode_claims(token: &str) -> Option<Value> {
    let mut parts = token.trim().split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let bytes = codec::decode(payload).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

/// Reads the `exp` claim (seconds since the epoch).
#[must_use]
pub fn expiry(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_claims(token)?;
    let exp = claims.get("exp")?;
    let seconds = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp(seconds, 0)
}

/// Builds an identity from the token claims.
#[must_use]
pub fn identity(token: &str) -> Option<Identity> {
    Identity::from_claims(&decode_claims(token)?)
}
