use crate::{auth::types::StoredAuth, Session};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

fn timestamp(at: Option<DateTime<Utc>>) -> Value {
    at.map_or(Value::Null, |at| Value::String(at.to_rfc3339()))
}

fn describe(session: &Session, auth: &StoredAuth) -> Value {
    let tokens = session.tokens();
    json!({
        "signedIn": true,
        "tokenType": auth.token_type,
        "accessTokenExpiresAt": timestamp(auth.access_token_expires_at),
        "accessTokenExpired": tokens.is_expired(auth, session.config().refresh_skew_seconds()),
        "hasRefreshToken": auth.refresh_token.is_some(),
        "refreshTokenExpiresAt": timestamp(auth.refresh_token_expires_at),
        "refreshTokenExpired": tokens.is_refresh_expired(auth),
    })
}

/// Prints the stored token metadata. Token values are never printed.
/// # Errors
/// Returns an error if the output cannot be encoded.
pub fn status(session: &Session) -> Result<()> {
    let report = match session.current() {
        Some(auth) => describe(session, &auth),
        None => json!({"signedIn": false}),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// # Errors
/// Returns an error when nobody is signed in.
pub async fn whoami(session: &Session) -> Result<()> {
    let Some(identity) = session.identity().await else {
        bail!("not signed in");
    };
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

/// # Errors
/// Returns an error when the refresh is refused or impossible.
pub async fn refresh(session: &Session) -> Result<()> {
    if !session.refresh().await {
        bail!("session refresh failed, sign in again");
    }
    status(session)
}

pub fn logout(session: &Session) {
    session.logout();
    println!("signed out");
}
