#![allow(dead_code)]

use serde_json::{json, Value};
use std::{net::TcpListener, sync::Arc};
use tripkey::{
    auth::{clock::ManualClock, storage::MemoryStorage, types::SaveTokens},
    codec,
    webauthn::CredentialCeremonyProvider,
    ClientConfig, Session,
};

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Unsigned compact JWT around `claims`.
pub fn jwt(claims: &Value) -> String {
    let header = codec::encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = codec::encode(serde_json::to_vec(claims).unwrap_or_default().as_slice());
    format!("{header}.{payload}.c2ln")
}

pub fn token_pair(access_token: &str, refresh_token: &str) -> Value {
    json!({
        "token_type": "Bearer",
        "access_token": access_token,
        "expires_in": 900,
        "refresh_token": refresh_token,
        "refresh_expires_in": 86_400
    })
}

pub fn builder(uri: &str, clock: &ManualClock) -> tripkey::session::SessionBuilder {
    Session::builder(ClientConfig::new(uri))
        .with_clock(Arc::new(clock.clone()))
        .with_storage(Arc::new(MemoryStorage::new()))
}

pub fn session(uri: &str) -> (Session, ManualClock) {
    let clock = ManualClock::default();
    let session = builder(uri, &clock)
        .build()
        .unwrap_or_else(|err| panic!("session: {err}"));
    (session, clock)
}

pub fn session_with_provider(
    uri: &str,
    provider: Arc<dyn CredentialCeremonyProvider>,
) -> Session {
    builder(uri, &ManualClock::default())
        .with_provider(provider)
        .build()
        .unwrap_or_else(|err| panic!("session: {err}"))
}

/// Stores `access_token` valid for `expires_in` seconds, with refresh token `r1`.
pub fn sign_in(session: &Session, access_token: &str, expires_in: i64) {
    session
        .tokens()
        .save(
            SaveTokens::new("Bearer", access_token)
                .expires_in(expires_in)
                .refresh_token("r1", Some(86_400)),
        )
        .unwrap_or_else(|err| panic!("save: {err}"));
}
