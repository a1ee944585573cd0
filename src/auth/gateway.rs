//! Authenticated request chokepoint.
//!
//! Every call that needs the session goes through [`HttpGateway::fetch`]:
//!
//! 1. Read the stored session; if the access token is (nearly) expired, run the
//!    shared refresh and read the store again.
//! 2. Send with `Authorization: <tokenType> <accessToken>`.
//! 3. On `401`, run the shared refresh once more and replay the request once with
//!    the new token. A final `401` clears the stored session and the identity cache.
//!
//! The shared refresh is single-flight: one `POST /auth/refresh` at a time for all
//! clones of the gateway. Refresh tokens rotate on use, so a second concurrent
//! refresh would present a token the server already invalidated.
//!
//! A refresh the server rejects (4xx) or one attempted with an expired refresh
//! token ends the session. Outages (5xx, network, undecodable bodies) keep it so
//! the next call can try again.

use crate::{
    auth::{
        cache::SessionCache,
        token::TokenStore,
        types::{RefreshRequest, TokenResponse},
    },
    errors::Error,
    transport::{
        handle_empty_response, handle_json_response, handle_value_response, ApiRequest,
        ApiTransport,
    },
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

pub const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefreshOutcome {
    Refreshed,
    /// The refresh token is no longer usable; the session was cleared.
    Rejected,
    /// Nothing changed: no token to present, the server was unreachable, or the
    /// session was replaced while the request was in flight.
    Unavailable,
}

type RefreshSlot = Arc<Mutex<Option<Arc<OnceCell<RefreshOutcome>>>>>;

#[derive(Clone, Debug)]
pub struct HttpGateway {
    transport: ApiTransport,
    tokens: TokenStore,
    cache: SessionCache,
    skew_seconds: i64,
    in_flight: RefreshSlot,
}

impl HttpGateway {
    #[must_use]
    pub fn new(
        transport: ApiTransport,
        tokens: TokenStore,
        cache: SessionCache,
        skew_seconds: i64,
    ) -> Self {
        Self {
            transport,
            tokens,
            cache,
            skew_seconds,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &ApiTransport {
        &self.transport
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Sends `request` with the current session and returns the final response
    /// untouched, whatever its status.
    ///
    /// # Errors
    /// Only transport failures (`Network`, `Timeout`) and request building errors.
    pub async fn fetch(&self, request: &ApiRequest) -> Result<Response, Error> {
        let mut auth = self.tokens.read();
        if auth
            .as_ref()
            .is_some_and(|auth| self.tokens.is_expired(auth, self.skew_seconds))
        {
            debug!("access token expired or about to; refreshing first");
            self.refresh().await;
            auth = self.tokens.read();
        }

        let response = self.transport.send(request, auth.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("{} {} returned 401", request.method(), request.path());
        if !self.refresh().await {
            self.clear_session();
            return Ok(response);
        }

        let auth = self.tokens.read();
        let replay = self.transport.send(request, auth.as_ref()).await?;
        if replay.status() == StatusCode::UNAUTHORIZED {
            self.clear_session();
        }
        Ok(replay)
    }

    /// Runs the shared refresh, joining one already in flight. Returns whether a
    /// new token pair was stored. Never fails; problems are logged.
    pub async fn refresh(&self) -> bool {
        let cell = {
            let mut slot = self.in_flight.lock().await;
            Arc::clone(slot.get_or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let outcome = *cell.get_or_init(|| self.perform_refresh()).await;

        let mut slot = self.in_flight.lock().await;
        if slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            *slot = None;
        }
        outcome == RefreshOutcome::Refreshed
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let Some(auth) = self.tokens.read() else {
            debug!("no stored session to refresh");
            return RefreshOutcome::Unavailable;
        };
        let Some(refresh_token) = auth.refresh_token.as_deref() else {
            debug!("no refresh token stored");
            return RefreshOutcome::Unavailable;
        };
        if self.tokens.is_refresh_expired(&auth) {
            debug!("refresh token expired");
            return self.end_session(refresh_token);
        }

        let body = RefreshRequest { refresh_token };
        let request = match ApiRequest::post(REFRESH_PATH).json_body(&body) {
            Ok(request) => request,
            Err(err) => {
                warn!("Failed to build refresh request: {}", err);
                return RefreshOutcome::Unavailable;
            }
        };

        let response = match self.transport.send(&request, None).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Token refresh failed: {}", err);
                return RefreshOutcome::Unavailable;
            }
        };

        if response.status().is_client_error() {
            warn!("Token refresh rejected with {}", response.status());
            return self.end_session(refresh_token);
        }

        let pair = match handle_json_response::<TokenResponse>(response).await {
            Ok(pair) => pair,
            Err(err) => {
                warn!("Token refresh failed: {}", err);
                return RefreshOutcome::Unavailable;
            }
        };

        match self.tokens.rotate(refresh_token, pair.into()) {
            Ok(Some(auth)) => {
                self.cache.repopulate(&auth.access_token);
                info!("access token refreshed");
                RefreshOutcome::Refreshed
            }
            Ok(None) => RefreshOutcome::Unavailable,
            Err(err) => {
                warn!("Failed to store refreshed session: {}", err);
                RefreshOutcome::Unavailable
            }
        }
    }

    fn end_session(&self, refresh_token: &str) -> RefreshOutcome {
        if self.tokens.discard(refresh_token) {
            warn!("refresh token no longer valid; signing out");
            self.cache.clear();
        }
        RefreshOutcome::Rejected
    }

    fn clear_session(&self) {
        warn!("session rejected by the server; signing out");
        self.tokens.clear();
        self.cache.clear();
    }

    /// GETs `path` through the gateway and decodes the JSON response.
    ///
    /// # Errors
    /// `Unauthorized` when the session could not be recovered, `Http` for other
    /// non-2xx responses, `Parse` for undecodable bodies, plus transport errors.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.send_json(&ApiRequest::get(path)).await
    }

    /// # Errors
    /// Same as [`HttpGateway::get_json`].
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        let response = authorized(self.fetch(request).await?)?;
        handle_json_response(response).await
    }

    /// Like [`HttpGateway::send_json`] but tolerates empty and non-JSON bodies.
    ///
    /// # Errors
    /// Same as [`HttpGateway::get_json`].
    pub async fn send_value(&self, request: &ApiRequest) -> Result<Value, Error> {
        let response = authorized(self.fetch(request).await?)?;
        handle_value_response(response).await
    }

    /// # Errors
    /// Same as [`HttpGateway::get_json`].
    pub async fn send_empty(&self, request: &ApiRequest) -> Result<(), Error> {
        let response = authorized(self.fetch(request).await?)?;
        handle_empty_response(response).await
    }
}

fn authorized(response: Response) -> Result<Response, Error> {
    if response.status() == StatusCode::UNAUTHORIZED {
        Err(Error::Unauthorized)
    } else {
        Ok(response)
    }
}
