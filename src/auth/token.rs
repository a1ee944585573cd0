//! Persisted token pair and expiry bookkeeping. No network access happens here;
//! the gateway decides when to refresh and calls back into this store.

use crate::{
    auth::{
        clock::Clock,
        jwt,
        storage::AuthStorage,
        types::{SaveTokens, StoredAuth},
    },
    errors::Error,
};
use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Storage key holding the serialized `StoredAuth`.
pub const AUTH_STORAGE_KEY: &str = "auth";

#[derive(Clone, Debug)]
pub struct TokenStore {
    storage: Arc<dyn AuthStorage>,
    clock: Arc<dyn Clock>,
    key: String,
    // Serializes writes so a rotation can compare and replace in one step.
    write: Arc<Mutex<()>>,
}

impl TokenStore {
    #[must_use]
    pub fn new(storage: Arc<dyn AuthStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            key: AUTH_STORAGE_KEY.to_string(),
            write: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Persists a new token pair, replacing whatever was stored before.
    ///
    /// The access token expiry comes from `expires_in` when present, otherwise
    /// from the JWT `exp` claim. A TTL too large to represent is ignored.
    ///
    /// # Errors
    /// Returns an error if the record cannot be serialized or written.
    pub fn save(&self, params: SaveTokens) -> Result<StoredAuth, Error> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_record(params)
    }

    /// Stores a rotated pair, but only while the session still holds
    /// `presented_refresh_token`. Returns `None` when the session was cleared or
    /// replaced in the meantime; the new pair is dropped then.
    ///
    /// # Errors
    /// Returns an error if the record cannot be serialized or written.
    pub fn rotate(
        &self,
        presented_refresh_token: &str,
        params: SaveTokens,
    ) -> Result<Option<StoredAuth>, Error> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.read().and_then(|auth| auth.refresh_token);
        if current.as_deref() != Some(presented_refresh_token) {
            debug!("session changed during refresh; discarding rotated tokens");
            return Ok(None);
        }
        self.write_record(params).map(Some)
    }

    /// Clears the session if it still holds `presented_refresh_token`.
    /// Returns whether anything was removed.
    pub fn discard(&self, presented_refresh_token: &str) -> bool {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.read().and_then(|auth| auth.refresh_token);
        if current.as_deref() == Some(presented_refresh_token) {
            self.storage.remove(&self.key);
            true
        } else {
            false
        }
    }

    fn write_record(&self, params: SaveTokens) -> Result<StoredAuth, Error> {
        let now = self.clock.now();
        let access_token = params.access_token.expose_secret().to_string();
        let token_expiry = jwt::expiry(&access_token);

        let access_token_expires_at = match params.expires_in {
            Some(seconds) => match after(now, seconds) {
                Some(derived) => {
                    if let Some(exp) = token_expiry {
                        if (exp - derived).num_seconds().abs() > 5 {
                            debug!(
                                "expires_in and token exp disagree by {}s; using expires_in",
                                (exp - derived).num_seconds()
                            );
                        }
                    }
                    Some(derived)
                }
                None => {
                    debug!("expires_in {} out of range; using token exp", seconds);
                    token_expiry
                }
            },
            None => token_expiry,
        };

        let refresh_token = params
            .refresh_token
            .as_ref()
            .map(|token| token.expose_secret().to_string());
        let refresh_token_expires_at = match (&refresh_token, params.refresh_token_expires_in) {
            (Some(_), Some(seconds)) => after(now, seconds),
            _ => None,
        };

        let auth = StoredAuth {
            token_type: params.token_type,
            access_token,
            refresh_token,
            access_token_expires_at,
            refresh_token_expires_at,
        };

        let serialized = serde_json::to_string(&auth)
            .map_err(|err| Error::Serialization(format!("Failed to encode session: {err}")))?;
        self.storage.set(&self.key, &serialized)?;

        debug!(
            expires_at = ?auth.access_token_expires_at,
            has_refresh_token = auth.refresh_token.is_some(),
            "stored session"
        );
        Ok(auth)
    }

    /// Reads the stored session. Missing or corrupt data reads as `None`.
    #[must_use]
    pub fn read(&self) -> Option<StoredAuth> {
        let raw = self.storage.get(&self.key)?;
        match serde_json::from_str::<StoredAuth>(&raw) {
            Ok(auth) if !auth.access_token.is_empty() => Some(auth),
            Ok(_) => None,
            Err(err) => {
                debug!("ignoring unreadable session record: {}", err);
                None
            }
        }
    }

    pub fn clear(&self) {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.remove(&self.key);
    }

    /// Whether the access token is expired, or within `skew_seconds` of expiring.
    /// A record without an expiry is never considered expired.
    #[must_use]
    pub fn is_expired(&self, auth: &StoredAuth, skew_seconds: i64) -> bool {
        is_expired_at(auth.access_token_expires_at, skew_seconds, self.clock.now())
    }

    #[must_use]
    pub fn is_refresh_expired(&self, auth: &StoredAuth) -> bool {
        is_expired_at(auth.refresh_token_expires_at, 0, self.clock.now())
    }
}

/// `now + seconds`, or `None` when that is not a representable instant.
fn after(now: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(seconds).and_then(|ttl| now.checked_add_signed(ttl))
}

/// `expires_at - now <= skew`, with an unknown expiry counting as not expired.
#[must_use]
pub fn is_expired_at(
    expires_at: Option<DateTime<Utc>>,
    skew_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    expires_at.is_some_and(|expires_at| {
        (expires_at - now).num_milliseconds() <= skew_seconds.saturating_mul(1000)
    })
}
