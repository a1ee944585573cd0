//! Client configuration for API endpoints, timeouts and session bookkeeping.
//!
//! Defaults come from build-time environment variables so a packaged build can
//! target one backend without extra setup. Runtime environment variables (and the
//! CLI flags layered on top of them) override the build-time values; empty runtime
//! values are ignored. Configuration values are public; do not store secrets here.

use crate::errors::Error;
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Default request timeout applied to every HTTP call.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Seconds before `accessTokenExpiresAt` at which a token already counts as expired.
pub const DEFAULT_REFRESH_SKEW_SECONDS: i64 = 5;
/// Lifetime of the in-memory identity snapshot.
pub const DEFAULT_SESSION_TTL_MS: u64 = 60_000;
pub const DEFAULT_CSRF_COOKIE: &str = "XSRF-TOKEN";
pub const DEFAULT_CSRF_HEADER: &str = "X-XSRF-TOKEN";

const ENV_API_BASE_URL: &str = "TRIPKEY_API_BASE_URL";
const ENV_REQUEST_TIMEOUT_MS: &str = "TRIPKEY_REQUEST_TIMEOUT_MS";
const ENV_CSRF_COOKIE: &str = "TRIPKEY_CSRF_COOKIE";
const ENV_CSRF_HEADER: &str = "TRIPKEY_CSRF_HEADER";
const ENV_STORE_DIR: &str = "TRIPKEY_STORE_DIR";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    api_base_url: String,
    request_timeout: Duration,
    refresh_skew_seconds: i64,
    session_ttl: Duration,
    csrf_cookie_name: String,
    csrf_header_name: String,
    store_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: option_env!("TRIPKEY_API_BASE_URL")
                .unwrap_or("")
                .to_string(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            refresh_skew_seconds: DEFAULT_REFRESH_SKEW_SECONDS,
            session_ttl: Duration::from_millis(DEFAULT_SESSION_TTL_MS),
            csrf_cookie_name: DEFAULT_CSRF_COOKIE.to_string(),
            csrf_header_name: DEFAULT_CSRF_HEADER.to_string(),
            store_dir: None,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Loads build-time defaults and applies runtime environment overrides.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();
        apply_runtime_overrides(&mut config, RuntimeConfig::from_env());
        config
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refresh_skew_seconds(mut self, seconds: i64) -> Self {
        self.refresh_skew_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_csrf_names(mut self, cookie: impl Into<String>, header: impl Into<String>) -> Self {
        self.csrf_cookie_name = cookie.into();
        self.csrf_header_name = header.into();
        self
    }

    #[must_use]
    pub fn with_store_dir(mut self, dir: PathBuf) -> Self {
        self.store_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn refresh_skew_seconds(&self) -> i64 {
        self.refresh_skew_seconds
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn csrf_cookie_name(&self) -> &str {
        &self.csrf_cookie_name
    }

    #[must_use]
    pub fn csrf_header_name(&self) -> &str {
        &self.csrf_header_name
    }

    #[must_use]
    pub fn store_dir(&self) -> Option<&PathBuf> {
        self.store_dir.as_ref()
    }

    /// Checks that the API base URL is an absolute http(s) URL.
    ///
    /// # Errors
    /// Returns `Error::Config` when the base URL is empty, unparseable or not http(s).
    pub fn validate(&self) -> Result<Url, Error> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(Error::Config("API base URL is not configured.".to_string()));
        }
        let url = Url::parse(base)
            .map_err(|err| Error::Config(format!("Invalid API base URL {base}: {err}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(Error::Config(format!(
                "Unsupported API base URL scheme: {scheme}"
            ))),
        }
    }
}

#[derive(Default)]
struct RuntimeConfig {
    api_base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    csrf_cookie_name: Option<String>,
    csrf_header_name: Option<String>,
    store_dir: Option<String>,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        Self {
            api_base_url: read_runtime_value(ENV_API_BASE_URL),
            request_timeout_ms: read_runtime_value(ENV_REQUEST_TIMEOUT_MS)
                .and_then(|value| value.parse().ok()),
            csrf_cookie_name: read_runtime_value(ENV_CSRF_COOKIE),
            csrf_header_name: read_runtime_value(ENV_CSRF_HEADER),
            store_dir: read_runtime_value(ENV_STORE_DIR),
        }
    }
}

fn apply_runtime_overrides(config: &mut ClientConfig, runtime: RuntimeConfig) {
    if let Some(value) = runtime.api_base_url {
        config.api_base_url = value;
    }
    if let Some(value) = runtime.request_timeout_ms {
        config.request_timeout = Duration::from_millis(value);
    }
    if let Some(value) = runtime.csrf_cookie_name {
        config.csrf_cookie_name = value;
    }
    if let Some(value) = runtime.csrf_header_name {
        config.csrf_header_name = value;
    }
    if let Some(value) = runtime.store_dir {
        config.store_dir = Some(PathBuf::from(value));
    }
}

fn read_runtime_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .and_then(|value| normalize_runtime_value(&value))
}

fn normalize_runtime_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
