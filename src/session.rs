//! The session manager.
//!
//! One [`Session`] per application instance owns the storage, transport, token
//! store, identity cache and gateway, and exposes the operations the dashboard
//! needs: who is signed in, may they do X, sign in (passkey or emailed code),
//! refresh and sign out. Clones share all state, including the single-flight
//! refresh slot.

use crate::{
    access::{Decision, RuleTable},
    auth::{
        cache::SessionCache,
        client,
        clock::{Clock, SystemClock},
        gateway::HttpGateway,
        storage::{AuthStorage, FileStorage, MemoryStorage},
        token::TokenStore,
        types::{Identity, OtpResendRequest, OtpVerifyRequest, StoredAuth, TokenResponse},
    },
    config::ClientConfig,
    errors::Error,
    transport::{ApiRequest, ApiTransport},
    webauthn::{
        AbortSignal, AuthenticationCeremony, CredentialCeremonyProvider, Mediation,
        RegistrationCeremony,
    },
};
use reqwest::Response;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{debug, info};

/// What a passkey ceremony produced.
#[derive(Debug)]
pub enum PasskeyOutcome {
    /// The server answered with a token pair, now stored.
    SignedIn(StoredAuth),
    /// The server accepted the credential without issuing tokens.
    Verified(Value),
}

pub struct SessionBuilder {
    config: ClientConfig,
    storage: Option<Arc<dyn AuthStorage>>,
    clock: Option<Arc<dyn Clock>>,
    rules: Option<RuleTable>,
    provider: Option<Arc<dyn CredentialCeremonyProvider>>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            storage: None,
            clock: None,
            rules: None,
            provider: None,
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn AuthStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = Some(rules);
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn CredentialCeremonyProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Storage defaults to a `FileStorage` in the configured store directory, or
    /// memory when none is set. Rules default to [`RuleTable::dashboard`].
    ///
    /// # Errors
    /// Returns `Error::Config` when the transport cannot be built.
    pub fn build(self) -> Result<Session, Error> {
        let transport = ApiTransport::new(&self.config)?;
        let storage: Arc<dyn AuthStorage> = match (self.storage, self.config.store_dir()) {
            (Some(storage), _) => storage,
            (None, Some(dir)) => {
                debug!("session store: {}", dir.display());
                Arc::new(FileStorage::new(dir.clone()))
            }
            (None, None) => Arc::new(MemoryStorage::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let tokens = TokenStore::new(storage, clock);
        let cache = SessionCache::new(tokens.clone(), self.config.session_ttl());
        let gateway = HttpGateway::new(
            transport,
            tokens,
            cache,
            self.config.refresh_skew_seconds(),
        );

        Ok(Session {
            config: self.config,
            gateway,
            rules: self.rules.unwrap_or_else(RuleTable::dashboard),
            provider: self.provider,
        })
    }
}

#[derive(Clone)]
pub struct Session {
    config: ClientConfig,
    gateway: HttpGateway,
    rules: RuleTable,
    provider: Option<Arc<dyn CredentialCeremonyProvider>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("gateway", &self.gateway)
            .field("has_provider", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn builder(config: ClientConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// # Errors
    /// Returns `Error::Config` when the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        SessionBuilder::new(config).build()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn gateway(&self) -> &HttpGateway {
        &self.gateway
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        self.gateway.tokens()
    }

    #[must_use]
    pub fn cache(&self) -> &SessionCache {
        self.gateway.cache()
    }

    #[must_use]
    pub fn transport(&self) -> &ApiTransport {
        self.gateway.transport()
    }

    #[must_use]
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// The stored session, if any.
    #[must_use]
    pub fn current(&self) -> Option<StoredAuth> {
        self.tokens().read()
    }

    /// Sends an authenticated request. See [`HttpGateway::fetch`].
    ///
    /// # Errors
    /// Transport failures only; HTTP statuses are left to the caller.
    pub async fn fetch(&self, request: &ApiRequest) -> Result<Response, Error> {
        self.gateway.fetch(request).await
    }

    /// The signed-in identity: cached, from the token claims, or from `/me`.
    pub async fn identity(&self) -> Option<Identity> {
        self.cache()
            .get_cached(|| client::fetch_me(&self.gateway))
            .await
    }

    pub async fn can(&self, resource: &str, action: &str) -> Decision {
        let identity = self.identity().await;
        self.rules.can(resource, action, identity.as_ref())
    }

    /// Forces a refresh through the shared single-flight slot.
    pub async fn refresh(&self) -> bool {
        self.gateway.refresh().await
    }

    /// Forgets the local session.
    pub fn logout(&self) {
        self.tokens().clear();
        self.cache().clear();
        info!("signed out");
    }

    /// Stores a freshly issued token pair and primes the identity cache from it.
    ///
    /// # Errors
    /// Returns `Error::Storage` or `Error::Serialization` if it cannot be persisted.
    pub fn establish(&self, tokens: TokenResponse) -> Result<StoredAuth, Error> {
        let auth = self.tokens().save(tokens.into())?;
        self.cache().repopulate(&auth.access_token);
        Ok(auth)
    }

    /// Exchanges an emailed code for a session.
    ///
    /// # Errors
    /// `Http` with the server message when the code is rejected, plus transport
    /// and storage errors.
    pub async fn verify_otp(&self, email: &str, code: &SecretString) -> Result<StoredAuth, Error> {
        let request = OtpVerifyRequest {
            email: email.trim(),
            code: code.expose_secret().trim(),
        };
        let tokens = client::verify_otp(self.transport(), &request).await?;
        let auth = self.establish(tokens)?;
        info!("signed in with one-time code");
        Ok(auth)
    }

    /// # Errors
    /// `Http` when the backend refuses, plus transport errors.
    pub async fn resend_otp(&self, email: &str) -> Result<(), Error> {
        let request = OtpResendRequest {
            email: email.trim(),
        };
        client::resend_otp(self.transport(), &request).await
    }

    fn provider(&self) -> Result<Arc<dyn CredentialCeremonyProvider>, Error> {
        self.provider
            .clone()
            .ok_or_else(|| Error::Config("No passkey provider configured.".to_string()))
    }

    /// # Errors
    /// Returns `Error::Config` when no passkey provider was configured.
    pub fn registration(&self) -> Result<RegistrationCeremony, Error> {
        Ok(RegistrationCeremony::new(
            self.transport().clone(),
            self.provider()?,
        ))
    }

    /// # Errors
    /// Returns `Error::Config` when no passkey provider was configured.
    pub fn authentication(&self) -> Result<AuthenticationCeremony, Error> {
        Ok(AuthenticationCeremony::new(
            self.transport().clone(),
            self.provider()?,
        ))
    }

    /// Runs the passkey sign-in ceremony and stores the tokens it yields.
    ///
    /// # Errors
    /// Ceremony, transport and storage errors.
    pub async fn sign_in_with_passkey(
        &self,
        mediation: Mediation,
        signal: &AbortSignal,
    ) -> Result<PasskeyOutcome, Error> {
        let payload = self.authentication()?.run(mediation, signal).await?;
        self.outcome(payload)
    }

    /// Creates a passkey and binds it to `email` in one go.
    ///
    /// # Errors
    /// Ceremony, transport and storage errors.
    pub async fn enroll_passkey(
        &self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<PasskeyOutcome, Error> {
        let mut ceremony = self.registration()?;
        ceremony.begin().await?;
        let payload = ceremony.finish(email, display_name).await?;
        self.outcome(payload)
    }

    fn outcome(&self, payload: Value) -> Result<PasskeyOutcome, Error> {
        match serde_json::from_value::<TokenResponse>(payload.clone()) {
            Ok(tokens) => Ok(PasskeyOutcome::SignedIn(self.establish(tokens)?)),
            Err(_) => {
                debug!("passkey verification returned no token pair");
                Ok(PasskeyOutcome::Verified(payload))
            }
        }
    }
}
