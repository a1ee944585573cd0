//! Passkey sign-in (assertion ceremony).

use crate::{
    errors::Error,
    transport::ApiTransport,
    webauthn::{
        credential::AssertionJson,
        options::ServerRequestOptions,
        provider::{AbortSignal, CredentialCeremonyProvider, Mediation, ProviderError},
    },
};
use serde_json::{json, Value};
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

pub const AUTHENTICATE_OPTIONS_PATH: &str = "/webauthn/authenticate/options";
pub const LOGIN_PATH: &str = "/login/webauthn";

const CANCELLED: &str = "Operation timed out or was cancelled.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthenticationPhase {
    Idle,
    Authenticating,
    Finishing,
}

impl AuthenticationPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Finishing => "finishing",
        }
    }
}

impl fmt::Display for AuthenticationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct AuthenticationCeremony {
    transport: ApiTransport,
    provider: Arc<dyn CredentialCeremonyProvider>,
    phase: AuthenticationPhase,
}

impl fmt::Debug for AuthenticationCeremony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationCeremony")
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl AuthenticationCeremony {
    #[must_use]
    pub fn new(transport: ApiTransport, provider: Arc<dyn CredentialCeremonyProvider>) -> Self {
        Self {
            transport,
            provider,
            phase: AuthenticationPhase::Idle,
        }
    }

    #[must_use]
    pub fn phase(&self) -> AuthenticationPhase {
        self.phase
    }

    /// Runs the full assertion ceremony and returns the server's verification
    /// payload (usually a token pair). The ceremony is back in `Idle` afterwards,
    /// whatever the outcome, including when the returned future is dropped early.
    ///
    /// # Errors
    /// `InvalidState` if another run is in progress; `Ceremony` when the user
    /// cancels or `signal` fires; transport, parse and `Http` errors otherwise.
    pub async fn run(&mut self, mediation: Mediation, signal: &AbortSignal) -> Result<Value, Error> {
        if self.phase != AuthenticationPhase::Idle {
            return Err(Error::InvalidState {
                expected: AuthenticationPhase::Idle.as_str(),
                actual: self.phase.as_str(),
            });
        }

        let Self {
            transport,
            provider,
            phase,
        } = self;
        let mut phase = PhaseGuard(phase);
        let result = authenticate(transport, provider.as_ref(), &mut phase, mediation, signal).await;
        drop(phase);

        match &result {
            Ok(_) => info!("passkey sign-in verified"),
            Err(err) => warn!("passkey sign-in failed: {}", err),
        }
        result
    }
}

/// Puts the ceremony back in `Idle` when dropped.
struct PhaseGuard<'a>(&'a mut AuthenticationPhase);

impl PhaseGuard<'_> {
    fn set(&mut self, phase: AuthenticationPhase) {
        *self.0 = phase;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if *self.0 != AuthenticationPhase::Idle {
            debug!(phase = %self.0, "assertion ceremony ended");
        }
        *self.0 = AuthenticationPhase::Idle;
    }
}

async fn authenticate(
    transport: &ApiTransport,
    provider: &dyn CredentialCeremonyProvider,
    phase: &mut PhaseGuard<'_>,
    mediation: Mediation,
    signal: &AbortSignal,
) -> Result<Value, Error> {
    if signal.is_aborted() {
        return Err(Error::Ceremony(CANCELLED.to_string()));
    }
    phase.set(AuthenticationPhase::Authenticating);

    let options: Value = transport
        .post_json(AUTHENTICATE_OPTIONS_PATH, &json!({}))
        .await?;
    let request = ServerRequestOptions::from_value(options)?.into_request(mediation)?;
    debug!(
        allow_credentials = request.allow_credentials.len(),
        ?mediation,
        "requesting assertion"
    );

    let assertion = tokio::select! {
        result = provider.get(request) => result.map_err(authentication_error)?,
        () = signal.aborted() => {
            debug!("assertion aborted");
            return Err(Error::Ceremony(CANCELLED.to_string()));
        }
    };

    phase.set(AuthenticationPhase::Finishing);
    let body = AssertionJson::from(&assertion);
    transport.post_json_value(LOGIN_PATH, &body).await
}

fn authentication_error(err: ProviderError) -> Error {
    let message = match err {
        ProviderError::NotAllowed => CANCELLED.to_string(),
        ProviderError::NotSupported => "Passkeys are not supported on this device.".to_string(),
        ProviderError::InvalidState => "Passkey sign-in failed: invalid state".to_string(),
        ProviderError::Other(message) => format!("Passkey sign-in failed: {message}"),
    };
    Error::Ceremony(message)
}
