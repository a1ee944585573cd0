//! One-step passkey enrollment.
//!
//! The platform credential is created before the user has an account. The email
//! is collected afterwards and the credential is bound to it in a single finish
//! call. Abandoning the ceremony after creation leaves an orphaned credential on
//! the authenticator; the server never learned about it.

use crate::{
    auth::client::valid_email,
    errors::Error,
    transport::ApiTransport,
    webauthn::{
        credential::FinishRegistrationRequest,
        options::ServerCreationOptions,
        provider::{CredentialCeremonyProvider, PlatformCredential, ProviderError},
    },
};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

pub const REGISTER_OPTIONS_PATH: &str = "/webauthn/register/options";
pub const REGISTER_FINISH_PATH: &str = "/webauthn/register/finish-onestep";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationPhase {
    Idle,
    /// Options fetched; the platform create call is running.
    Creating,
    /// Credential created and held in memory, waiting for an email.
    Email,
    Finishing,
}

impl RegistrationPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Creating => "creating",
            Self::Email => "email",
            Self::Finishing => "finishing",
        }
    }
}

impl fmt::Display for RegistrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct RegistrationCeremony {
    transport: ApiTransport,
    provider: Arc<dyn CredentialCeremonyProvider>,
    phase: RegistrationPhase,
    credential: Option<PlatformCredential>,
}

impl fmt::Debug for RegistrationCeremony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationCeremony")
            .field("phase", &self.phase)
            .field("has_credential", &self.credential.is_some())
            .finish_non_exhaustive()
    }
}

impl RegistrationCeremony {
    #[must_use]
    pub fn new(transport: ApiTransport, provider: Arc<dyn CredentialCeremonyProvider>) -> Self {
        Self {
            transport,
            provider,
            phase: RegistrationPhase::Idle,
            credential: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RegistrationPhase {
        self.phase
    }

    /// Fetches registration options and runs the platform create call.
    ///
    /// # Errors
    /// `InvalidState` outside `Idle`; otherwise transport, option parsing, decode
    /// or `Ceremony` errors. Any failure returns the ceremony to `Idle`.
    pub async fn begin(&mut self) -> Result<(), Error> {
        self.expect_phase(RegistrationPhase::Idle)?;
        self.phase = RegistrationPhase::Creating;

        match self.create().await {
            Ok(credential) => {
                debug!("platform credential created");
                self.credential = Some(credential);
                self.phase = RegistrationPhase::Email;
                Ok(())
            }
            Err(err) => {
                warn!("passkey creation failed: {}", err);
                self.phase = RegistrationPhase::Idle;
                Err(err)
            }
        }
    }

    async fn create(&self) -> Result<PlatformCredential, Error> {
        let options: Value = self.transport.get_json(REGISTER_OPTIONS_PATH).await?;
        let request = ServerCreationOptions::from_value(options)?.into_request()?;
        self.provider
            .create(request)
            .await
            .map_err(registration_error)
    }

    /// Binds the held credential to `email`. Returns the server payload.
    ///
    /// # Errors
    /// `InvalidState` outside `Email`. An invalid email or a server rejection
    /// keeps the ceremony in `Email` so the user can try another address.
    pub async fn finish(
        &mut self,
        email: &str,
        display_name: Option<&str>,
    ) -> Result<Value, Error> {
        self.expect_phase(RegistrationPhase::Email)?;
        let email = email.trim();
        if !valid_email(email) {
            return Err(Error::Ceremony(
                "Please enter a valid email address.".to_string(),
            ));
        }
        let Some(credential) = self.credential.as_ref() else {
            self.phase = RegistrationPhase::Idle;
            return Err(Error::InvalidState {
                expected: RegistrationPhase::Email.as_str(),
                actual: RegistrationPhase::Idle.as_str(),
            });
        };
        let body = FinishRegistrationRequest::new(email, display_name, credential)?;

        self.phase = RegistrationPhase::Finishing;
        match self
            .transport
            .post_json_value(REGISTER_FINISH_PATH, &body)
            .await
        {
            Ok(payload) => {
                info!("passkey registered");
                self.credential = None;
                self.phase = RegistrationPhase::Idle;
                Ok(payload)
            }
            Err(err) => {
                warn!("passkey registration rejected: {}", err);
                self.phase = RegistrationPhase::Email;
                Err(err)
            }
        }
    }

    /// Drops any created credential and returns to `Idle`.
    pub fn cancel(&mut self) {
        if self.credential.take().is_some() {
            debug!("discarding unregistered platform credential");
        }
        self.phase = RegistrationPhase::Idle;
    }

    fn expect_phase(&self, expected: RegistrationPhase) -> Result<(), Error> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected: expected.as_str(),
                actual: self.phase.as_str(),
            })
        }
    }
}

fn registration_error(err: ProviderError) -> Error {
    let message = match err {
        ProviderError::InvalidState => "This passkey is already registered.".to_string(),
        ProviderError::NotAllowed => "Operation timed out or was cancelled.".to_string(),
        ProviderError::NotSupported => {
            "Passkeys are not supported on this device.".to_string()
        }
        ProviderError::Other(message) => format!("Passkey registration failed: {message}"),
    };
    Error::Ceremony(message)
}
