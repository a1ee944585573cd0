//! Passkey (`WebAuthn`) ceremonies.
//!
//! ### Flow Overview
//! 1. **Preparation**: fetch the server options, unwrap `publicKey` and decode the
//!    base64url fields (challenge, user id, credential ids) into bytes.
//! 2. **Interaction**: call the [`CredentialCeremonyProvider`] `create` (enrollment)
//!    or `get` (sign-in), which is where the user touches the authenticator.
//! 3. **Finalization**: encode the authenticator output back to base64url and post
//!    it for server verification.
//!
//! The ceremonies talk to the backend directly rather than through the gateway;
//! they run before a session exists.

pub mod authenticate;
pub mod credential;
pub mod options;
pub mod provider;
pub mod register;

pub use authenticate::{AuthenticationCeremony, AuthenticationPhase};
pub use options::{ServerCreationOptions, ServerRequestOptions, WireBinary};
pub use provider::{
    AbortController, AbortSignal, AssertionRequest, CreationRequest, CredentialCeremonyProvider,
    Mediation, PlatformAssertion, PlatformCredential, ProviderError,
};
pub use register::{RegistrationCeremony, RegistrationPhase};
