//! Platform authenticator boundary.
//!
//! Everything on this side of the boundary is raw bytes. The ceremonies convert
//! from and to base64url when talking to the server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelyingParty {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CredentialParameter {
    #[serde(rename = "type", default = "public_key")]
    pub kind: String,
    pub alg: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    #[serde(default)]
    pub authenticator_attachment: Option<String>,
    #[serde(default)]
    pub require_resident_key: Option<bool>,
    #[serde(default)]
    pub resident_key: Option<String>,
    #[serde(default)]
    pub user_verification: Option<String>,
}

pub(crate) fn public_key() -> String {
    "public-key".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserEntity {
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialDescriptor {
    pub kind: String,
    pub id: Vec<u8>,
    pub transports: Vec<String>,
}

/// Input to the platform create call.
#[derive(Clone, Debug, PartialEq)]
pub struct CreationRequest {
    pub challenge: Vec<u8>,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<CredentialParameter>,
    pub timeout: Option<Duration>,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: Option<AuthenticatorSelection>,
    pub attestation: Option<String>,
    pub extensions: Option<Value>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mediation {
    /// Modal prompt.
    #[default]
    Required,
    /// Offered through autofill; waits until the user picks a passkey.
    Conditional,
}

/// Input to the platform get call.
#[derive(Clone, Debug, PartialEq)]
pub struct AssertionRequest {
    pub challenge: Vec<u8>,
    pub timeout: Option<Duration>,
    pub rp_id: Option<String>,
    /// Empty for account-discoverable sign-in.
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: Option<String>,
    pub mediation: Mediation,
    pub extensions: Option<Value>,
}

/// A freshly created credential, as the authenticator returned it.
#[derive(Clone, Debug, PartialEq)]
pub struct PlatformCredential {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub kind: String,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub transports: Vec<String>,
    pub authenticator_attachment: Option<String>,
    pub client_extension_results: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlatformAssertion {
    pub id: String,
    pub raw_id: Vec<u8>,
    pub kind: String,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub authenticator_attachment: Option<String>,
    pub client_extension_results: Value,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The user dismissed the prompt or it timed out.
    #[error("not allowed")]
    NotAllowed,
    /// The authenticator already holds a credential from the exclude list.
    #[error("invalid state")]
    InvalidState,
    #[error("no platform authenticator available")]
    NotSupported,
    #[error("{0}")]
    Other(String),
}

/// Host authenticator API (a browser bridge, a native platform API, a test fake).
#[async_trait]
pub trait CredentialCeremonyProvider: Send + Sync {
    async fn create(&self, request: CreationRequest) -> Result<PlatformCredential, ProviderError>;

    async fn get(&self, request: AssertionRequest) -> Result<PlatformAssertion, ProviderError>;
}

/// Cancels an in-progress authentication ceremony.
#[derive(Clone, Debug)]
pub struct AbortController {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the controller aborts. Pends forever if it is dropped first.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        let closed = rx.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_wakes_waiters() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(!signal.is_aborted());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });
        controller.abort();
        assert!(waiter.await.is_ok());
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn signal_created_after_abort_is_already_fired() {
        let controller = AbortController::new();
        controller.abort();
        let signal = controller.signal();
        assert!(signal.is_aborted());
        signal.aborted().await;
    }

    #[tokio::test]
    async fn never_signal_does_not_fire() {
        let signal = AbortSignal::never();
        let fired = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(fired.is_err());
        assert!(!signal.is_aborted());
    }
}
