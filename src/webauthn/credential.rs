//! Wire shapes for credentials and assertions sent back to the server.
//! Every binary field is base64url without padding.

use crate::{
    codec,
    errors::Error,
    webauthn::provider::{PlatformAssertion, PlatformCredential},
};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponseJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCredentialJson {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub response: AttestationResponseJson,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
    pub client_extension_results: Value,
}

impl From<&PlatformCredential> for RegistrationCredentialJson {
    fn from(credential: &PlatformCredential) -> Self {
        Self {
            id: credential.id.clone(),
            raw_id: codec::encode(&credential.raw_id),
            kind: credential.kind.clone(),
            response: AttestationResponseJson {
                client_data_json: codec::encode(&credential.client_data_json),
                attestation_object: codec::encode(&credential.attestation_object),
                transports: credential.transports.clone(),
            },
            authenticator_attachment: credential.authenticator_attachment.clone(),
            client_extension_results: extension_results(&credential.client_extension_results),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponseJson {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    pub user_handle: Option<String>,
}

/// Body of `POST /login/webauthn`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionJson {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub response: AssertionResponseJson,
    pub client_extension_results: Value,
    pub authenticator_attachment: Option<String>,
}

impl From<&PlatformAssertion> for AssertionJson {
    fn from(assertion: &PlatformAssertion) -> Self {
        Self {
            id: assertion.id.clone(),
            raw_id: codec::encode(&assertion.raw_id),
            kind: assertion.kind.clone(),
            response: AssertionResponseJson {
                client_data_json: codec::encode(&assertion.client_data_json),
                authenticator_data: codec::encode(&assertion.authenticator_data),
                signature: codec::encode(&assertion.signature),
                user_handle: assertion.user_handle.as_deref().map(codec::encode),
            },
            client_extension_results: extension_results(&assertion.client_extension_results),
            authenticator_attachment: assertion.authenticator_attachment.clone(),
        }
    }
}

fn extension_results(value: &Value) -> Value {
    if value.is_object() {
        value.clone()
    } else {
        Value::Object(serde_json::Map::new())
    }
}

/// Inner registration document; sent as a JSON string inside the finish envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest<'a> {
    pub username: &'a str,
    pub user_id: String,
    pub credential: &'a RegistrationCredentialJson,
}

/// Body of `POST /webauthn/register/finish-onestep`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRegistrationRequest {
    pub email: String,
    pub display_name: String,
    pub registration_request: String,
}

impl FinishRegistrationRequest {
    /// Binds `credential` to `email`. The display name falls back to the email.
    ///
    /// # Errors
    /// Returns `Error::Serialization` if the inner document cannot be encoded.
    pub fn new(
        email: &str,
        display_name: Option<&str>,
        credential: &PlatformCredential,
    ) -> Result<Self, Error> {
        let credential_json = RegistrationCredentialJson::from(credential);
        let inner = RegistrationRequest {
            username: email,
            user_id: credential_json.raw_id.clone(),
            credential: &credential_json,
        };
        let registration_request = serde_json::to_string(&inner).map_err(|err| {
            Error::Serialization(format!("Failed to encode registration: {err}"))
        })?;

        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(email);

        Ok(Self {
            email: email.to_string(),
            display_name: display_name.to_string(),
            registration_request,
        })
    }
}
