//! Server ceremony options and their normalization into platform requests.
//!
//! Servers disagree on how binary fields are shaped: some send the base64url
//! string, others wrap it as `{"value": "..."}`, and the whole document may sit
//! under a `publicKey` key. All of that is resolved here, once, at ingress.

use crate::{
    codec::{self, DecodeError},
    errors::Error,
    webauthn::provider::{
        public_key, AssertionRequest, AuthenticatorSelection, CreationRequest,
        CredentialDescriptor, CredentialParameter, Mediation, RelyingParty, UserEntity,
    },
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

/// A binary field as it arrives from the server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireBinary {
    Plain(String),
    Wrapped { value: String },
}

impl WireBinary {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Wrapped { value } => value,
        }
    }

    /// # Errors
    /// Returns `DecodeError` when the field is not valid base64url.
    pub fn decode(&self) -> Result<Vec<u8>, DecodeError> {
        codec::decode(self.as_str())
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUser {
    pub id: WireBinary,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerCredentialDescriptor {
    #[serde(rename = "type", default = "public_key")]
    pub kind: String,
    pub id: WireBinary,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub transports: Vec<String>,
}

impl ServerCredentialDescriptor {
    fn decode(&self) -> Result<CredentialDescriptor, DecodeError> {
        Ok(CredentialDescriptor {
            kind: self.kind.clone(),
            id: self.id.decode()?,
            transports: self.transports.clone(),
        })
    }
}

/// Registration options from `GET /webauthn/register/options`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCreationOptions {
    pub challenge: WireBinary,
    pub rp: RelyingParty,
    pub user: ServerUser,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pub_key_cred_params: Vec<CredentialParameter>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub exclude_credentials: Vec<ServerCredentialDescriptor>,
    #[serde(default)]
    pub authenticator_selection: Option<AuthenticatorSelection>,
    #[serde(default)]
    pub attestation: Option<String>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl ServerCreationOptions {
    /// Parses a server document, unwrapping `publicKey` when present.
    ///
    /// # Errors
    /// Returns `Error::Parse` when required fields are missing or mistyped.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(unwrap_public_key(value))
            .map_err(|err| Error::Parse(format!("Invalid registration options: {err}")))
    }

    /// Decodes every binary field for the platform create call.
    ///
    /// # Errors
    /// Returns `DecodeError` if any binary field is malformed.
    pub fn into_request(self) -> Result<CreationRequest, DecodeError> {
        let exclude_credentials = self
            .exclude_credentials
            .iter()
            .map(ServerCredentialDescriptor::decode)
            .collect::<Result<Vec<_>, _>>()?;
        let display_name = self
            .user
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.user.name.clone());

        Ok(CreationRequest {
            challenge: self.challenge.decode()?,
            rp: self.rp,
            user: UserEntity {
                id: self.user.id.decode()?,
                name: self.user.name,
                display_name,
            },
            pub_key_cred_params: self.pub_key_cred_params,
            timeout: self.timeout.map(Duration::from_millis),
            exclude_credentials,
            authenticator_selection: self.authenticator_selection,
            attestation: self.attestation,
            extensions: self.extensions,
        })
    }
}

/// Assertion options from `POST /webauthn/authenticate/options`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRequestOptions {
    pub challenge: WireBinary,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub rp_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub allow_credentials: Vec<ServerCredentialDescriptor>,
    #[serde(default)]
    pub user_verification: Option<String>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl ServerRequestOptions {
    /// # Errors
    /// Returns `Error::Parse` when required fields are missing or mistyped.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(unwrap_public_key(value))
            .map_err(|err| Error::Parse(format!("Invalid authentication options: {err}")))
    }

    /// # Errors
    /// Returns `DecodeError` if the challenge or an allowed credential id is malformed.
    pub fn into_request(self, mediation: Mediation) -> Result<AssertionRequest, DecodeError> {
        let allow_credentials = self
            .allow_credentials
            .iter()
            .map(ServerCredentialDescriptor::decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AssertionRequest {
            challenge: self.challenge.decode()?,
            timeout: self.timeout.map(Duration::from_millis),
            rp_id: self.rp_id,
            allow_credentials,
            user_verification: self.user_verification,
            mediation,
            extensions: self.extensions,
        })
    }
}

/// Returns the `publicKey` member when the options are wrapped in one.
#[must_use]
pub fn unwrap_public_key(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.get("publicKey").is_some_and(Value::is_object) => {
            map.remove("publicKey").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creation(challenge: Value) -> Value {
        json!({
            "challenge": challenge,
            "rp": {"id": "trips.example", "name": "Trips"},
            "user": {"id": {"value": "dXNlci0x"}, "name": "pending"},
            "pubKeyCredParams": [{"type": "public-key", "alg": -7}, {"type": "public-key", "alg": -257}],
            "timeout": 60000,
            "excludeCredentials": [{"type": "public-key", "id": "AQID", "transports": ["internal"]}],
            "authenticatorSelection": {"residentKey": "required", "userVerification": "preferred"},
            "attestation": "none"
        })
    }

    #[test]
    fn plain_and_wrapped_challenges_normalize_identically() {
        let plain = ServerCreationOptions::from_value(creation(json!("Y2hhbGxlbmdl")))
            .unwrap()
            .into_request()
            .unwrap();
        let wrapped = ServerCreationOptions::from_value(creation(json!({"value": "Y2hhbGxlbmdl"})))
            .unwrap()
            .into_request()
            .unwrap();

        assert_eq!(plain.challenge, b"challenge".to_vec());
        assert_eq!(plain, wrapped);
    }

    #[test]
    fn creation_options_decode_every_binary_field() {
        let request = ServerCreationOptions::from_value(json!({"publicKey": creation(json!("AAEC"))}))
            .unwrap()
            .into_request()
            .unwrap();

        assert_eq!(request.challenge, vec![0, 1, 2]);
        assert_eq!(request.user.id, b"user-1".to_vec());
        assert_eq!(request.user.display_name, "pending");
        assert_eq!(request.exclude_credentials[0].id, vec![1, 2, 3]);
        assert_eq!(request.exclude_credentials[0].transports, vec!["internal"]);
        assert_eq!(request.pub_key_cred_params.len(), 2);
        assert_eq!(request.timeout, Some(Duration::from_secs(60)));
        assert_eq!(
            request
                .authenticator_selection
                .and_then(|selection| selection.resident_key),
            Some("required".to_string())
        );
    }

    #[test]
    fn request_options_without_allow_list_are_discoverable() {
        let request = ServerRequestOptions::from_value(json!({
            "publicKey": {"challenge": "AAEC", "rpId": "trips.example", "allowCredentials": null}
        }))
        .unwrap()
        .into_request(Mediation::Conditional)
        .unwrap();

        assert!(request.allow_credentials.is_empty());
        assert_eq!(request.rp_id.as_deref(), Some("trips.example"));
        assert_eq!(request.mediation, Mediation::Conditional);
    }

    #[test]
    fn request_options_decode_supplied_allow_list() {
        let request = ServerRequestOptions::from_value(json!({
            "challenge": {"value": "AAEC"},
            "allowCredentials": [{"id": {"value": "BAUG"}}]
        }))
        .unwrap()
        .into_request(Mediation::Required)
        .unwrap();

        assert_eq!(request.allow_credentials[0].id, vec![4, 5, 6]);
        assert_eq!(request.allow_credentials[0].kind, "public-key");
    }

    #[test]
    fn malformed_binary_fields_fail() {
        let options = ServerCreationOptions::from_value(creation(json!("not base64!"))).unwrap();
        assert!(options.into_request().is_err());

        let missing = ServerRequestOptions::from_value(json!({"rpId": "x"}));
        assert!(matches!(missing, Err(Error::Parse(_))));
    }

    #[test]
    fn unwrap_public_key_leaves_flat_documents_alone() {
        let flat = json!({"challenge": "AAEC"});
        assert_eq!(unwrap_public_key(flat.clone()), flat);
        let odd = json!({"publicKey": "not an object", "challenge": "AAEC"});
        assert_eq!(unwrap_public_key(odd.clone()), odd);
    }
}
