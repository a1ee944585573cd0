//! Session records, identity and token wire types. Token-bearing types redact
//! their secrets in `Debug` output so they can be traced safely.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Teacher => "TEACHER",
            Self::Student => "STUDENT",
            Self::Parent => "PARENT",
            Self::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        match normalized
            .strip_prefix("ROLE_")
            .unwrap_or(normalized.as_str())
        {
            "ADMIN" => Ok(Self::Admin),
            "TEACHER" => Ok(Self::Teacher),
            "STUDENT" => Ok(Self::Student),
            "PARENT" => Ok(Self::Parent),
            "USER" => Ok(Self::User),
            _ => Err(format!("unknown role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Active,
    Pending,
}

impl FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "PENDING" => Ok(Self::Pending),
            _ => Err(format!("unknown status: {value}")),
        }
    }
}

/// Authenticated user as seen by the dashboard.
///
/// Both wire shapes (a single `role` or a `roles` array) deserialize into the same
/// value; unknown role strings are dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "IdentityWire")]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub roles: Vec<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl Identity {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            roles,
            status: None,
        }
    }

    /// The first role, for call sites that only know a single role.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.roles.first().copied()
    }

    #[must_use]
    pub fn has_role(&self) -> bool {
        !self.roles.is_empty()
    }

    /// Builds an identity from access token claims. Returns `None` when the claims
    /// carry neither a subject nor an email.
    #[must_use]
    pub fn from_claims(claims: &Value) -> Option<Self> {
        let wire: IdentityWire = serde_json::from_value(claims.clone()).ok()?;
        let identity = Self::from(wire);
        if identity.id.is_empty() && identity.email.is_empty() {
            None
        } else {
            Some(identity)
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityWire {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "first_name", alias = "given_name")]
    first_name: Option<String>,
    #[serde(default, alias = "last_name", alias = "family_name")]
    last_name: Option<String>,
    #[serde(default)]
    role: Option<Value>,
    #[serde(default)]
    roles: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
}

impl From<IdentityWire> for Identity {
    fn from(wire: IdentityWire) -> Self {
        let id = wire
            .id
            .as_ref()
            .and_then(scalar_to_string)
            .or_else(|| wire.sub.as_ref().and_then(scalar_to_string))
            .unwrap_or_default();

        let mut roles: Vec<Role> = Vec::new();
        for value in [wire.role.as_ref(), wire.roles.as_ref()].into_iter().flatten() {
            collect_roles(value, &mut roles);
        }

        Self {
            id,
            email: wire.email.unwrap_or_default(),
            first_name: wire.first_name,
            last_name: wire.last_name,
            roles,
            status: wire
                .status
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn collect_roles(value: &Value, roles: &mut Vec<Role>) {
    match value {
        Value::String(s) => {
            if let Ok(role) = s.parse::<Role>() {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_roles(item, roles);
            }
        }
        _ => {}
    }
}

/// The persisted session record, stored as camelCase JSON under one key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAuth {
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
}

impl StoredAuth {
    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        let token_type = self.token_type.trim();
        let token_type = if token_type.is_empty() {
            DEFAULT_TOKEN_TYPE
        } else {
            token_type
        };
        format!("{token_type} {}", self.access_token)
    }
}

impl fmt::Debug for StoredAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredAuth")
            .field("token_type", &self.token_type)
            .field("access_token", &"***")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "***"),
            )
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .finish()
    }
}

/// Token pair as returned by `/auth/refresh`, `/otp/verify` and passkey login.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "refresh_token_expires_in")]
    pub refresh_expires_in: Option<i64>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("access_token", &"***")
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "***"),
            )
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish()
    }
}

/// Input to `TokenStore::save`. TTLs are in seconds.
#[derive(Debug)]
pub struct SaveTokens {
    pub token_type: String,
    pub access_token: SecretString,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<SecretString>,
    pub refresh_token_expires_in: Option<i64>,
}

impl SaveTokens {
    #[must_use]
    pub fn new(token_type: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            access_token: SecretString::from(access_token.into()),
            expires_in: None,
            refresh_token: None,
            refresh_token_expires_in: None,
        }
    }

    #[must_use]
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    #[must_use]
    pub fn refresh_token(mut self, token: impl Into<String>, expires_in: Option<i64>) -> Self {
        self.refresh_token = Some(SecretString::from(token.into()));
        self.refresh_token_expires_in = expires_in;
        self
    }
}

impl From<TokenResponse> for SaveTokens {
    fn from(response: TokenResponse) -> Self {
        Self {
            token_type: response.token_type,
            access_token: SecretString::from(response.access_token),
            expires_in: response.expires_in,
            refresh_token: response.refresh_token.map(SecretString::from),
            refresh_token_expires_in: response.refresh_expires_in,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct OtpVerifyRequest<'a> {
    pub email: &'a str,
    pub code: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct OtpResendRequest<'a> {
    pub email: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_parses_loosely() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("ROLE_TEACHER".parse::<Role>(), Ok(Role::Teacher));
        assert_eq!(" Parent ".parse::<Role>(), Ok(Role::Parent));
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn identity_accepts_single_role() {
        let identity: Identity = serde_json::from_value(json!({
            "id": 7,
            "email": "a@b.com",
            "firstName": "Ada",
            "role": "ADMIN",
            "status": "ACTIVE"
        }))
        .unwrap();

        assert_eq!(identity.id, "7");
        assert_eq!(identity.roles, vec![Role::Admin]);
        assert_eq!(identity.role(), Some(Role::Admin));
        assert_eq!(identity.first_name.as_deref(), Some("Ada"));
        assert_eq!(identity.status, Some(Status::Active));
    }

    #[test]
    fn identity_accepts_roles_array_and_drops_unknown() {
        let identity: Identity = serde_json::from_value(json!({
            "id": "u-1",
            "email": "t@school.test",
            "roles": ["TEACHER", "janitor", "PARENT", "TEACHER"]
        }))
        .unwrap();

        assert_eq!(identity.roles, vec![Role::Teacher, Role::Parent]);
        assert_eq!(identity.status, None);
    }

    #[test]
    fn identity_serializes_roles_array() {
        let identity = Identity::new("1", "a@b.com", vec![Role::Student]);
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(
            json,
            json!({"id": "1", "email": "a@b.com", "roles": ["STUDENT"]})
        );
        let back: Identity = serde_json::from_value(json).unwrap();
        assert_eq!(back, identity);
    }

    #[test]
    fn identity_from_claims_uses_subject() {
        let identity = Identity::from_claims(&json!({
            "sub": "42",
            "email": "p@school.test",
            "given_name": "Pat",
            "roles": ["PARENT"],
            "exp": 1_700_000_000
        }))
        .unwrap();

        assert_eq!(identity.id, "42");
        assert_eq!(identity.first_name.as_deref(), Some("Pat"));
        assert_eq!(identity.roles, vec![Role::Parent]);
    }

    #[test]
    fn identity_from_claims_requires_subject_or_email() {
        assert!(Identity::from_claims(&json!({"exp": 1})).is_none());
        assert!(Identity::from_claims(&json!("not an object")).is_none());
    }

    #[test]
    fn stored_auth_debug_redacts_tokens() {
        let auth = StoredAuth {
            token_type: "Bearer".to_string(),
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            access_token_expires_at: None,
            refresh_token_expires_at: None,
        };
        let debug = format!("{auth:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert_eq!(auth.authorization(), "Bearer secret-access");
    }

    #[test]
    fn authorization_defaults_token_type() {
        let auth = StoredAuth {
            token_type: "  ".to_string(),
            access_token: "abc".to_string(),
            refresh_token: None,
            access_token_expires_at: None,
            refresh_token_expires_at: None,
        };
        assert_eq!(auth.authorization(), "Bearer abc");
    }

    #[test]
    fn token_response_defaults_and_aliases() {
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "a",
            "refresh_token": "r",
            "refresh_token_expires_in": 3600
        }))
        .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, None);
        assert_eq!(response.refresh_expires_in, Some(3600));
        assert!(!format!("{response:?}").contains("\"a\""));
    }
}
