//! Role-based access decisions.
//!
//! The rule table maps `resource -> action -> roles`. Anything the table does not
//! mention is denied. An action with an empty role list is open to every signed-in
//! user. Decisions are pure; the caller resolves the identity first.

use crate::{
    auth::types::{Identity, Role},
    errors::Error,
};
use serde::{Deserialize, Serialize, Serializer};
use std::{collections::BTreeMap, fmt};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    ResourceNotAllowed,
    ActionNotAllowed,
    InsufficientRole,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not authenticated",
            Self::ResourceNotAllowed => "resource not allowed",
            Self::ActionNotAllowed => "action not allowed",
            Self::InsufficientRole => "insufficient role",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DenyReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl Decision {
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn denied(reason: DenyReason) -> Self {
        Self {
            allow: false,
            reason: Some(reason),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: BTreeMap<String, BTreeMap<String, Vec<Role>>>,
}

impl RuleTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `roles` to perform `action` on `resource`. An empty list allows any
    /// signed-in user.
    #[must_use]
    pub fn with_rule(mut self, resource: &str, action: &str, roles: &[Role]) -> Self {
        self.rules
            .entry(resource.to_string())
            .or_default()
            .insert(action.to_string(), roles.to_vec());
        self
    }

    fn with_actions(self, resource: &str, actions: &[&str], roles: &[Role]) -> Self {
        actions
            .iter()
            .fold(self, |table, action| table.with_rule(resource, action, roles))
    }

    /// The dashboard's built-in rules.
    #[must_use]
    pub fn dashboard() -> Self {
        use Role::{Admin, Parent, Student, Teacher};

        let read = ["list", "show"];
        let write = ["create", "edit", "delete"];
        Self::new()
            .with_actions("dashboard", &read, &[])
            .with_actions("trips", &read, &[Admin, Teacher, Parent, Student])
            .with_actions("trips", &write, &[Admin, Teacher])
            .with_actions("sections", &read, &[Admin, Teacher])
            .with_actions("sections", &write, &[Admin, Teacher])
            .with_actions("participants", &read, &[Admin, Teacher, Parent])
            .with_actions("participants", &["create", "edit"], &[Admin, Teacher, Parent])
            .with_rule("participants", "delete", &[Admin, Teacher])
            .with_actions("documents", &["list", "show", "create"], &[Admin, Teacher, Parent])
            .with_actions("documents", &["edit", "delete"], &[Admin, Teacher])
            .with_actions("users", &read, &[Admin])
            .with_actions("users", &write, &[Admin])
            .with_rule("admin", "show", &[Admin])
    }

    /// Parses a table such as `{"admin": {"show": ["ADMIN"]}}`.
    ///
    /// # Errors
    /// Returns `Error::Parse` for malformed JSON or unknown role names.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|err| Error::Parse(format!("Invalid rule table: {err}")))
    }

    #[must_use]
    pub fn can(&self, resource: &str, action: &str, identity: Option<&Identity>) -> Decision {
        let Some(identity) = identity else {
            return Decision::denied(DenyReason::NotAuthenticated);
        };
        let Some(actions) = self.rules.get(resource) else {
            return Decision::denied(DenyReason::ResourceNotAllowed);
        };
        let Some(roles) = actions.get(action) else {
            return Decision::denied(DenyReason::ActionNotAllowed);
        };

        if roles.is_empty() || identity.roles.iter().any(|role| roles.contains(role)) {
            Decision::allowed()
        } else {
            Decision::denied(DenyReason::InsufficientRole)
        }
    }
}
