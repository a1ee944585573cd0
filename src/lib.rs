//! # Tripkey (passwordless session core)
//!
//! `tripkey` is the identity and session layer of the school trip administration
//! dashboard. Everything else in the dashboard (trips, sections, participants,
//! documents, users) is plain REST plumbing that goes through this crate to reach
//! the backend with a valid session.
//!
//! ## Identity Establishment
//!
//! Users sign in with a passkey (`WebAuthn`) or with an emailed one-time code.
//! Both paths end with a token pair (access + rotating refresh token) that is
//! persisted under a single storage key.
//!
//! - **Passkey enrollment** is one-step: the platform credential is created first,
//!   then bound to an email address in a single finish call.
//! - **Passkey sign-in** is account-discoverable; the server omits the allow-list
//!   so the authenticator picks the account.
//!
//! ## Session Maintenance
//!
//! All authenticated calls go through [`auth::HttpGateway`]. It refreshes the access
//! token before it expires, replays a request once after a `401`, and makes sure only
//! one refresh call is in flight at a time so rotated refresh tokens are never
//! presented twice.
//!
//! ## Authorization
//!
//! [`access::RuleTable`] maps resources and actions to roles. Anything missing from
//! the table is denied.

pub mod access;
pub mod auth;
pub mod cli;
pub mod codec;
pub mod config;
pub mod errors;
pub mod session;
pub mod transport;
pub mod webauthn;

pub use config::ClientConfig;
pub use errors::Error;
pub use session::Session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
