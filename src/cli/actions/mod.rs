pub mod access;
pub mod otp;
pub mod request;
pub mod session;

use crate::{cli::globals::GlobalArgs, Session};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    Status,
    Whoami,
    Refresh,
    Logout,
    Can {
        resource: String,
        action: String,
        rules: Option<PathBuf>,
    },
    OtpVerify {
        email: String,
        code: SecretString,
    },
    OtpResend {
        email: String,
    },
    Get {
        path: String,
    },
}

impl Action {
    /// Execute the action against the session described by `globals`.
    /// # Errors
    /// Returns an error if the session cannot be opened or the action fails.
    pub async fn execute(self, globals: &GlobalArgs) -> Result<()> {
        let session =
            Session::new(globals.client_config()).context("failed to open the session")?;

        match self {
            Self::Status => session::status(&session),
            Self::Whoami => session::whoami(&session).await,
            Self::Refresh => session::refresh(&session).await,
            Self::Logout => {
                session::logout(&session);
                Ok(())
            }
            Self::Can {
                resource,
                action,
                rules,
            } => access::handle(&session, &resource, &action, rules.as_deref()).await,
            Self::OtpVerify { email, code } => otp::verify(&session, &email, &code).await,
            Self::OtpResend { email } => otp::resend(&session, &email).await,
            Self::Get { path } => request::get(&session, &path).await,
        }
    }
}
