use crate::cli::{
    actions::Action,
    commands::{ARG_API_BASE_URL, ARG_STORE_DIR},
    globals::{default_store_dir, GlobalArgs},
};
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

fn required(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

/// Global flags shared by every subcommand.
#[must_use]
pub fn globals(matches: &clap::ArgMatches) -> GlobalArgs {
    let store_dir = matches
        .get_one::<PathBuf>(ARG_STORE_DIR)
        .cloned()
        .or_else(default_store_dir);
    GlobalArgs::new(matches.get_one::<String>(ARG_API_BASE_URL).cloned(), store_dir)
}

/// # Errors
/// Returns an error if required arguments are missing or the subcommand is unknown.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("status", _)) => Ok(Action::Status),
        Some(("whoami", _)) => Ok(Action::Whoami),
        Some(("refresh", _)) => Ok(Action::Refresh),
        Some(("logout", _)) => Ok(Action::Logout),
        Some(("can", sub)) => Ok(Action::Can {
            resource: required(sub, "resource")?,
            action: required(sub, "action")?,
            rules: sub.get_one::<PathBuf>("rules").cloned(),
        }),
        Some(("otp", sub)) => match sub.subcommand() {
            Some(("verify", verify)) => Ok(Action::OtpVerify {
                email: required(verify, "email")?,
                code: SecretString::from(required(verify, "code")?),
            }),
            Some(("resend", resend)) => Ok(Action::OtpResend {
                email: required(resend, "email")?,
            }),
            _ => bail!("unknown otp subcommand"),
        },
        Some(("get", sub)) => Ok(Action::Get {
            path: required(sub, "path")?,
        }),
        _ => bail!("no subcommand given"),
    }
}
