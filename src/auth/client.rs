//! Session-establishing calls that do not go through the gateway, plus `/me`.

use crate::{
    auth::{
        gateway::HttpGateway,
        types::{Identity, OtpResendRequest, OtpVerifyRequest, TokenResponse},
    },
    errors::Error,
    transport::ApiTransport,
};
use regex::Regex;
use tracing::debug;

pub const OTP_VERIFY_PATH: &str = "/otp/verify";
pub const OTP_RESEND_PATH: &str = "/otp/resend";
pub const ME_PATH: &str = "/me";

/// Exchanges an emailed one-time code for a token pair.
///
/// # Errors
/// Returns `Error::Http` with the server message when the code is rejected, or
/// transport/parse errors.
pub async fn verify_otp(
    transport: &ApiTransport,
    request: &OtpVerifyRequest<'_>,
) -> Result<TokenResponse, Error> {
    transport.post_json(OTP_VERIFY_PATH, request).await
}

/// Asks the backend to email a fresh one-time code.
///
/// # Errors
/// Returns `Error::Http` when the backend refuses, or transport errors.
pub async fn resend_otp(
    transport: &ApiTransport,
    request: &OtpResendRequest<'_>,
) -> Result<(), Error> {
    transport.post_json_empty(OTP_RESEND_PATH, request).await
}

/// Fetches the current identity. Any failure reads as "nobody signed in".
pub async fn fetch_me(gateway: &HttpGateway) -> Option<Identity> {
    match gateway.get_json::<Identity>(ME_PATH).await {
        Ok(identity) => Some(identity),
        Err(err) => {
            debug!("identity lookup failed: {}", err);
            None
        }
    }
}

/// Loose shape check; the backend owns real address validation.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}
