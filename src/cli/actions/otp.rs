use crate::Session;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error when the code is rejected or the session cannot be stored.
pub async fn verify(session: &Session, email: &str, code: &SecretString) -> Result<()> {
    session
        .verify_otp(email, code)
        .await
        .context("sign-in with one-time code failed")?;
    match session.identity().await {
        Some(identity) => println!("signed in as {}", identity.email),
        None => println!("signed in"),
    }
    Ok(())
}

/// # Errors
/// Returns an error when the backend refuses to send a new code.
pub async fn resend(session: &Session, email: &str) -> Result<()> {
    session
        .resend_otp(email)
        .await
        .context("could not resend the code")?;
    println!("a new code was sent to {}", email.trim());
    Ok(())
}
