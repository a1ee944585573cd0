use crate::{transport::ApiRequest, Session};
use anyhow::Result;
use serde_json::Value;

/// # Errors
/// Returns an error for transport failures, HTTP errors or an expired session.
pub async fn get(session: &Session, path: &str) -> Result<()> {
    let value = session.gateway().send_value(&ApiRequest::get(path)).await?;
    match value {
        Value::String(text) => println!("{text}"),
        Value::Null => {}
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}
