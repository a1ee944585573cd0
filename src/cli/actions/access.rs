use crate::{access::RuleTable, Session};
use anyhow::{Context, Result};
use std::path::Path;

/// Loads a JSON rule table from disk.
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_rules(path: &Path) -> Result<RuleTable> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules from {}", path.display()))?;
    Ok(RuleTable::from_json(&json)?)
}

/// Prints the decision. A denial is still a successful command.
/// # Errors
/// Returns an error if the rule file is invalid.
pub async fn handle(
    session: &Session,
    resource: &str,
    action: &str,
    rules: Option<&Path>,
) -> Result<()> {
    let decision = match rules {
        Some(path) => {
            let table = load_rules(path)?;
            let identity = session.identity().await;
            table.can(resource, action, identity.as_ref())
        }
        None => session.can(resource, action).await,
    };
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
