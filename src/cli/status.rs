use devcred::activity::SubjectId;
use devcred::config::DevcredConfig;
use devcred::registry::CredentialState;

/// Print a credential's state, and its statement when it exists.
pub async fn execute(config: &DevcredConfig, id: String) -> Result<(), Box<dyn std::error::Error>> {
    // Reads need no owner.
    let registry = super::registry(config, SubjectId::new("")).await?;
    let state = registry.status(&id).await?;
    println!("{}: {}", id, state);

    if state != CredentialState::Unissued {
        if let Some(credential) = registry.credential(&id).await? {
            println!("{}", serde_json::to_string_pretty(&credential)?);
        }
    }
    Ok(())
}
