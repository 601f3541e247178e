use super::analyze::subject_id;
use devcred::activity::SubjectId;
use devcred::config::DevcredConfig;

pub async fn execute(config: &DevcredConfig, id: String, submitter: String) -> Result<(), Box<dyn std::error::Error>> {
    let caller = subject_id(&submitter)?;
    let registry = super::registry(config, SubjectId::new("")).await?;
    let credential = registry.revoke(&caller, &id).await?;
    println!("Revoked {} (subject {})", credential.id, credential.subject);
    Ok(())
}
