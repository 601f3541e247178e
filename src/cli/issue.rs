use super::analyze::{collect, subject_id};
use devcred::aggregation::{AggregationContext, ClaimType};
use devcred::config::DevcredConfig;
use devcred::privacy::PrivacyLevel;

/// Run the full pipeline and record the credential in the local registry.
///
/// The submitter acts as registry owner for this process, so the service's
/// freshly generated verifying keys are the trusted ones.
pub async fn execute(
    config: &DevcredConfig,
    activity: String,
    subject: String,
    claim: ClaimType,
    level: PrivacyLevel,
    submitter: Option<String>,
    repositories: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let subject = subject_id(&subject)?;
    let submitter = match submitter {
        Some(submitter) => subject_id(&submitter)?,
        None => subject.clone(),
    };

    let service = super::service(config)?;
    let registry = super::registry(config, submitter.clone()).await?;
    service.register_circuits(&registry, &submitter)?;

    let collected = collect(&service, &activity, &subject, repositories).await?;
    let context = AggregationContext::new(subject, config.privacy.clone());
    let outcome = service.aggregate(&context, claim, &collected).await?;
    let proven = service.prove(&outcome, level)?;
    let credential = service.submit(&registry, &submitter, &proven).await?;

    println!("{}", serde_json::to_string_pretty(&credential)?);
    Ok(())
}
