use devcred::activity::{ActivityQuery, JsonActivitySource, RepositoryActivity, SubjectId};
use devcred::aggregation::{AggregationContext, ClaimType};
use devcred::config::DevcredConfig;
use devcred::CredentialService;
use serde_json::json;
use std::path::Path;

/// Read the export and collect the requested repositories for `subject`.
///
/// An empty `repositories` list selects every repository in the export.
pub(crate) async fn collect(
    service: &CredentialService,
    activity: &str,
    subject: &SubjectId,
    repositories: Vec<String>,
) -> Result<Vec<RepositoryActivity>, Box<dyn std::error::Error>> {
    let source = JsonActivitySource::from_file(Path::new(activity))?;
    let repositories = if repositories.is_empty() {
        source.repository_names()
    } else {
        repositories
    };
    Ok(service
        .collect(&source, subject, &repositories, &ActivityQuery::default())
        .await?)
}

pub(crate) fn subject_id(value: &str) -> Result<SubjectId, Box<dyn std::error::Error>> {
    let subject = SubjectId::new(value);
    if !subject.is_well_formed() {
        return Err(format!("'{}' is not a 0x-prefixed 20-byte address", value).into());
    }
    Ok(subject)
}

/// Aggregate and validate without proving; prints the report as JSON.
pub async fn execute(
    config: &DevcredConfig,
    activity: String,
    subject: String,
    claim: ClaimType,
    repositories: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let subject = subject_id(&subject)?;
    let service = super::service(config)?;
    let collected = collect(&service, &activity, &subject, repositories).await?;

    let context = AggregationContext::new(subject, config.privacy.clone());
    let outcome = service.aggregate(&context, claim, &collected).await?;

    let summary = json!({
        "aggregation_id": outcome.aggregation.id,
        "claim_type": claim,
        "valid": outcome.is_valid(),
        "score": outcome.report.score,
        "cache_id": outcome.cache_id,
        "metrics": outcome.aggregation.metrics,
        "errors": outcome.report.errors.iter().map(|e| &e.message).collect::<Vec<_>>(),
        "warnings": outcome.report.warnings.iter().map(|w| &w.message).collect::<Vec<_>>(),
        "recommendations": outcome.report.recommendations,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_rejects_malformed() {
        assert!(subject_id("0x1111111111111111111111111111111111111111").is_ok());
        assert!(subject_id("alice").is_err());
    }
}
