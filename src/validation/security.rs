//! Identifier and hash well-formedness.

use super::audit::{AuditTrail, CheckKind};
use super::CheckContext;
use crate::aggregation::{Aggregation, FieldValue, MetricField};
use crate::serialization::content_digest;

const CHECK: CheckKind = CheckKind::Security;

/// Longest free-text value accepted in a metric.
const MAX_TEXT_LEN: usize = 128;

/// 64 lowercase hex characters.
pub(crate) fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

pub(crate) fn run(aggregation: &Aggregation, _cx: &CheckContext<'_>, trail: &mut AuditTrail) {
    let subject = Some(FieldValue::Text(aggregation.subject.to_string()));
    if aggregation.subject.is_well_formed() {
        trail.pass(CHECK, "subject_format", Some(MetricField::Subject), subject);
    } else {
        trail.fail(
            CHECK,
            "subject_format",
            Some(MetricField::Subject),
            subject,
            "subject must be 0x followed by 40 hex characters",
        );
    }

    match &aggregation.content_hash {
        None => trail.warn(
            CHECK,
            "content_hash_format",
            Some(MetricField::ContentHash),
            None,
            "aggregation has no content hash",
        ),
        Some(hash) if !is_sha256_hex(hash) => trail.fail(
            CHECK,
            "content_hash_format",
            Some(MetricField::ContentHash),
            Some(FieldValue::Text(hash.clone())),
            "content hash is not a SHA-256 hex digest",
        ),
        Some(hash) => {
            let value = Some(FieldValue::Text(hash.clone()));
            trail.pass(CHECK, "content_hash_format", Some(MetricField::ContentHash), value.clone());
            match content_digest(&aggregation.metrics) {
                Ok(actual) if &actual == hash => {
                    trail.pass(CHECK, "content_hash_matches", Some(MetricField::ContentHash), value)
                }
                Ok(_) => trail.fail(
                    CHECK,
                    "content_hash_matches",
                    Some(MetricField::ContentHash),
                    value,
                    "metrics do not match their content hash",
                ),
                Err(e) => trail.fail(
                    CHECK,
                    "content_hash_matches",
                    Some(MetricField::ContentHash),
                    value,
                    format!("metrics could not be hashed: {}", e),
                ),
            }
        }
    }

    for field in aggregation.metrics.fields() {
        let Some(value @ FieldValue::Text(_)) = aggregation.value(field) else {
            continue;
        };
        let text = value.as_text().unwrap_or_default();
        if text.len() <= MAX_TEXT_LEN && !text.chars().any(char::is_control) {
            trail.pass(CHECK, "text_sanitized", Some(field), Some(value));
        } else {
            trail.fail(
                CHECK,
                "text_sanitized",
                Some(field),
                Some(value),
                format!("{} contains control characters or is too long", field),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert!(is_sha256_hex(&"a".repeat(64)));
        assert!(!is_sha256_hex(&"A".repeat(64)));
        assert!(!is_sha256_hex(&"a".repeat(63)));
        assert!(!is_sha256_hex(&"g".repeat(64)));
    }
}
