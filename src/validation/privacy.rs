//! Privacy compliance.
//!
//! Strict mode fails an aggregation that is missing its privacy layer or
//! falls below the anonymization threshold; lenient mode only warns.

use super::audit::{AuditTrail, CheckKind};
use super::CheckContext;
use crate::aggregation::{Aggregation, FieldValue};

const CHECK: CheckKind = CheckKind::Privacy;

pub(crate) fn run(aggregation: &Aggregation, cx: &CheckContext<'_>, trail: &mut AuditTrail) {
    let config = cx.config;
    if !config.privacy_preservation {
        trail.pass(CHECK, "privacy_not_required", None, None);
        return;
    }

    let violation = |trail: &mut AuditTrail, rule: &str, value: Option<FieldValue>, message: String| {
        if config.strict_mode {
            trail.fail(CHECK, rule, None, value, message);
        } else {
            trail.warn(CHECK, rule, None, value, message);
        }
    };

    let Some(meta) = &aggregation.privacy else {
        violation(trail, "privacy_metadata", None, "aggregation carries no privacy metadata".to_string());
        return;
    };
    trail.pass(CHECK, "privacy_metadata", None, Some(FieldValue::Text(meta.mechanism.name().to_string())));

    let level = Some(FieldValue::Count(meta.anonymization_level as u64));
    if meta.anonymization_level >= config.min_anonymization_level {
        trail.pass(CHECK, "anonymization_level", None, level);
    } else {
        violation(
            trail,
            "anonymization_level",
            level,
            format!(
                "anonymization level {} is below the required {}",
                meta.anonymization_level, config.min_anonymization_level
            ),
        );
    }

    let epsilon = Some(FieldValue::Number(meta.epsilon));
    if !(meta.epsilon > 0.0) || !meta.epsilon.is_finite() {
        trail.fail(CHECK, "epsilon", None, epsilon, format!("epsilon {} is not a valid privacy parameter", meta.epsilon));
    } else if meta.epsilon > config.epsilon_warning_threshold {
        trail.warn(
            CHECK,
            "epsilon",
            None,
            epsilon,
            format!("epsilon {} exceeds the prudent limit {}", meta.epsilon, config.epsilon_warning_threshold),
        );
    } else {
        trail.pass(CHECK, "epsilon", None, epsilon);
    }

    let delta = Some(FieldValue::Number(meta.delta));
    if meta.delta > 0.0 && meta.delta < 1.0 {
        trail.pass(CHECK, "delta", None, delta);
    } else {
        trail.fail(CHECK, "delta", None, delta, format!("delta {} must lie in (0, 1)", meta.delta));
    }
}
