//! Evaluation of Kubernetes label selectors.
//!
//! Both the resolver and the PostgresCluster watch go through [`matches`] so
//! that a notification can never select a different set of pgAdmins than a
//! reconciliation would.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

use crate::{Error, Result};

/// Check if `labels` satisfy `selector`.
///
/// An empty selector matches everything.
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> Result<bool> {
    // matchLabels (all must match)
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }

    // matchExpressions (all must match)
    for requirement in selector.match_expressions.iter().flatten() {
        if !requirement_matches(requirement, labels)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Reject selectors the API server would refuse to evaluate.
pub fn validate(selector: &LabelSelector) -> Result<()> {
    selector
        .match_expressions
        .iter()
        .flatten()
        .try_for_each(|requirement| requirement_matches(requirement, &BTreeMap::new()).map(drop))
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    let values = requirement.values.as_deref().unwrap_or_default();
    let value = labels.get(&requirement.key);

    match requirement.operator.as_str() {
        "In" | "NotIn" if values.is_empty() => Err(Error::InvalidSelector(format!(
            "operator {} on {:?} requires values",
            requirement.operator, requirement.key
        ))),
        "Exists" | "DoesNotExist" if !values.is_empty() => Err(Error::InvalidSelector(format!(
            "operator {} on {:?} does not take values",
            requirement.operator, requirement.key
        ))),
        "In" => Ok(value.is_some_and(|v| values.contains(v))),
        "NotIn" => Ok(value.map_or(true, |v| !values.contains(v))),
        "Exists" => Ok(value.is_some()),
        "DoesNotExist" => Ok(value.is_none()),
        other => Err(Error::InvalidSelector(format!(
            "unknown operator {other:?} on {:?}",
            requirement.key
        ))),
    }
}
