use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use serde::Serialize;

use crate::controllers::ControllerError;

/// Evaluates a Kubernetes label selector. Malformed selectors are errors, never a silent match.
#[derive(Clone, Debug)]
pub struct LabelSelectorMatcher {
    selector: LabelSelector,
}

impl LabelSelectorMatcher {
    pub fn new(selector: LabelSelector) -> Self {
        Self { selector }
    }

    /// Accepts any selector with the `matchLabels`/`matchExpressions` shape.
    pub fn from_serializable<S: Serialize>(selector: &S) -> Result<Self, ControllerError> {
        let value = serde_json::to_value(selector).map_err(|e| ControllerError::InvalidSelector(e.to_string()))?;
        let selector = serde_json::from_value(value).map_err(|e| ControllerError::InvalidSelector(e.to_string()))?;
        Ok(Self { selector })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> Result<bool, ControllerError> {
        let labels_match = self.selector.match_labels.iter().flatten().all(|(key, value)| labels.get(key) == Some(value));
        let mut expressions_match = true;
        for requirement in self.selector.match_expressions.iter().flatten() {
            expressions_match &= Self::matches_requirement(requirement, labels)?;
        }
        Ok(labels_match && expressions_match)
    }

    fn matches_requirement(requirement: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> Result<bool, ControllerError> {
        let values = requirement.values.as_deref().unwrap_or_default();
        let label = labels.get(&requirement.key);
        match requirement.operator.as_str() {
            "In" | "NotIn" if values.is_empty() => Err(ControllerError::InvalidSelector(format!("operator {} on {} requires values", requirement.operator, requirement.key))),
            "In" => Ok(label.is_some_and(|label| values.contains(label))),
            "NotIn" => Ok(label.map_or(true, |label| !values.contains(label))),
            "Exists" | "DoesNotExist" if !values.is_empty() => Err(ControllerError::InvalidSelector(format!("operator {} on {} takes no values", requirement.operator, requirement.key))),
            "Exists" => Ok(label.is_some()),
            "DoesNotExist" => Ok(label.is_none()),
            operator => Err(ControllerError::InvalidSelector(format!("unknown operator {operator} on {}", requirement.key))),
        }
    }
}
