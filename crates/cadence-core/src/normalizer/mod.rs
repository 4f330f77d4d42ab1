//! Understanding Normalizer module
//!
//! Validates a freshly produced plan and fills the defaults the dispatcher
//! relies on. A plan that fails here never reaches dispatch; the resolver
//! replaces it with its deterministic fallback.

use std::collections::HashSet;

use serde_json::{json, Value};
use thiserror::Error;

use crate::types::{Execution, ResolvedValue, TemporalFrame, Understanding};

/// Capabilities that receive `{date: viewing_date}` when called without parameters.
pub const DEFAULT_VIEW_CAPABILITIES: [&str; 3] = ["schedule_view", "task_list", "email_list"];

/// Resolved values below this confidence are logged.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Intent confidence {0} is outside [0, 1]")]
    InvalidConfidence(f32),

    #[error("Single execution names no capability")]
    EmptyCapability,

    #[error("Workflow execution names no workflow")]
    EmptyWorkflowName,

    #[error("Multi-step execution has no steps")]
    EmptySteps,

    #[error("Step {0} names no capability")]
    EmptyStepCapability(usize),

    #[error("Step {step} depends on step {depends_on} which does not precede it")]
    InvalidDependency { step: usize, depends_on: usize },

    #[error("Parameters must be a JSON object, got {0}")]
    NonObjectParameters(String),
}

/// Plan normalizer
#[derive(Debug, Clone)]
pub struct UnderstandingNormalizer {
    view_capabilities: HashSet<String>,
    confidence_threshold: f32,
}

impl UnderstandingNormalizer {
    pub fn new() -> Self {
        Self {
            view_capabilities: DEFAULT_VIEW_CAPABILITIES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_view_capabilities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.view_capabilities = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn is_view_capability(&self, name: &str) -> bool {
        self.view_capabilities.contains(name)
    }

    /// Structural validation only; does not touch the plan.
    pub fn validate(&self, plan: &Understanding) -> Result<(), ValidationError> {
        let confidence = plan.intent.confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::InvalidConfidence(confidence));
        }

        match &plan.execution {
            Execution::Single {
                capability,
                parameters,
            } => {
                if capability.trim().is_empty() {
                    return Err(ValidationError::EmptyCapability);
                }
                check_object(parameters.as_ref())?;
            }
            Execution::Workflow {
                workflow_name,
                parameters,
            } => {
                if workflow_name.trim().is_empty() {
                    return Err(ValidationError::EmptyWorkflowName);
                }
                check_object(parameters.as_ref())?;
            }
            Execution::MultiStep { steps } => {
                if steps.is_empty() {
                    return Err(ValidationError::EmptySteps);
                }
                for (index, step) in steps.iter().enumerate() {
                    if step.capability.trim().is_empty() {
                        return Err(ValidationError::EmptyStepCapability(index));
                    }
                    if let Some(dep) = step.depends_on.iter().find(|dep| **dep >= index) {
                        return Err(ValidationError::InvalidDependency {
                            step: index,
                            depends_on: *dep,
                        });
                    }
                    if !step.parameters.is_null() {
                        check_object(Some(&step.parameters))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate, then append default parameters. Low-confidence values are
    /// logged, never rejected.
    pub fn normalize(
        &self,
        mut plan: Understanding,
        temporal: &TemporalFrame,
    ) -> Result<Understanding, ValidationError> {
        self.validate(&plan)?;

        match &mut plan.execution {
            Execution::Single {
                capability,
                parameters,
            } => {
                let empty = parameters
                    .as_ref()
                    .map_or(true, |p| p.as_object().is_some_and(|o| o.is_empty()));
                if empty && self.is_view_capability(capability) {
                    tracing::debug!(
                        capability = %capability,
                        date = %temporal.viewing_date,
                        "filling default view parameters"
                    );
                    *parameters = Some(json!({ "date": temporal.viewing_date.to_string() }));
                }
            }
            Execution::Workflow { parameters, .. } => {
                if parameters.is_none() {
                    *parameters = Some(Value::Object(serde_json::Map::new()));
                }
            }
            Execution::MultiStep { .. } => {}
        }

        for value in self.low_confidence_values(&plan) {
            tracing::warn!(
                original = %value.original,
                value = %value.value,
                confidence = value.confidence,
                threshold = self.confidence_threshold,
                "low-confidence resolution"
            );
        }
        Ok(plan)
    }

    pub fn low_confidence_values<'a>(&self, plan: &'a Understanding) -> Vec<&'a ResolvedValue> {
        plan.resolved
            .iter()
            .filter(|value| value.confidence < self.confidence_threshold)
            .collect()
    }
}

impl Default for UnderstandingNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn check_object(parameters: Option<&Value>) -> Result<(), ValidationError> {
    match parameters {
        None | Some(Value::Object(_)) => Ok(()),
        Some(other) => Err(ValidationError::NonObjectParameters(json_type(other).to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::types::{IntentSummary, PlanStep, ResolvedValue};

    fn temporal() -> TemporalFrame {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 9, 0, 0).unwrap();
        TemporalFrame::new(now, "UTC", NaiveDate::from_ymd_opt(2024, 7, 4))
    }

    fn plan(execution: Execution) -> Understanding {
        Understanding::new(IntentSummary::new("test", 0.9, ""), execution)
    }

    #[test]
    fn test_view_capability_defaults_to_viewing_date() {
        let normalizer = UnderstandingNormalizer::new();
        let normalized = normalizer
            .normalize(
                plan(Execution::Single {
                    capability: "schedule_view".to_string(),
                    parameters: None,
                }),
                &temporal(),
            )
            .unwrap();
        assert_eq!(
            normalized.execution.parameters(),
            Some(&json!({"date": "2024-07-04"}))
        );
    }

    #[test]
    fn test_non_view_capability_keeps_missing_parameters() {
        let normalizer = UnderstandingNormalizer::new();
        let normalized = normalizer
            .normalize(
                plan(Execution::Single {
                    capability: "schedule_move_block".to_string(),
                    parameters: None,
                }),
                &temporal(),
            )
            .unwrap();
        assert!(normalized.execution.parameters().is_none());
    }

    #[test]
    fn test_workflow_gets_empty_parameters() {
        let normalized = UnderstandingNormalizer::new()
            .normalize(
                plan(Execution::Workflow {
                    workflow_name: "daily_planning".to_string(),
                    parameters: None,
                }),
                &temporal(),
            )
            .unwrap();
        assert_eq!(normalized.execution.parameters(), Some(&json!({})));
    }

    #[test]
    fn test_rejects_structural_errors() {
        let normalizer = UnderstandingNormalizer::new();
        assert_eq!(
            normalizer.validate(&plan(Execution::MultiStep { steps: Vec::new() })),
            Err(ValidationError::EmptySteps)
        );
        let steps = vec![
            PlanStep::new("task_create", json!({})),
            PlanStep::new("task_complete", json!({})).depends_on([1]),
        ];
        assert_eq!(
            normalizer.validate(&plan(Execution::MultiStep { steps })),
            Err(ValidationError::InvalidDependency {
                step: 1,
                depends_on: 1
            })
        );

        let mut overconfident = plan(Execution::single("schedule_view", json!({})));
        overconfident.intent.confidence = 1.5;
        assert!(matches!(
            normalizer.validate(&overconfident),
            Err(ValidationError::InvalidConfidence(_))
        ));

        let bad_params = plan(Execution::single("schedule_view", json!("today")));
        assert_eq!(
            normalizer.validate(&bad_params),
            Err(ValidationError::NonObjectParameters("string".to_string()))
        );
    }

    #[test]
    fn test_low_confidence_values_are_reported_not_rejected() {
        let mut candidate = plan(Execution::single("schedule_move_block", json!({"blockId": "B1"})));
        candidate.resolved.times.push(ResolvedValue::new("at 3", "15:00", 0.6));
        candidate.resolved.dates.push(ResolvedValue::new("today", "2024-07-04", 0.95));

        let normalizer = UnderstandingNormalizer::new();
        assert_eq!(normalizer.low_confidence_values(&candidate).len(), 1);
        assert!(normalizer.normalize(candidate, &temporal()).is_ok());
    }
}
