//! Understanding (execution plan) types
//!
//! The JSON shape of these types is what the language model is asked to emit,
//! so field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured, resolved plan for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Understanding {
    pub intent: IntentSummary,
    pub execution: Execution,
    #[serde(default)]
    pub resolved: ResolvedEntities,
    #[serde(default)]
    pub ambiguities: Vec<Ambiguity>,
    #[serde(default)]
    pub metadata: UnderstandingMetadata,
}

impl Understanding {
    pub fn new(intent: IntentSummary, execution: Execution) -> Self {
        Self {
            intent,
            execution,
            resolved: ResolvedEntities::default(),
            ambiguities: Vec::new(),
            metadata: UnderstandingMetadata::default(),
        }
    }

    /// A plan with open ambiguities must not be dispatched.
    pub fn needs_clarification(&self) -> bool {
        !self.ambiguities.is_empty()
    }

    pub fn clarification_questions(&self) -> Vec<String> {
        self.ambiguities.iter().map(|a| a.question.clone()).collect()
    }

    pub fn with_ambiguity(mut self, ambiguity: Ambiguity) -> Self {
        self.ambiguities.push(ambiguity);
        self
    }

    pub fn with_source(mut self, source: PlanSource) -> Self {
        self.metadata.source = source;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSummary {
    pub primary: String,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

impl IntentSummary {
    pub fn new(primary: impl Into<String>, confidence: f32, reasoning: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            confidence,
            reasoning: reasoning.into(),
        }
    }
}

/// How a plan is carried out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Execution {
    Single {
        capability: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<Value>,
    },
    Workflow {
        #[serde(rename = "workflowName")]
        workflow_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<Value>,
    },
    MultiStep {
        #[serde(default)]
        steps: Vec<PlanStep>,
    },
}

impl Execution {
    pub fn single(capability: impl Into<String>, parameters: Value) -> Self {
        Self::Single {
            capability: capability.into(),
            parameters: Some(parameters),
        }
    }

    pub fn workflow(name: impl Into<String>, parameters: Value) -> Self {
        Self::Workflow {
            workflow_name: name.into(),
            parameters: Some(parameters),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single { .. } => "single",
            Self::Workflow { .. } => "workflow",
            Self::MultiStep { .. } => "multi_step",
        }
    }

    /// Every capability name the plan would invoke, in order.
    pub fn capability_names(&self) -> Vec<&str> {
        match self {
            Self::Single { capability, .. } => vec![capability.as_str()],
            Self::Workflow { workflow_name, .. } => vec![workflow_name.as_str()],
            Self::MultiStep { steps } => steps.iter().map(|s| s.capability.as_str()).collect(),
        }
    }

    /// Parameters of a single or workflow execution.
    pub fn parameters(&self) -> Option<&Value> {
        match self {
            Self::Single { parameters, .. } | Self::Workflow { parameters, .. } => {
                parameters.as_ref()
            }
            Self::MultiStep { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub capability: String,
    #[serde(default)]
    pub parameters: Value,
    /// Indices of earlier steps that must succeed first.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PlanStep {
    pub fn new(capability: impl Into<String>, parameters: Value) -> Self {
        Self {
            capability: capability.into(),
            parameters,
            depends_on: Vec::new(),
            description: None,
        }
    }

    pub fn depends_on(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on = indices.into_iter().collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntities {
    #[serde(default)]
    pub dates: Vec<ResolvedValue>,
    #[serde(default)]
    pub times: Vec<ResolvedValue>,
    #[serde(default)]
    pub entities: Vec<ResolvedValue>,
}

impl ResolvedEntities {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() && self.times.is_empty() && self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedValue> {
        self.dates
            .iter()
            .chain(self.times.iter())
            .chain(self.entities.iter())
    }
}

/// Original text fragment and what it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub original: String,
    pub value: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ResolvedValue {
    pub fn new(original: impl Into<String>, value: impl Into<String>, confidence: f32) -> Self {
        Self {
            original: original.into(),
            value: value.into(),
            confidence,
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambiguity {
    #[serde(default)]
    pub original: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

impl Ambiguity {
    pub fn new(original: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            question: question.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    #[default]
    Model,
    Fallback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderstandingMetadata {
    #[serde(default)]
    pub source: PlanSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
