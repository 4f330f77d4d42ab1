//! Model-backed intent resolver
//!
//! cache lookup -> entity extraction -> prompt -> model -> parse -> normalize
//! -> antecedent guard -> cache store. Any failure after the cache lookup
//! switches to the keyword fallback; the caller always receives a plan.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::Level;

use cadence_core::executor::{truncate_for_log, CapabilityRegistry};
use cadence_core::normalizer::UnderstandingNormalizer;
use cadence_core::planner::{IntentResolver, UnderstandingError};
use cadence_core::store::{ReferenceResolver, UnderstandingCache};
use cadence_core::types::{
    Ambiguity, Clock, ContextSnapshot, Execution, PlanSource, ResolvedEntities, ResolvedValue,
    SystemClock, Understanding, UnderstandingMetadata,
};

use crate::extractor::{expected_entity_kind, extract_entities, find_pronoun, ExtractedEntities};
use crate::fallback::{fallback_understanding, CONVERSATION_CAPABILITY};
use crate::fingerprint::cache_key;
use crate::llm::{extract_json, LlmClient, LlmRequest};
use crate::prompt::PromptBuilder;

const MAX_LOG_PROMPT_CHARS: usize = 8_000;

#[derive(Debug, Clone)]
pub struct UnderstandingEngineConfig {
    pub model: String,
    pub temperature: f32,
}

impl Default for UnderstandingEngineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
        }
    }
}

/// Resolver that asks a language model and degrades to keyword rules.
pub struct LlmUnderstandingEngine {
    client: Arc<dyn LlmClient>,
    cache: Arc<dyn UnderstandingCache>,
    registry: Arc<RwLock<CapabilityRegistry>>,
    normalizer: UnderstandingNormalizer,
    prompt: PromptBuilder,
    clock: Arc<dyn Clock>,
    config: UnderstandingEngineConfig,
}

impl LlmUnderstandingEngine {
    pub fn new(
        client: Arc<dyn LlmClient>,
        cache: Arc<dyn UnderstandingCache>,
        registry: Arc<RwLock<CapabilityRegistry>>,
    ) -> Self {
        Self {
            client,
            cache,
            registry,
            normalizer: UnderstandingNormalizer::new(),
            prompt: PromptBuilder::default(),
            clock: Arc::new(SystemClock),
            config: UnderstandingEngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: UnderstandingEngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_normalizer(mut self, normalizer: UnderstandingNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn understand_with_model(
        &self,
        utterance: &str,
        context: &ContextSnapshot,
        extracted: &ExtractedEntities,
    ) -> Result<Understanding, UnderstandingError> {
        let catalog = self.registry.read().await.catalog();
        let (system, user) = self.prompt.build(utterance, context, &catalog, extracted);

        tracing::info!(
            user_id = %context.user_id,
            model = %self.config.model,
            temperature = self.config.temperature,
            capabilities = catalog.len(),
            system_prompt_chars = system.chars().count(),
            user_prompt_chars = user.chars().count(),
            "understanding request prepared"
        );
        if tracing::enabled!(Level::DEBUG) {
            tracing::debug!(
                system_prompt = %truncate_for_log(&system, MAX_LOG_PROMPT_CHARS),
                user_prompt = %truncate_for_log(&user, MAX_LOG_PROMPT_CHARS),
                "understanding prompt"
            );
        }

        let request = LlmRequest {
            system,
            user,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
        };
        let raw = self
            .client
            .complete(request)
            .await
            .map_err(|e| UnderstandingError::Llm(e.to_string()))?;
        if tracing::enabled!(Level::DEBUG) {
            tracing::debug!(
                response = %truncate_for_log(&raw, MAX_LOG_PROMPT_CHARS),
                "understanding response"
            );
        }

        let json = extract_json(&raw).ok_or(UnderstandingError::MissingJson)?;
        let mut plan: Understanding = serde_json::from_str(json)
            .map_err(|e| UnderstandingError::InvalidJson(e.to_string()))?;

        merge_extracted(&mut plan.resolved, extracted);
        plan.metadata = UnderstandingMetadata {
            source: PlanSource::Model,
            model: Some(self.config.model.clone()),
            created_at: Some(self.clock.now()),
        };
        Ok(self.normalizer.normalize(plan, &context.temporal)?)
    }

    fn fallback(
        &self,
        utterance: &str,
        context: &ContextSnapshot,
        extracted: &ExtractedEntities,
    ) -> Understanding {
        let mut plan = fallback_understanding(utterance, context, extracted);
        plan.metadata.created_at = Some(self.clock.now());
        match self.normalizer.normalize(plan.clone(), &context.temporal) {
            Ok(normalized) => normalized,
            Err(error) => {
                tracing::warn!(error = %error, "fallback plan failed normalization");
                plan
            }
        }
    }
}

#[async_trait]
impl IntentResolver for LlmUnderstandingEngine {
    async fn understand(&self, utterance: &str, context: &ContextSnapshot) -> Understanding {
        let key = cache_key(utterance, context);
        match self.cache.get(&key).await {
            Ok(Some(plan)) => {
                tracing::debug!(user_id = %context.user_id, key = %key, "understanding cache hit");
                return plan;
            }
            Ok(None) => {}
            Err(error) => tracing::warn!(error = %error, "understanding cache read failed"),
        }

        let extracted = extract_entities(utterance, &context.temporal);
        match self.understand_with_model(utterance, context, &extracted).await {
            Ok(plan) => {
                let plan = guard_antecedent(plan, utterance, context, &self.normalizer);
                tracing::info!(
                    user_id = %context.user_id,
                    intent = %plan.intent.primary,
                    confidence = plan.intent.confidence,
                    execution = plan.execution.kind(),
                    ambiguities = plan.ambiguities.len(),
                    "understanding produced"
                );
                // The key ignores ledger state, so a clarification could go stale.
                if !plan.needs_clarification() {
                    if let Err(error) = self.cache.set(&key, plan.clone()).await {
                        tracing::warn!(error = %error, "understanding cache write failed");
                    }
                }
                plan
            }
            Err(error) => {
                tracing::warn!(
                    user_id = %context.user_id,
                    error = %error,
                    "model understanding failed, using keyword fallback"
                );
                let plan = self.fallback(utterance, context, &extracted);
                guard_antecedent(plan, utterance, context, &self.normalizer)
            }
        }
    }
}

/// Extracted values the model did not report itself.
fn merge_extracted(resolved: &mut ResolvedEntities, extracted: &ExtractedEntities) {
    fn merge(target: &mut Vec<ResolvedValue>, values: &[ResolvedValue]) {
        for value in values {
            let known = target
                .iter()
                .any(|existing| existing.original.eq_ignore_ascii_case(&value.original));
            if !known {
                target.push(value.clone());
            }
        }
    }
    merge(&mut resolved.dates, &extracted.dates);
    merge(&mut resolved.times, &extracted.times);
    merge(&mut resolved.entities, &extracted.durations);
    merge(&mut resolved.entities, &extracted.people);
}

/// A pronoun that resolves to nothing becomes a clarification question.
/// Read-only plans and workflows take no target entity and pass untouched.
fn guard_antecedent(
    plan: Understanding,
    utterance: &str,
    context: &ContextSnapshot,
    normalizer: &UnderstandingNormalizer,
) -> Understanding {
    if plan.needs_clarification() || !targets_entity(&plan.execution, normalizer) {
        return plan;
    }
    let Some(pronoun) = find_pronoun(utterance) else {
        return plan;
    };
    if references_known_entity(&plan, context) {
        return plan;
    }
    if ReferenceResolver::resolve(expected_entity_kind(utterance), context).is_some() {
        return plan;
    }

    tracing::info!(
        user_id = %context.user_id,
        pronoun = %pronoun,
        "no antecedent for pronoun, asking for clarification"
    );
    let question = format!("What does \"{pronoun}\" refer to?");
    plan.with_ambiguity(Ambiguity::new(pronoun, question))
}

fn targets_entity(execution: &Execution, normalizer: &UnderstandingNormalizer) -> bool {
    if matches!(execution, Execution::Workflow { .. }) {
        return false;
    }
    execution
        .capability_names()
        .into_iter()
        .any(|name| name != CONVERSATION_CAPABILITY && !normalizer.is_view_capability(name))
}

fn references_known_entity(plan: &Understanding, context: &ContextSnapshot) -> bool {
    let mut known: HashSet<&str> = HashSet::new();
    known.extend(context.state.schedule.iter().map(|b| b.id.as_str()));
    known.extend(context.state.tasks.iter().map(|t| t.id.as_str()));
    known.extend(context.state.emails.iter().map(|e| e.id.as_str()));
    for op in &context.memory.recent_operations {
        known.extend(op.affected_entities.iter().map(|(_, id)| id));
    }
    known.extend(context.memory.mentioned_entities.iter().map(|(_, id)| id));
    if known.is_empty() {
        return false;
    }

    let mut strings = Vec::new();
    match &plan.execution {
        Execution::MultiStep { steps } => {
            for step in steps {
                collect_strings(&step.parameters, &mut strings);
            }
        }
        execution => {
            if let Some(params) = execution.parameters() {
                collect_strings(params, &mut strings);
            }
        }
    }
    strings.extend(plan.resolved.iter().map(|v| v.value.as_str()));
    strings.iter().any(|s| known.contains(s))
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s.as_str()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, OfflineLlmClient};
    use cadence_core::types::{EntityKind, EntityRefs, ScheduleBlock, TrackedOperation};
    use cadence_stores::InMemoryUnderstandingCache;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn viewing() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()
    }

    fn context() -> ContextSnapshot {
        let now = Utc.with_ymd_and_hms(2024, 7, 10, 14, 0, 0).unwrap();
        let mut ctx = ContextSnapshot::minimal("u1", now, "UTC", Some(viewing()));
        ctx.state.schedule = vec![
            ScheduleBlock {
                id: "B1".to_string(),
                block_type: "meeting".to_string(),
                title: "Standup".to_string(),
                start: viewing().and_hms_opt(9, 0, 0).unwrap(),
                end: viewing().and_hms_opt(9, 30, 0).unwrap(),
            },
            ScheduleBlock {
                id: "B2".to_string(),
                block_type: "work".to_string(),
                title: "Focus".to_string(),
                start: viewing().and_hms_opt(10, 0, 0).unwrap(),
                end: viewing().and_hms_opt(12, 0, 0).unwrap(),
            },
        ];
        ctx
    }

    fn engine(
        client: Arc<dyn LlmClient>,
        cache: Arc<InMemoryUnderstandingCache>,
    ) -> LlmUnderstandingEngine {
        LlmUnderstandingEngine::new(
            client,
            cache,
            Arc::new(RwLock::new(CapabilityRegistry::new())),
        )
    }

    fn model_reply(execution: Value) -> String {
        json!({
            "intent": {"primary": "test", "confidence": 0.9, "reasoning": "r"},
            "execution": execution,
        })
        .to_string()
    }

    #[test]
    fn test_repeated_request_hits_cache() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new(model_reply(
                json!({"type": "single", "capability": "schedule_view"}),
            )));
            let cache = Arc::new(InMemoryUnderstandingCache::new());
            let engine = engine(mock.clone(), cache.clone());
            let ctx = context();

            let first = engine.understand("what's on today?", &ctx).await;
            let second = engine.understand("What's on today", &ctx).await;

            assert_eq!(mock.calls(), 1);
            assert_eq!(first, second);
            assert_eq!(cache.len().await.unwrap(), 1);
        });
    }

    #[test]
    fn test_view_defaults_and_today_use_viewing_date() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new(model_reply(
                json!({"type": "single", "capability": "schedule_view"}),
            )));
            let engine = engine(mock, Arc::new(InMemoryUnderstandingCache::new()));
            let plan = engine.understand("show me today", &context()).await;

            assert_eq!(plan.metadata.source, PlanSource::Model);
            assert_eq!(
                plan.execution.parameters(),
                Some(&json!({"date": "2024-07-04"}))
            );
            assert_eq!(plan.resolved.dates[0].value, "2024-07-04");
        });
    }

    #[test]
    fn test_model_failure_falls_back_and_is_not_cached() {
        tokio_test::block_on(async {
            let cache = Arc::new(InMemoryUnderstandingCache::new());
            let engine = engine(Arc::new(OfflineLlmClient::new("test")), cache.clone());
            let mut ctx = context();
            ctx.memory.recent_operations = vec![TrackedOperation::new(
                "u1",
                "schedule_create_block",
                json!({}),
                ctx.temporal.now,
            )
            .with_affected(EntityRefs::new().with(EntityKind::Block, "B1"))];

            let plan = engine.understand("move it to 3pm", &ctx).await;
            assert_eq!(plan.metadata.source, PlanSource::Fallback);
            assert_eq!(
                plan.execution,
                Execution::single(
                    "schedule_move_block",
                    json!({"blockId": "B1", "newStartTime": "15:00"})
                )
            );
            assert_eq!(cache.len().await.unwrap(), 0);
        });
    }

    #[test]
    fn test_garbage_model_output_falls_back() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new("I am not sure what you mean"));
            let engine = engine(mock, Arc::new(InMemoryUnderstandingCache::new()));
            let plan = engine.understand("hello", &context()).await;
            assert_eq!(plan.metadata.source, PlanSource::Fallback);
            assert_eq!(plan.execution.capability_names(), vec![CONVERSATION_CAPABILITY]);
        });
    }

    #[test]
    fn test_invalid_plan_falls_back() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new(model_reply(
                json!({"type": "multi_step", "steps": []}),
            )));
            let engine = engine(mock, Arc::new(InMemoryUnderstandingCache::new()));
            let plan = engine.understand("plan my day", &context()).await;
            assert_eq!(plan.metadata.source, PlanSource::Fallback);
            assert_eq!(plan.execution.capability_names(), vec!["daily_planning"]);
        });
    }

    #[test]
    fn test_pronoun_without_antecedent_asks() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new(model_reply(json!({
                "type": "single",
                "capability": "schedule_create_block",
                "parameters": {"title": "it", "date": "2024-07-04", "startTime": "15:00"}
            }))));
            let cache = Arc::new(InMemoryUnderstandingCache::new());
            let engine = engine(mock, cache.clone());

            let plan = engine.understand("Schedule it", &context()).await;
            assert!(plan.needs_clarification());
            assert_eq!(plan.ambiguities[0].original, "it");
            assert_eq!(cache.len().await.unwrap(), 0);
        });
    }

    #[test]
    fn test_pronoun_in_read_only_request_does_not_ask() {
        tokio_test::block_on(async {
            let engine = engine(
                Arc::new(OfflineLlmClient::new("test")),
                Arc::new(InMemoryUnderstandingCache::new()),
            );
            let plan = engine
                .understand("show my schedule today, is it packed?", &context())
                .await;
            assert!(!plan.needs_clarification(), "{:?}", plan.ambiguities);
            assert_eq!(plan.execution.capability_names(), vec!["schedule_view"]);

            let workflow = engine.understand("plan my day around it", &context()).await;
            assert!(!workflow.needs_clarification());
        });
    }

    #[test]
    fn test_cached_plan_is_not_shared_between_users() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new(model_reply(json!({
                "type": "single",
                "capability": "schedule_move_block",
                "parameters": {"blockId": "B1", "newStartTime": "15:00"}
            }))));
            let cache = Arc::new(InMemoryUnderstandingCache::new());
            let engine = engine(mock.clone(), cache.clone());

            let alice = context();
            let mut bob = context();
            bob.user_id = "u2".to_string();
            engine.understand("move standup to 3pm", &alice).await;
            engine.understand("move standup to 3pm", &bob).await;

            assert_eq!(mock.calls(), 2);
            assert_eq!(cache.len().await.unwrap(), 2);
        });
    }

    #[test]
    fn test_pronoun_with_known_id_in_params_passes() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new(model_reply(json!({
                "type": "single",
                "capability": "schedule_move_block",
                "parameters": {"blockId": "B2", "newStartTime": "15:00"}
            }))));
            let engine = engine(mock, Arc::new(InMemoryUnderstandingCache::new()));
            let plan = engine.understand("move it to 3pm", &context()).await;
            assert!(!plan.needs_clarification());
        });
    }
}
