//! Assistant - assemble → understand → gate → dispatch
//!
//! One message is one sequential pipeline run. Every stage has a degraded
//! output, so `handle_message` always answers.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cadence_context::{ContextAssembler, ContextRequest};
use cadence_core::executor::truncate_for_log;
use cadence_core::planner::IntentResolver;
use cadence_core::types::{ConversationTurn, EntityRefs, ExecutionResult, Understanding};
use cadence_core::Dispatcher;
use cadence_planners::CONVERSATION_CAPABILITY;

const MAX_LOG_UTTERANCE_CHARS: usize = 200;

/// One user message plus the client-side state around it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub user_id: String,
    pub utterance: String,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
    #[serde(default)]
    pub viewing_date: Option<NaiveDate>,
    #[serde(default)]
    pub mentioned: EntityRefs,
    #[serde(default)]
    pub active_proposals: Vec<Value>,
}

impl MessageRequest {
    pub fn new(user_id: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            utterance: utterance.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation: Vec<ConversationTurn>) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_viewing_date(mut self, viewing_date: Option<NaiveDate>) -> Self {
        self.viewing_date = viewing_date;
        self
    }

    pub fn with_mentioned(mut self, mentioned: EntityRefs) -> Self {
        self.mentioned = mentioned;
        self
    }

    pub fn with_active_proposals(mut self, proposals: Vec<Value>) -> Self {
        self.active_proposals = proposals;
        self
    }

    fn context_request(&self) -> ContextRequest {
        ContextRequest::new(&self.user_id)
            .with_conversation(self.conversation.clone())
            .with_viewing_date(self.viewing_date)
            .with_mentioned(self.mentioned.clone())
            .with_active_proposals(self.active_proposals.clone())
    }
}

/// What the caller renders back to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssistantResponse {
    Executed {
        understanding: Understanding,
        result: ExecutionResult,
        reply: String,
    },
    /// The plan has open ambiguities and was not dispatched
    NeedsClarification {
        understanding: Understanding,
        questions: Vec<String>,
    },
}

impl AssistantResponse {
    pub fn understanding(&self) -> &Understanding {
        match self {
            Self::Executed { understanding, .. }
            | Self::NeedsClarification { understanding, .. } => understanding,
        }
    }

    /// Text to show the user.
    pub fn reply_text(&self) -> String {
        match self {
            Self::Executed { reply, .. } => reply.clone(),
            Self::NeedsClarification { questions, .. } => questions.join(" "),
        }
    }
}

pub struct Assistant {
    assembler: Arc<dyn ContextAssembler>,
    resolver: Arc<dyn IntentResolver>,
    dispatcher: Arc<Dispatcher>,
}

impl Assistant {
    pub fn new(
        assembler: Arc<dyn ContextAssembler>,
        resolver: Arc<dyn IntentResolver>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            assembler,
            resolver,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub async fn handle_message(&self, request: MessageRequest) -> AssistantResponse {
        tracing::info!(
            user_id = %request.user_id,
            utterance = %truncate_for_log(&request.utterance, MAX_LOG_UTTERANCE_CHARS),
            viewing_date = ?request.viewing_date,
            history = request.conversation.len(),
            "message received"
        );

        let context = self.assembler.build_context(&request.context_request()).await;
        let understanding = self.resolver.understand(&request.utterance, &context).await;

        if understanding.needs_clarification() {
            let questions = understanding.clarification_questions();
            tracing::info!(
                user_id = %request.user_id,
                intent = %understanding.intent.primary,
                questions = questions.len(),
                "plan needs clarification, not dispatching"
            );
            return AssistantResponse::NeedsClarification {
                understanding,
                questions,
            };
        }

        let result = self.dispatcher.execute(&understanding, &context).await;
        let reply = reply_for(&understanding, &result);
        AssistantResponse::Executed {
            understanding,
            result,
            reply,
        }
    }
}

fn reply_for(understanding: &Understanding, result: &ExecutionResult) -> String {
    if let Some(error) = &result.error {
        return format!("I couldn't complete that ({}): {}", error.code, error.message);
    }
    if !result.success {
        return "I couldn't complete that.".to_string();
    }

    let names = understanding.execution.capability_names();
    if names == [CONVERSATION_CAPABILITY] {
        if let Some(reply) = result
            .result
            .as_ref()
            .and_then(|output| output.get("reply"))
            .and_then(Value::as_str)
        {
            return reply.to_string();
        }
    }
    format!("Done: {}.", names.join(", ").replace('_', " "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cadence_capabilities::{register_builtin_capabilities, InMemoryCalendar, UserFixture};
    use cadence_context::BasicContextAssembler;
    use cadence_core::store::OperationLedger;
    use cadence_core::types::{
        Ambiguity, ContextSnapshot, Execution, FixedClock, IntentSummary, ScheduleBlock,
    };
    use cadence_core::CapabilityRegistry;
    use cadence_stores::InMemoryOperationLedger;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct StaticResolver {
        plan: Understanding,
    }

    #[async_trait]
    impl IntentResolver for StaticResolver {
        async fn understand(&self, _utterance: &str, _context: &ContextSnapshot) -> Understanding {
            self.plan.clone()
        }
    }

    fn plan(capability: &str, params: Value) -> Understanding {
        Understanding::new(
            IntentSummary::new(capability, 0.9, "test"),
            Execution::single(capability, params),
        )
    }

    fn assistant(plan: Understanding) -> (Assistant, Arc<InMemoryOperationLedger>) {
        let calendar = Arc::new(InMemoryCalendar::new());
        let start = chrono::NaiveDate::from_ymd_opt(2024, 7, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        calendar
            .seed_user(
                "u1",
                UserFixture {
                    schedule: vec![ScheduleBlock {
                        id: "B1".to_string(),
                        block_type: "meeting".to_string(),
                        title: "Team Standup".to_string(),
                        start,
                        end: start + chrono::Duration::minutes(15),
                    }],
                    ..UserFixture::default()
                },
            )
            .unwrap();

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap(),
        ));
        let ledger = Arc::new(InMemoryOperationLedger::new());
        let mut registry = CapabilityRegistry::new();
        register_builtin_capabilities(&mut registry, calendar.clone());
        let dispatcher = Dispatcher::new(registry, ledger.clone()).with_clock(clock.clone());
        let assembler = BasicContextAssembler::new(calendar, ledger.clone()).with_clock(clock);
        let assistant = Assistant::new(
            Arc::new(assembler),
            Arc::new(StaticResolver { plan }),
            Arc::new(dispatcher),
        );
        (assistant, ledger)
    }

    #[test]
    fn test_ambiguous_plan_is_not_dispatched() {
        let ambiguous = plan("schedule_create_block", json!({"title": "it"}))
            .with_ambiguity(Ambiguity::new("it", "What does \"it\" refer to?"));
        let (assistant, ledger) = assistant(ambiguous);

        let response =
            tokio_test::block_on(assistant.handle_message(MessageRequest::new("u1", "Schedule it")));
        match response {
            AssistantResponse::NeedsClarification { questions, .. } => {
                assert_eq!(questions, vec!["What does \"it\" refer to?".to_string()]);
            }
            other => panic!("expected clarification, got {other:?}"),
        }
        assert_eq!(tokio_test::block_on(ledger.len()).unwrap(), 0);
    }

    #[test]
    fn test_success_reply_names_capability() {
        let (assistant, ledger) = assistant(plan(
            "schedule_move_block",
            json!({"blockId": "B1", "newStartTime": "15:00"}),
        ));
        let response = tokio_test::block_on(
            assistant.handle_message(MessageRequest::new("u1", "move standup to 3pm")),
        );
        assert_eq!(response.reply_text(), "Done: schedule move block.");
        assert_eq!(tokio_test::block_on(ledger.len()).unwrap(), 1);
    }

    #[test]
    fn test_failure_reply_carries_code() {
        let (assistant, _) = assistant(plan("schedule_delete_block", json!({"blockId": "B9"})));
        let response = tokio_test::block_on(
            assistant.handle_message(MessageRequest::new("u1", "delete that meeting")),
        );
        let text = response.reply_text();
        assert!(
            text.starts_with("I couldn't complete that (BLOCK_NOT_FOUND): "),
            "{text}"
        );
    }

    #[test]
    fn test_conversation_reply_passes_through() {
        let (assistant, _) = assistant(plan(CONVERSATION_CAPABILITY, json!({})));
        let response =
            tokio_test::block_on(assistant.handle_message(MessageRequest::new("u1", "hi")));
        assert_eq!(response.reply_text(), "How can I help with your schedule?");
    }
}
