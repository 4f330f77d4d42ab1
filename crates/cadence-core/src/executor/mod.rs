//! Executor module
//!
//! The Dispatcher is responsible for:
//! - Capability lookup and parameter validation
//! - Single, workflow and multi-step execution semantics
//! - Affected-entity tracking and ledger recording

mod entities;
mod registry;
mod schema;

use std::sync::Arc;
use tokio::sync::RwLock;

use serde_json::{json, Value};

use crate::capability::{CapabilityContext, CapabilityInput, CapabilityResult};
use crate::codes;
use crate::store::OperationLedger;
use crate::types::{
    Clock, ContextSnapshot, EntityRefs, Execution, ExecutionError, ExecutionResult, PlanStep,
    StepReport, StepStatus, SystemClock, TrackedOperation, Understanding,
};

pub use entities::{AffectedEntityTable, PrefixRule};
pub use registry::CapabilityRegistry;
pub use schema::validate_parameters;

/// Capability name recorded for the parent operation of a multi-step plan.
pub const MULTI_STEP_OPERATION: &str = "multi_step";

const MAX_LOG_JSON_CHARS: usize = 4_000;

/// Shorten long text for log output.
pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

fn truncate_json_for_log(value: &Value, max_chars: usize) -> String {
    truncate_for_log(&value.to_string(), max_chars)
}

/// Executes resolved plans against the capability registry.
pub struct Dispatcher {
    registry: Arc<RwLock<CapabilityRegistry>>,
    ledger: Arc<dyn OperationLedger>,
    entity_table: AffectedEntityTable,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(registry: CapabilityRegistry, ledger: Arc<dyn OperationLedger>) -> Self {
        Self::with_registry(Arc::new(RwLock::new(registry)), ledger)
    }

    /// Create a dispatcher over a shared registry
    pub fn with_registry(
        registry: Arc<RwLock<CapabilityRegistry>>,
        ledger: Arc<dyn OperationLedger>,
    ) -> Self {
        Self {
            registry,
            ledger,
            entity_table: AffectedEntityTable::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_entity_table(mut self, table: AffectedEntityTable) -> Self {
        self.entity_table = table;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> Arc<RwLock<CapabilityRegistry>> {
        self.registry.clone()
    }

    /// Execute a plan and record exactly one operation in the ledger.
    pub async fn execute(&self, plan: &Understanding, context: &ContextSnapshot) -> ExecutionResult {
        tracing::info!(
            user_id = %context.user_id,
            execution = plan.execution.kind(),
            intent = %plan.intent.primary,
            "dispatch started"
        );

        let result = match &plan.execution {
            Execution::Single {
                capability,
                parameters,
            } => {
                let params = parameters.clone().unwrap_or_else(empty_object);
                self.invoke(capability, params, context, None, &EntityRefs::new())
                    .await
            }
            Execution::Workflow {
                workflow_name,
                parameters,
            } => {
                let params = parameters.clone().unwrap_or_else(empty_object);
                self.invoke(workflow_name, params, context, None, &EntityRefs::new())
                    .await
            }
            Execution::MultiStep { steps } => self.execute_steps(steps, context).await,
        };

        if let Err(error) = self.ledger.record(result.operation.clone()).await {
            tracing::warn!(
                user_id = %context.user_id,
                operation_id = %result.operation.id,
                error = %error,
                "failed to record operation"
            );
        }

        tracing::info!(
            user_id = %context.user_id,
            operation_id = %result.operation.id,
            capability = %result.operation.capability,
            success = result.success,
            error_code = result.error_code().unwrap_or(""),
            affected = result.operation.affected_entities.len(),
            "dispatch finished"
        );
        result
    }

    async fn execute_steps(&self, steps: &[PlanStep], context: &ContextSnapshot) -> ExecutionResult {
        let params = json!({ "steps": serde_json::to_value(steps).unwrap_or_default() });
        let parent = TrackedOperation::new(
            &context.user_id,
            MULTI_STEP_OPERATION,
            params,
            self.clock.now(),
        );

        if let Err(message) = check_steps(steps) {
            tracing::warn!(
                user_id = %context.user_id,
                reason = %message,
                "rejecting multi-step plan"
            );
            let error = ExecutionError::new(codes::INVALID_PLAN, message, false);
            let operation = parent.with_result(error_value(&error), false);
            return ExecutionResult::failed(error, operation);
        }

        let mut reports: Vec<StepReport> = Vec::with_capacity(steps.len());
        let mut aggregate = EntityRefs::new();
        let mut first_failure: Option<ExecutionError> = None;
        let mut aborted = false;

        for (index, step) in steps.iter().enumerate() {
            if aborted {
                reports.push(StepReport::not_run(index, &step.capability, StepStatus::Aborted));
                continue;
            }

            let blocked_on = step
                .depends_on
                .iter()
                .find(|dep| !reports.get(**dep).is_some_and(StepReport::succeeded));
            if let Some(dep) = blocked_on {
                tracing::info!(
                    user_id = %context.user_id,
                    step_index = index,
                    capability = %step.capability,
                    dependency = *dep,
                    "step skipped because a dependency did not succeed"
                );
                reports.push(StepReport::not_run(index, &step.capability, StepStatus::Skipped));
                continue;
            }

            let params = if step.parameters.is_null() {
                empty_object()
            } else {
                step.parameters.clone()
            };
            let outcome = self
                .invoke(&step.capability, params, context, Some(index), &aggregate)
                .await;
            aggregate.concat(&outcome.operation.affected_entities);

            if let Some(error) = &outcome.error {
                if first_failure.is_none() {
                    first_failure = Some(error.clone());
                }
                if !error.recoverable {
                    tracing::warn!(
                        user_id = %context.user_id,
                        step_index = index,
                        capability = %step.capability,
                        code = %error.code,
                        "fatal step failure, aborting remaining steps"
                    );
                    aborted = true;
                }
            }
            reports.push(StepReport::executed(index, &step.capability, outcome));
        }

        let summaries: Vec<Value> = reports.iter().map(StepReport::summary).collect();
        let result_value = json!({ "steps": summaries });
        let success = first_failure.is_none();
        let operation = parent
            .with_result(result_value.clone(), success)
            .with_affected(aggregate);

        let mut result = match first_failure {
            None => ExecutionResult::succeeded(result_value, operation),
            Some(cause) => {
                let failed = reports
                    .iter()
                    .filter(|r| r.status == StepStatus::Failed)
                    .count();
                let (code, recoverable) = if aborted {
                    (codes::STEP_FAILED, false)
                } else {
                    (codes::MULTI_STEP_FAILED, true)
                };
                let message = format!(
                    "{} of {} steps failed; first failure ({}): {}",
                    failed,
                    steps.len(),
                    cause.code,
                    cause.message
                );
                let error = ExecutionError::new(code, message, recoverable);
                let mut result = ExecutionResult::failed(error, operation);
                result.result = Some(result_value);
                result
            }
        };
        result.steps = reports;
        result
    }

    /// Run one capability. Never records; the caller owns ledger writes.
    async fn invoke(
        &self,
        name: &str,
        params: Value,
        context: &ContextSnapshot,
        step_index: Option<usize>,
        produced: &EntityRefs,
    ) -> ExecutionResult {
        let operation =
            TrackedOperation::new(&context.user_id, name, params.clone(), self.clock.now());

        let capability = {
            let registry = self.registry.read().await;
            registry.get(name)
        };
        let Some(capability) = capability else {
            tracing::warn!(
                user_id = %context.user_id,
                capability = %name,
                step_index = ?step_index,
                "capability not found"
            );
            let error = ExecutionError::new(
                codes::CAPABILITY_NOT_FOUND,
                format!("Capability '{}' not found", name),
                false,
            );
            let operation = operation.with_result(error_value(&error), false);
            return ExecutionResult::failed(error, operation);
        };

        let meta = capability.metadata();
        if let Err(reason) = validate_parameters(&params, &meta.parameter_schema) {
            tracing::warn!(
                user_id = %context.user_id,
                capability = %name,
                step_index = ?step_index,
                reason = %reason,
                "parameter validation failed"
            );
            let error = ExecutionError::new(
                codes::INVALID_PARAMETERS,
                format!("Capability '{}' parameter validation failed: {}", name, reason),
                false,
            );
            let operation = operation.with_result(error_value(&error), false);
            return ExecutionResult::failed(error, operation);
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                user_id = %context.user_id,
                capability = %name,
                step_index = ?step_index,
                params = %truncate_json_for_log(&params, MAX_LOG_JSON_CHARS),
                "capability execution started"
            );
        }

        let mut ctx =
            CapabilityContext::new(&context.user_id, &operation.id, context.temporal.clone());
        if let Some(index) = step_index {
            ctx = ctx.with_step_index(index);
        }
        let outcome = capability
            .execute(CapabilityInput::with_params(params.clone()), ctx)
            .await;

        match outcome {
            CapabilityResult::Success { output } => {
                let affected = self
                    .entity_table
                    .extract(&meta, &params, Some(&output), context, produced);
                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(
                        capability = %name,
                        step_index = ?step_index,
                        output = %truncate_json_for_log(&output, MAX_LOG_JSON_CHARS),
                        "capability execution succeeded"
                    );
                }
                let operation = operation
                    .with_result(output.clone(), true)
                    .with_affected(affected);
                ExecutionResult::succeeded(output, operation)
            }
            CapabilityResult::RecoverableError { message, code } => {
                tracing::info!(
                    capability = %name,
                    step_index = ?step_index,
                    code = %code,
                    error = %message,
                    "capability failed (recoverable)"
                );
                let error = ExecutionError::new(code, message, true);
                let operation = operation.with_result(error_value(&error), false);
                ExecutionResult::failed(error, operation)
            }
            CapabilityResult::Error { message, code } => {
                tracing::warn!(
                    capability = %name,
                    step_index = ?step_index,
                    code = %code,
                    error = %message,
                    "capability failed"
                );
                let error = ExecutionError::new(code, message, false);
                let operation = operation.with_result(error_value(&error), false);
                ExecutionResult::failed(error, operation)
            }
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn error_value(error: &ExecutionError) -> Value {
    json!({
        "error": {
            "code": error.code,
            "message": error.message,
            "recoverable": error.recoverable
        }
    })
}

/// Structural checks the dispatcher needs even for unnormalized plans.
fn check_steps(steps: &[PlanStep]) -> Result<(), String> {
    if steps.is_empty() {
        return Err("multi_step execution has no steps".to_string());
    }
    for (index, step) in steps.iter().enumerate() {
        if let Some(dep) = step.depends_on.iter().find(|dep| **dep >= index) {
            return Err(format!(
                "step {} depends on step {} which does not precede it",
                index, dep
            ));
        }
    }
    Ok(())
}
