//! Bootstrap helpers for starting Cadence from a single YAML config.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;

use cadence_capabilities::{register_builtin_capabilities, CalendarError, InMemoryCalendar};
use cadence_config::{
    load_config, validate_config, CadenceConfig, ConfigError, ObservabilityConfig, PlannerMode,
};
use cadence_context::{BasicContextAssembler, ContextAssemblerConfig};
use cadence_core::store::{OperationLedger, UnderstandingCache};
use cadence_core::types::{Clock, SystemClock};
use cadence_core::{CapabilityRegistry, Dispatcher, UnderstandingNormalizer};
use cadence_planners::{
    HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmError, LlmUnderstandingEngine,
    OfflineLlmClient, PromptBuilder, UnderstandingEngineConfig,
};
use cadence_stores::{InMemoryOperationLedger, InMemoryUnderstandingCache};

use crate::assistant::{Assistant, AssistantResponse, MessageRequest};

/// Runtime bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),
    #[error("llm client error: {0}")]
    Llm(#[from] LlmError),
}

/// Running app bundle created from unified config.
pub struct AssistantApp {
    pub assistant: Assistant,
    pub registry: Arc<RwLock<CapabilityRegistry>>,
    pub ledger: Arc<dyn OperationLedger>,
    pub cache: Arc<dyn UnderstandingCache>,
    pub calendar: Arc<InMemoryCalendar>,
    pub config: CadenceConfig,
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

impl AssistantApp {
    /// Create a runnable app from a `cadence.yaml`.
    pub fn from_config_path(
        path: &Path,
        calendar: Arc<InMemoryCalendar>,
    ) -> Result<Self, BootstrapError> {
        let config = load_config(path)?;
        Self::from_config(config, calendar)
    }

    /// Create a runnable app from an already loaded config.
    pub fn from_config(
        config: CadenceConfig,
        calendar: Arc<InMemoryCalendar>,
    ) -> Result<Self, BootstrapError> {
        validate_config(&config)?;
        init_tracing(&config.observability);
        let client = build_llm_client(&config)?;
        Ok(Self::from_parts(config, calendar, client, Arc::new(SystemClock)))
    }

    /// Wire every component around an explicit LLM client and clock.
    pub fn from_parts(
        config: CadenceConfig,
        calendar: Arc<InMemoryCalendar>,
        client: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger: Arc<dyn OperationLedger> = Arc::new(
            InMemoryOperationLedger::with_max_operations(config.ledger.max_operations),
        );
        let ttl_secs = i64::try_from(config.cache.ttl_secs).unwrap_or(i64::MAX);
        let cache: Arc<dyn UnderstandingCache> = Arc::new(
            InMemoryUnderstandingCache::with_limits(
                chrono::Duration::seconds(ttl_secs),
                config.cache.max_entries,
            )
            .with_clock(clock.clone()),
        );

        let mut registry = CapabilityRegistry::new();
        register_builtin_capabilities(&mut registry, calendar.clone());
        let registry = Arc::new(RwLock::new(registry));

        let planner = &config.planner;
        let normalizer = UnderstandingNormalizer::new()
            .with_view_capabilities(planner.view_capabilities.iter().cloned())
            .with_confidence_threshold(planner.confidence_threshold);
        let engine = LlmUnderstandingEngine::new(client, cache.clone(), registry.clone())
            .with_config(UnderstandingEngineConfig {
                model: planner.model.clone(),
                temperature: planner.temperature,
            })
            .with_normalizer(normalizer)
            .with_prompt_builder(PromptBuilder::new(
                planner.max_history_turns,
                planner.max_recent_operations,
            ))
            .with_clock(clock.clone());

        let assembler_config = ContextAssemblerConfig {
            timezone: config.context.timezone.clone(),
            fetch_timeout: Duration::from_millis(config.context.fetch_timeout_ms),
            email_limit: config.context.email_limit,
            recent_operation_limit: config.context.recent_operation_limit,
            ..ContextAssemblerConfig::default()
        };
        let assembler =
            BasicContextAssembler::with_config(calendar.clone(), ledger.clone(), assembler_config)
                .with_clock(clock.clone());

        let dispatcher =
            Dispatcher::with_registry(registry.clone(), ledger.clone()).with_clock(clock);

        tracing::info!(
            app = %config.app.name,
            environment = %config.app.environment,
            planner_mode = ?planner.mode,
            model = %planner.model,
            cache_ttl_secs = config.cache.ttl_secs,
            cache_max_entries = config.cache.max_entries,
            ledger_max_operations = config.ledger.max_operations,
            timezone = %config.context.timezone,
            "assistant runtime ready"
        );

        Self {
            assistant: Assistant::new(Arc::new(assembler), Arc::new(engine), Arc::new(dispatcher)),
            registry,
            ledger,
            cache,
            calendar,
            config,
        }
    }

    pub async fn handle_message(&self, request: MessageRequest) -> AssistantResponse {
        self.assistant.handle_message(request).await
    }
}

/// HTTP client in `llm` mode with an API key; otherwise an offline client
/// that sends every request down the keyword fallback.
pub fn build_llm_client(config: &CadenceConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    if config.planner.mode == PlannerMode::Keyword {
        return Ok(Arc::new(OfflineLlmClient::new("planner mode is keyword")));
    }
    let Some(api_key) = config.provider.resolve_api_key() else {
        tracing::warn!(
            api_key_env = %config.provider.api_key_env,
            "no API key configured, using keyword understanding only"
        );
        return Ok(Arc::new(OfflineLlmClient::new(format!(
            "{} is not set",
            config.provider.api_key_env
        ))));
    };
    let client = HttpLlmClient::new(HttpLlmClientConfig {
        endpoint: config.provider.endpoint.clone(),
        api_key: Some(api_key),
        timeout_secs: config.provider.timeout_secs,
        ..HttpLlmClientConfig::default()
    })?;
    Ok(Arc::new(client))
}

/// Install the global subscriber once per process. `RUST_LOG` wins over the
/// configured level; `CADENCE_LOG_FILE` wins over the configured file.
pub fn init_tracing(observability: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let log_file_path = std::env::var("CADENCE_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| observability.log_file.clone());
        let file_writer = log_file_path.as_deref().and_then(create_log_writer);
        let fallback_level = match observability.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        // stdout is reserved for command output
        match file_writer {
            Some(writer) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .try_init();
            }
        }

        tracing::info!(
            log_level = %observability.log_level,
            log_file = log_file_path.as_deref().unwrap_or("(stderr)"),
            "tracing initialized"
        );
    });
}

fn create_log_writer(path: &str) -> Option<SharedFileMakeWriter> {
    use std::fs::{create_dir_all, OpenOptions};

    let file_path = Path::new(path);
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = create_dir_all(parent) {
                eprintln!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    err
                );
                return None;
            }
        }
    }
    let file = match OpenOptions::new().create(true).append(true).open(file_path) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", file_path.display(), err);
            return None;
        }
    };
    Some(SharedFileMakeWriter::new(file))
}

#[derive(Clone)]
struct SharedFileMakeWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl SharedFileMakeWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

struct SharedFileWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedFileMakeWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: self.file.clone(),
        }
    }
}

impl std::io::Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::write(&mut *file, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::flush(&mut *file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword_config() -> CadenceConfig {
        let mut config = CadenceConfig::default();
        config.planner.mode = PlannerMode::Keyword;
        config
    }

    #[test]
    fn test_keyword_mode_builds_offline_app() {
        let app =
            AssistantApp::from_config(keyword_config(), Arc::new(InMemoryCalendar::new())).unwrap();
        let registry = tokio_test::block_on(app.registry.read());
        assert_eq!(registry.len(), 11);
        assert!(registry.contains("daily_planning"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = keyword_config();
        config.cache.max_entries = 0;
        let result = AssistantApp::from_config(config, Arc::new(InMemoryCalendar::new()));
        assert!(matches!(result, Err(BootstrapError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_missing_api_key_falls_back_to_offline_client() {
        let mut config = CadenceConfig::default();
        config.provider.api_key_env = format!("CADENCE_TEST_MISSING_KEY_{}", std::process::id());
        assert!(build_llm_client(&config).is_ok());
    }
}
