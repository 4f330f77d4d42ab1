//! # Cadence Config
//!
//! Single-file configuration for Cadence. One `cadence.yaml` configures the
//! planner, cache and ledger bounds, context assembly, the model provider
//! and observability. Every section is optional.

mod loader;

pub use loader::{load_config, validate_config, ConfigError};

use serde::Deserialize;

/// Top-level configuration schema.
#[derive(Debug, Clone, Deserialize)]
pub struct CadenceConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            planner: PlannerConfig::default(),
            cache: CacheConfig::default(),
            ledger: LedgerConfig::default(),
            context: ContextConfig::default(),
            provider: ProviderConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "cadence".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// How plans are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    /// Language model first, keyword fallback on failure.
    Llm,
    /// Keyword rules only; no model calls.
    Keyword,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_planner_mode")]
    pub mode: PlannerMode,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    #[serde(default = "default_max_recent_operations")]
    pub max_recent_operations: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Capabilities that default to `{date: viewing_date}` when called bare.
    #[serde(default = "default_view_capabilities")]
    pub view_capabilities: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: default_planner_mode(),
            model: default_model(),
            temperature: default_temperature(),
            max_history_turns: default_max_history_turns(),
            max_recent_operations: default_max_recent_operations(),
            confidence_threshold: default_confidence_threshold(),
            view_capabilities: default_view_capabilities(),
        }
    }
}

fn default_planner_mode() -> PlannerMode {
    PlannerMode::Llm
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_history_turns() -> usize {
    3
}

fn default_max_recent_operations() -> usize {
    3
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_view_capabilities() -> Vec<String> {
    ["schedule_view", "task_list", "email_list"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_entries() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_max_operations")]
    pub max_operations: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
        }
    }
}

fn default_max_operations() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    /// IANA timezone name of the user.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_email_limit")]
    pub email_limit: usize,
    #[serde(default = "default_recent_operation_limit")]
    pub recent_operation_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            email_limit: default_email_limit(),
            recent_operation_limit: default_recent_operation_limit(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    2000
}

fn default_email_limit() -> usize {
    20
}

fn default_recent_operation_limit() -> usize {
    10
}

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable name containing the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// API key from the configured environment variable, if set and non-empty.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
