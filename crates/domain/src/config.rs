//! Layered configuration: `config.toml` → environment → CLI flags.
//!
//! Every section has serde defaults so an empty file (or no file) yields a
//! working configuration. `apply_env` folds in the environment overrides
//! the runtime honors (`TOKEN_BUDGET`, `AXON_STATE_DIR`); API keys are read
//! lazily by the provider adapters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Load from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", p.display())))?
            }
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Fold in environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(budget) = std::env::var("TOKEN_BUDGET") {
            match budget.parse::<usize>() {
                Ok(v) if v > 0 => self.context.token_budget = v,
                _ => tracing::warn!(value = %budget, "ignoring unparsable TOKEN_BUDGET"),
            }
        }
        if let Ok(dir) = std::env::var("AXON_STATE_DIR") {
            self.workspace.state_path = PathBuf::from(dir);
        }
    }

    /// Sanity-check the resolved configuration.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.runtime.max_turns == 0 {
            issues.push(ConfigIssue::error("runtime.max_turns must be at least 1"));
        }
        if self.context.token_budget == 0 {
            issues.push(ConfigIssue::error("context.token_budget must be positive"));
        }
        if self.context.keep_recent_turns == 0 {
            issues.push(ConfigIssue::warning(
                "context.keep_recent_turns is 0; summarization will keep no head turns",
            ));
        }
        if self.runtime.tool_timeout_sec > MAX_TOOL_TIMEOUT_SEC {
            issues.push(ConfigIssue::warning(format!(
                "runtime.tool_timeout_sec exceeds the system maximum ({MAX_TOOL_TIMEOUT_SEC}s); it will be clamped"
            )));
        }
        for provider in &self.llm.providers {
            if provider.id.is_empty() {
                issues.push(ConfigIssue::error("llm.providers entry with empty id"));
            }
        }
        issues
    }
}

/// System ceiling for any per-call tool timeout.
pub const MAX_TOOL_TIMEOUT_SEC: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Warning, message: message.into() }
    }
    fn error(message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Error, message: message.into() }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider id used when the CLI does not select one.
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "d_3")]
    pub max_retries: u32,
    /// Per-model pricing for cost estimates (USD per million tokens).
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            providers: Vec::new(),
            max_retries: 3,
            pricing: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Defaults per kind
    /// (`ANTHROPIC_API_KEY` / `OPENAI_API_KEY`).
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Bound on the adapter's HTTP connection pool.
    #[serde(default = "d_8")]
    pub max_connections: usize,
    #[serde(default = "d_120")]
    pub request_timeout_sec: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 * self.input_per_mtok
            + completion_tokens as f64 * self.output_per_mtok)
            / 1_000_000.0
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context budget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextStrategyName {
    /// LLM-assisted summarization of the tail, truncation as fallback.
    CompactifyMemory,
    /// Drop oldest turns on pair boundaries until under budget.
    Simple,
    /// Pass the history through untouched.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "d_budget")]
    pub token_budget: usize,
    #[serde(default = "d_strategy")]
    pub strategy: ContextStrategyName,
    /// Turns kept verbatim ahead of the summarized tail.
    #[serde(default = "d_10")]
    pub keep_recent_turns: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 120_000,
            strategy: ContextStrategyName::Simple,
            keep_recent_turns: 10,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime bounds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "d_200")]
    pub max_turns: u32,
    #[serde(default = "d_32768")]
    pub max_output_tokens: u32,
    #[serde(default = "d_600")]
    pub tool_timeout_sec: u64,
    #[serde(default = "d_30000")]
    pub max_tool_output_chars: usize,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Text marker that converts a plain answer into a completion.
    #[serde(default = "d_sentinel")]
    pub completion_sentinel: String,
    /// Run the reviewer sub-loop after the main agent completes.
    #[serde(default)]
    pub review: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_turns: 200,
            max_output_tokens: 32_768,
            tool_timeout_sec: 600,
            max_tool_output_chars: 30_000,
            temperature: None,
            completion_sentinel: d_sentinel(),
            review: false,
        }
    }
}

impl RuntimeConfig {
    /// The effective per-call tool timeout, clamped to the system maximum.
    pub fn tool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tool_timeout_sec.min(MAX_TOOL_TIMEOUT_SEC))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server + workspace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind")]
    pub bind: String,
    #[serde(default = "d_256")]
    pub event_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: d_bind(),
            event_queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root for tool file I/O. Each session is chrooted here.
    #[serde(default = "d_cwd")]
    pub path: PathBuf,
    /// Where session logs and state checkpoints live.
    #[serde(default = "d_state")]
    pub state_path: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: d_cwd(),
            state_path: d_state(),
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────

fn d_3() -> u32 { 3 }
fn d_8() -> usize { 8 }
fn d_10() -> usize { 10 }
fn d_120() -> u64 { 120 }
fn d_200() -> u32 { 200 }
fn d_256() -> usize { 256 }
fn d_600() -> u64 { 600 }
fn d_30000() -> usize { 30_000 }
fn d_32768() -> u32 { 32_768 }
fn d_budget() -> usize { 120_000 }
fn d_strategy() -> ContextStrategyName { ContextStrategyName::Simple }
fn d_sentinel() -> String { "Task completed".into() }
fn d_bind() -> String { "127.0.0.1:8791".into() }
fn d_cwd() -> PathBuf { PathBuf::from(".") }
fn d_state() -> PathBuf { PathBuf::from(".axon") }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.runtime.max_turns, 200);
        assert_eq!(config.runtime.max_output_tokens, 32_768);
        assert_eq!(config.runtime.tool_timeout_sec, 600);
        assert_eq!(config.runtime.max_tool_output_chars, 30_000);
        assert_eq!(config.context.token_budget, 120_000);
        assert_eq!(config.context.keep_recent_turns, 10);
        assert_eq!(config.context.strategy, ContextStrategyName::Simple);
    }

    #[test]
    fn provider_section_parses() {
        let config: Config = toml::from_str(
            r#"
            [[llm.providers]]
            id = "anthropic"
            kind = "anthropic"
            default_model = "claude-sonnet-4-20250514"

            [llm.pricing.claude-sonnet-4-20250514]
            input_per_mtok = 3.0
            output_per_mtok = 15.0
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.providers.len(), 1);
        assert_eq!(config.llm.providers[0].kind, ProviderKind::Anthropic);
        let pricing = &config.llm.pricing["claude-sonnet-4-20250514"];
        let cost = pricing.estimate_cost(1_000_000, 0);
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn strategy_names_match_cli_surface() {
        let config: Config =
            toml::from_str("[context]\nstrategy = \"compactify-memory\"").unwrap();
        assert_eq!(config.context.strategy, ContextStrategyName::CompactifyMemory);
    }

    #[test]
    fn validate_flags_zero_turns() {
        let mut config = Config::default();
        config.runtime.max_turns = 0;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn tool_timeout_is_clamped() {
        let mut runtime = RuntimeConfig::default();
        runtime.tool_timeout_sec = 10_000;
        assert_eq!(
            runtime.tool_timeout(),
            std::time::Duration::from_secs(MAX_TOOL_TIMEOUT_SEC)
        );
    }
}
