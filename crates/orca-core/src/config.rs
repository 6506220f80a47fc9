//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `orca.toml` in the working directory
//! 3. Built-in defaults
//!
//! `${VAR_NAME}` references inside the TOML file are expanded from the
//! environment before parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default config file name looked up by [`Config::load`]
pub const CONFIG_FILE: &str = "orca.toml";

/// Provider connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Base URL (optional, for proxies and custom endpoints)
    pub base_url: Option<String>,
}

/// Model parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens to generate per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context budget used for history truncation
    #[serde(default = "default_context_window")]
    pub context_window_tokens: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            context_window_tokens: default_context_window(),
        }
    }
}

impl ModelConfig {
    /// Same parameters with a different model id
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Same parameters with a different temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Same parameters with a different response size
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Top-level agent behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Display name of the interactive agent
    pub name: String,

    /// Base system prompt (a timestamp is appended per request)
    pub system_prompt: String,

    /// Round budget; `None` means unbounded
    pub max_rounds: Option<usize>,

    /// Annotate the trailing user turn with a cache hint
    pub enable_caching: bool,

    /// Run tool batches concurrently (sequential otherwise)
    pub parallel_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "orca".to_string(),
            system_prompt: default_system_prompt(),
            max_rounds: None,
            enable_caching: true,
            parallel_tools: true,
        }
    }
}

/// Configuration for sub-agent delegation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Hard ceiling on agents in one parallel fan-out
    pub max_parallel_agents: usize,
    /// Round budget for the `agent` capability when none is requested
    pub default_max_iterations: usize,
    /// Round budget for research sub-agents
    pub subagent_max_rounds: usize,
    /// Model for research sub-agents (falls back to the parent model)
    pub subagent_model: Option<String>,
    /// Model for the research lead (falls back to the parent model)
    pub lead_model: Option<String>,
    /// Round budget for the research lead when none is requested
    pub lead_max_rounds: usize,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_parallel_agents: 20,
            default_max_iterations: 10,
            subagent_max_rounds: 20,
            subagent_model: None,
            lead_model: None,
            lead_max_rounds: 50,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    1.0
}

fn default_context_window() -> u64 {
    180_000
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help you answer accurately."
        .to_string()
}

/// Main configuration for orca
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub delegation: DelegationConfig,
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment.
    ///
    /// Unset variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                while let Some(c) = chars.next_if(|c| *c != '}') {
                    var_name.push(c);
                }
                chars.next();

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Parse TOML content (after `${VAR}` expansion) without env overrides.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        let parsed: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(Self::from_toml_config(parsed))
    }

    /// Load from `orca.toml` when present, otherwise from the environment only.
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }
        Self::from_env()
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Fail early when no credentials are available.
    pub fn validate(&self) -> crate::Result<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(Error::Config(
                "ANTHROPIC_API_KEY or LLM_API_KEY not set".to_string(),
            ));
        }
        if self.model.context_window_tokens == 0 {
            return Err(Error::Config(
                "context_window_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let llm = toml.llm.unwrap_or_default();
        let model = toml.model.unwrap_or_default();
        let agent = toml.agent.unwrap_or_default();
        let delegation = toml.delegation.unwrap_or_default();

        let agent_defaults = AgentConfig::default();
        let delegation_defaults = DelegationConfig::default();

        Config {
            llm: LlmConfig {
                api_key: llm.api_key.unwrap_or_default(),
                base_url: llm.base_url.filter(|u| !u.is_empty()),
            },
            model: ModelConfig {
                model: llm.model.unwrap_or_else(default_model),
                max_tokens: model.max_tokens.unwrap_or_else(default_max_tokens),
                temperature: model.temperature.unwrap_or_else(default_temperature),
                context_window_tokens: model
                    .context_window_tokens
                    .unwrap_or_else(default_context_window),
            },
            agent: AgentConfig {
                name: agent.name.unwrap_or(agent_defaults.name),
                system_prompt: agent.system_prompt.unwrap_or(agent_defaults.system_prompt),
                max_rounds: agent.max_rounds.filter(|n| *n > 0),
                enable_caching: agent.enable_caching.unwrap_or(agent_defaults.enable_caching),
                parallel_tools: agent.parallel_tools.unwrap_or(agent_defaults.parallel_tools),
            },
            delegation: DelegationConfig {
                max_parallel_agents: delegation
                    .max_parallel_agents
                    .unwrap_or(delegation_defaults.max_parallel_agents),
                default_max_iterations: delegation
                    .default_max_iterations
                    .unwrap_or(delegation_defaults.default_max_iterations),
                subagent_max_rounds: delegation
                    .subagent_max_rounds
                    .unwrap_or(delegation_defaults.subagent_max_rounds),
                subagent_model: delegation.subagent_model,
                lead_model: delegation.lead_model,
                lead_max_rounds: delegation
                    .lead_max_rounds
                    .unwrap_or(delegation_defaults.lead_max_rounds),
            },
        }
    }

    /// Override settings from environment variables
    fn apply_env_overrides(&mut self) {
        if let Some(api_key) = non_empty_env("ANTHROPIC_API_KEY") {
            self.llm.api_key = api_key;
        }
        // LLM_API_KEY wins over the provider-specific name
        if let Some(api_key) = non_empty_env("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = non_empty_env("LLM_MODEL") {
            self.model.model = model;
        }
        if let Some(base_url) = non_empty_env("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        if let Some(rounds) = non_empty_env("ORCA_MAX_ROUNDS") {
            match rounds.parse::<usize>() {
                Ok(0) => self.agent.max_rounds = None,
                Ok(n) => self.agent.max_rounds = Some(n),
                Err(e) => tracing::warn!(value = %rounds, error = %e, "Ignoring ORCA_MAX_ROUNDS"),
            }
        }
        if let Some(window) = non_empty_env("ORCA_CONTEXT_WINDOW") {
            match window.parse() {
                Ok(n) => self.model.context_window_tokens = n,
                Err(e) => tracing::warn!(value = %window, error = %e, "Ignoring ORCA_CONTEXT_WINDOW"),
            }
        }
        if let Some(caching) = non_empty_env("ORCA_ENABLE_CACHING") {
            self.agent.enable_caching = parse_flag(&caching);
        }
        if let Some(parallel) = non_empty_env("ORCA_PARALLEL_TOOLS") {
            self.agent.parallel_tools = parse_flag(&parallel);
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off")
}

// ============================================================================
// TOML file structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    model: Option<TomlModelConfig>,
    agent: Option<TomlAgentConfig>,
    delegation: Option<TomlDelegationConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlLlmConfig {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlModelConfig {
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    context_window_tokens: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlAgentConfig {
    name: Option<String>,
    system_prompt: Option<String>,
    /// 0 disables the budget
    max_rounds: Option<usize>,
    enable_caching: Option<bool>,
    parallel_tools: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDelegationConfig {
    max_parallel_agents: Option<usize>,
    default_max_iterations: Option<usize>,
    subagent_max_rounds: Option<usize>,
    subagent_model: Option<String>,
    lead_model: Option<String>,
    lead_max_rounds: Option<usize>,
}
