//! Agent construction for delegation
//!
//! Delegation capabilities hold an [`AgentFactory`] instead of reaching for
//! a global registry: the factory carries the model client and the default
//! settings every sub-agent starts from.

use std::sync::Arc;

use crate::config::{Config, DelegationConfig, ModelConfig};
use crate::llm::ModelClient;
use crate::tool::ExecutionMode;

use super::agent::AgentBuilder;

#[derive(Clone)]
pub struct AgentFactory {
    client: Arc<dyn ModelClient>,
    model_config: ModelConfig,
    enable_caching: bool,
    execution_mode: ExecutionMode,
    delegation: DelegationConfig,
}

impl std::fmt::Debug for AgentFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentFactory")
            .field("model", &self.model_config.model)
            .field("enable_caching", &self.enable_caching)
            .field("execution_mode", &self.execution_mode)
            .field("delegation", &self.delegation)
            .finish()
    }
}

impl AgentFactory {
    pub fn new(client: Arc<dyn ModelClient>, model_config: ModelConfig) -> Self {
        Self {
            client,
            model_config,
            enable_caching: true,
            execution_mode: ExecutionMode::Parallel,
            delegation: DelegationConfig::default(),
        }
    }

    /// Factory using the model, caching, execution and delegation settings of `config`
    pub fn from_config(client: Arc<dyn ModelClient>, config: &Config) -> Self {
        let execution_mode = if config.agent.parallel_tools {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };

        Self::new(client, config.model.clone())
            .with_caching(config.agent.enable_caching)
            .with_execution_mode(execution_mode)
            .with_delegation(config.delegation.clone())
    }

    pub fn with_caching(mut self, enable_caching: bool) -> Self {
        self.enable_caching = enable_caching;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_delegation(mut self, delegation: DelegationConfig) -> Self {
        self.delegation = delegation;
        self
    }

    /// Builder pre-populated with the factory defaults
    pub fn builder(&self, name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, Arc::clone(&self.client))
            .model_config(self.model_config.clone())
            .enable_caching(self.enable_caching)
            .execution_mode(self.execution_mode)
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn delegation(&self) -> &DelegationConfig {
        &self.delegation
    }

    /// Model for research sub-agents
    pub fn subagent_model(&self) -> &str {
        self.delegation
            .subagent_model
            .as_deref()
            .unwrap_or(&self.model_config.model)
    }

    /// Model for the research lead
    pub fn lead_model(&self) -> &str {
        self.delegation
            .lead_model
            .as_deref()
            .unwrap_or(&self.model_config.model)
    }
}
