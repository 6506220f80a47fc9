//! Sub-agent task and result types

use serde::{Deserialize, Serialize};

use super::agent::StopReason;
use crate::tool::Source;

/// Unique identifier for a delegated task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}

/// Outcome class of a delegated task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Completed,
    /// Finished with the synthetic round-limit answer
    BudgetExhausted,
    Failed,
}

/// Task handed to a freshly built sub-agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentTask {
    pub id: TaskId,
    /// Display name of the sub-agent
    pub name: String,
    /// First user input of the sub-agent
    pub instruction: String,
    pub system_prompt: String,
    pub max_rounds: usize,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl SubAgentTask {
    /// Create a task builder
    pub fn builder(instruction: impl Into<String>) -> SubAgentTaskBuilder {
        SubAgentTaskBuilder::new(instruction)
    }
}

/// Builder for SubAgentTask
pub struct SubAgentTaskBuilder {
    name: Option<String>,
    instruction: String,
    system_prompt: String,
    max_rounds: usize,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl SubAgentTaskBuilder {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            name: None,
            instruction: instruction.into(),
            system_prompt: String::new(),
            max_rounds: 10,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Model override; `None` keeps the factory default
    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> SubAgentTask {
        let id = TaskId::default();
        let name = self
            .name
            .unwrap_or_else(|| format!("Sub-Agent-{}", &id.as_str()[id.as_str().len().saturating_sub(8)..]));
        SubAgentTask {
            id,
            name,
            instruction: self.instruction,
            system_prompt: self.system_prompt,
            max_rounds: self.max_rounds,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Result from sub-agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub task_id: TaskId,
    pub name: String,
    /// Final output (submitted report, or the final answer text)
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
    pub status: TaskStatus,
    pub stop_reason: Option<StopReason>,
    pub rounds: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Tool invocations the sub-agent made
    pub tool_calls: usize,
    /// Sources the sub-agent collected
    pub sources: Vec<Source>,
    pub execution_time_ms: u64,
}

impl SubAgentResult {
    /// Create a failed result
    pub fn failure(task: &SubAgentTask, error: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            output: String::new(),
            success: false,
            error: Some(error.into()),
            status: TaskStatus::Failed,
            stop_reason: None,
            rounds: 0,
            input_tokens: 0,
            output_tokens: 0,
            tool_calls: 0,
            sources: vec![],
            execution_time_ms: 0,
        }
    }

    /// Error text of a failed result
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}
