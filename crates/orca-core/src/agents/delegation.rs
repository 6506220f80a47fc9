//! Single-agent delegation
//!
//! [`delegate`] builds a fresh agent from an [`AgentFactory`], runs one task
//! to completion and never fails: errors are carried in the returned
//! [`SubAgentResult`]. The `agent` and `run_blocking_subagent` capabilities
//! are thin formatting layers over it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use super::agent::StopReason;
use super::factory::AgentFactory;
use super::prompts;
use super::types::{SubAgentResult, SubAgentTask, TaskStatus};
use crate::error::Result;
use crate::tool::{parse_input, SchemaBuilder, Tool, ToolContext, ToolRegistry, ToolResult};

/// Capabilities that construct a research lead; never handed to sub-agents
pub const ORCHESTRATION_TOOLS: &[&str] = &["research_lead", "quick_research"];

/// Table for sub-agents derived from a parent table
pub fn subagent_registry(tools: &ToolRegistry) -> ToolRegistry {
    tools.without(ORCHESTRATION_TOOLS)
}

/// Run one task on a freshly built sub-agent.
///
/// The sub-agent shares the parent's files-read set; the sources it
/// collects are merged into `parent` when it finishes, even on failure.
pub async fn delegate(
    factory: &AgentFactory,
    tools: Arc<ToolRegistry>,
    task: SubAgentTask,
    parent: &ToolContext,
) -> SubAgentResult {
    let start = Instant::now();
    let context = parent.child();

    let mut model_config = factory.model_config().clone();
    if let Some(model) = &task.model {
        model_config.model = model.clone();
    }
    if let Some(temperature) = task.temperature {
        model_config.temperature = temperature;
    }
    if let Some(max_tokens) = task.max_tokens {
        model_config.max_tokens = max_tokens;
    }

    let mut agent = factory
        .builder(&task.name)
        .system_prompt(&task.system_prompt)
        .tools(tools)
        .model_config(model_config)
        .max_rounds(Some(task.max_rounds))
        .context(context.clone())
        .build();

    info!(
        task_id = task.id.as_str(),
        agent = %task.name,
        max_rounds = task.max_rounds,
        "Delegating task to sub-agent"
    );

    let outcome = agent.run(&task.instruction).await;
    let sources = context.sources();
    parent.extend_sources(sources.clone());
    let execution_time_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(response) => {
            let stats = agent.stats();
            let output = context.take_report().unwrap_or_else(|| response.text());
            let status = match response.stop_reason {
                StopReason::EndTurn => TaskStatus::Completed,
                StopReason::MaxRounds => TaskStatus::BudgetExhausted,
            };

            info!(
                agent = %task.name,
                rounds = response.rounds,
                tool_calls = stats.tool_calls,
                sources = sources.len(),
                elapsed_ms = execution_time_ms,
                "Sub-agent finished"
            );

            SubAgentResult {
                task_id: task.id,
                name: task.name,
                output,
                success: true,
                error: None,
                status,
                stop_reason: Some(response.stop_reason),
                rounds: response.rounds,
                input_tokens: stats.usage.total_input(),
                output_tokens: stats.usage.output_tokens,
                tool_calls: stats.tool_calls,
                sources,
                execution_time_ms,
            }
        }
        Err(e) => {
            warn!(agent = %task.name, error = %e, "Sub-agent failed");
            let mut result = SubAgentResult::failure(&task, e.to_string());
            result.tool_calls = agent.stats().tool_calls;
            result.sources = sources;
            result.execution_time_ms = execution_time_ms;
            result
        }
    }
}

/// First `max` characters of `text`, marked when cut
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

/// Run a focused sub-agent and render its result for the model
async fn run_focused(
    factory: &AgentFactory,
    tools: Arc<ToolRegistry>,
    task: &str,
    plan: &str,
    max_rounds: usize,
    ctx: &ToolContext,
) -> ToolResult {
    let sub_task = SubAgentTask::builder(format!("Complete this task: {}", task))
        .name(format!("Sub-Agent: {}", preview(task, 30)))
        .system_prompt(prompts::focused_agent_prompt(task, plan))
        .max_rounds(max_rounds)
        .build();

    let result = delegate(factory, tools, sub_task, ctx).await;
    if result.success {
        ToolResult::success(format!(
            "Sub-agent completed task: {}\n\nResult:\n{}\n\nTool calls made: {}",
            task, result.output, result.tool_calls
        ))
    } else {
        ToolResult::error(format!("Sub-agent failed: {}", result.error_message()))
    }
}

/// `agent`: delegate a task to a focused sub-agent
pub struct AgentTool {
    factory: AgentFactory,
    tools: Arc<ToolRegistry>,
}

impl AgentTool {
    /// `tools` is the table the sub-agent receives (orchestration
    /// capabilities are removed)
    pub fn new(factory: AgentFactory, tools: &ToolRegistry) -> Self {
        Self {
            factory,
            tools: Arc::new(subagent_registry(tools)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentInput {
    task: String,
    #[serde(default)]
    plan: String,
    max_iterations: Option<usize>,
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        "agent"
    }

    fn description(&self) -> &str {
        "Create a sub-agent to handle a specific task independently. Use it to delegate a complex \
sub-task, search through many files, or perform a multi-step operation autonomously. The sub-agent \
has the same tools and returns a summary of its work."
    }

    fn input_schema(&self) -> JsonValue {
        SchemaBuilder::object()
            .string("task", "Clear description of what the sub-agent should accomplish", true)
            .string("plan", "Suggested approach or steps for the sub-agent to follow", false)
            .integer(
                "max_iterations",
                "Maximum number of tool rounds the sub-agent can use (default 10)",
                false,
            )
            .build()
    }

    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult> {
        let input: AgentInput = parse_input(input)?;
        let max_rounds = input
            .max_iterations
            .unwrap_or(self.factory.delegation().default_max_iterations);

        Ok(run_focused(&self.factory, Arc::clone(&self.tools), &input.task, &input.plan, max_rounds, ctx).await)
    }
}

/// `run_blocking_subagent`: one research sub-agent, run to completion
pub struct RunBlockingSubagentTool {
    factory: AgentFactory,
    tools: Arc<ToolRegistry>,
}

impl RunBlockingSubagentTool {
    pub fn new(factory: AgentFactory, tools: &ToolRegistry) -> Self {
        Self {
            factory,
            tools: Arc::new(subagent_registry(tools)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlockingInput {
    prompt: String,
    name: Option<String>,
}

const RESEARCH_PLAN: &str = "Follow the research process to gather information and report findings";

#[async_trait]
impl Tool for RunBlockingSubagentTool {
    fn name(&self) -> &str {
        "run_blocking_subagent"
    }

    fn description(&self) -> &str {
        "Create a research subagent with a specific task and wait for its report"
    }

    fn input_schema(&self) -> JsonValue {
        SchemaBuilder::object()
            .string("prompt", "Task description for the subagent", true)
            .string("name", "Name for the subagent", false)
            .build()
    }

    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult> {
        let input: BlockingInput = parse_input(input)?;
        let max_rounds = self.factory.delegation().subagent_max_rounds;

        let mut result = run_focused(
            &self.factory,
            Arc::clone(&self.tools),
            &input.prompt,
            RESEARCH_PLAN,
            max_rounds,
            ctx,
        )
        .await;

        if let Some(name) = input.name.filter(|n| !n.is_empty()) {
            result.output = format!("[{}] {}", name, result.output);
        }
        Ok(result)
    }
}
