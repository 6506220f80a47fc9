//! Parallel sub-agent fan-out
//!
//! `run_parallel_agents` spawns one research sub-agent per spec on a
//! [`JoinSet`], bounded by a [`Semaphore`], and reassembles the sections in
//! request order. A failing or panicking sub-agent only turns its own
//! section into an error section.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::delegation::{delegate, subagent_registry};
use super::factory::AgentFactory;
use super::prompts;
use super::types::{SubAgentResult, SubAgentTask};
use crate::error::Result;
use crate::tool::{parse_input, SchemaBuilder, Tool, ToolContext, ToolRegistry, ToolResult};

/// One entry of a fan-out request
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSpec {
    pub task: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub perspective: Option<String>,
}

impl AgentSpec {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            name: None,
            perspective: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_perspective(mut self, perspective: impl Into<String>) -> Self {
        self.perspective = Some(perspective.into());
        self
    }

    fn perspective(&self) -> Option<&str> {
        self.perspective.as_deref().filter(|p| !p.trim().is_empty())
    }

    /// First user input of the sub-agent
    fn instruction(&self) -> String {
        match self.perspective() {
            Some(perspective) => format!(
                "Complete the research task assigned to you. Focus on the {} perspective.",
                perspective
            ),
            None => "Complete the research task assigned to you.".to_string(),
        }
    }
}

/// `run_parallel_agents`: run several research sub-agents concurrently
pub struct ParallelAgentTool {
    factory: AgentFactory,
    tools: Arc<ToolRegistry>,
}

impl ParallelAgentTool {
    pub fn new(factory: AgentFactory, tools: &ToolRegistry) -> Self {
        Self {
            factory,
            tools: Arc::new(subagent_registry(tools)),
        }
    }

    fn max_agents(&self) -> usize {
        self.factory.delegation().max_parallel_agents.max(1)
    }

    /// Run every spec and render the combined report
    pub async fn run_all(&self, specs: Vec<AgentSpec>, ctx: &ToolContext) -> String {
        let count = specs.len();
        let semaphore = Arc::new(Semaphore::new(self.max_agents()));
        let base_prompt = prompts::research_subagent_prompt(&Local::now().format("%Y-%m-%d").to_string());
        let max_rounds = self.factory.delegation().subagent_max_rounds;
        let model = self.factory.subagent_model().to_string();

        info!(agents = count, "Starting parallel sub-agents");

        let mut names = Vec::with_capacity(count);
        let mut join_set = JoinSet::new();

        for (index, spec) in specs.into_iter().enumerate() {
            let name = spec
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Research-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));
            names.push(name.clone());

            let task = SubAgentTask::builder(spec.instruction())
                .name(&name)
                .system_prompt(format!("{}\n\n<task>{}</task>", base_prompt, spec.task))
                .max_rounds(max_rounds)
                .model(Some(model.clone()))
                .build();

            let factory = self.factory.clone();
            let tools = Arc::clone(&self.tools);
            let parent = ctx.clone();
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let section = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        debug!(index, agent = %name, "Sub-agent started");
                        match AssertUnwindSafe(delegate(&factory, tools, task, &parent))
                            .catch_unwind()
                            .await
                        {
                            Ok(result) => render_section(&spec, &result),
                            Err(_) => error_section(&name, "sub-agent panicked"),
                        }
                    }
                    Err(e) => error_section(&name, &e.to_string()),
                };
                (index, section)
            });
        }

        let mut sections: Vec<Option<String>> = vec![None; count];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, section)) => sections[index] = Some(section),
                Err(e) => warn!(error = %e, "Parallel sub-agent task did not complete"),
            }
        }

        let mut output = vec![
            "# Parallel Research Results".to_string(),
            format!("Executed {} agents in parallel\n", count),
        ];
        output.extend(
            sections
                .into_iter()
                .zip(&names)
                .map(|(section, name)| section.unwrap_or_else(|| error_section(name, "task was cancelled"))),
        );
        output.join("\n")
    }
}

fn render_section(spec: &AgentSpec, result: &SubAgentResult) -> String {
    if !result.success {
        return error_section(&result.name, result.error_message());
    }

    let mut lines = vec![format!("=== {} ===", result.name), format!("Task: {}", spec.task)];
    if let Some(perspective) = spec.perspective() {
        lines.push(format!("Perspective: {}", perspective));
    }
    lines.push(String::new());
    lines.push(result.output.clone());
    lines.push(format!("\nSources collected: {}", result.sources.len()));
    lines.push(String::new());
    lines.join("\n")
}

fn error_section(name: &str, error: &str) -> String {
    format!("=== Error in {} ===\n{}\n", name, error)
}

#[derive(Debug, Deserialize)]
struct ParallelInput {
    #[serde(default)]
    agents: Vec<AgentSpec>,
}

#[async_trait]
impl Tool for ParallelAgentTool {
    fn name(&self) -> &str {
        "run_parallel_agents"
    }

    fn description(&self) -> &str {
        "Run multiple research agents concurrently for comprehensive research"
    }

    fn input_schema(&self) -> JsonValue {
        let agent = SchemaBuilder::object()
            .string("task", "Research task for this agent", true)
            .string("name", "Agent identifier", false)
            .string("perspective", "Research perspective or angle", false)
            .build();

        SchemaBuilder::object()
            .property(
                "agents",
                json!({
                    "type": "array",
                    "description": "List of agent configurations",
                    "items": agent,
                    "maxItems": self.max_agents(),
                }),
                true,
            )
            .build()
    }

    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult> {
        let input: ParallelInput = parse_input(input)?;
        let max = self.max_agents();

        if input.agents.is_empty() {
            return Ok(ToolResult::error("Error: No agents specified"));
        }
        if input.agents.len() > max {
            return Ok(ToolResult::error(format!(
                "Error: Too many agents ({}). Maximum is {}",
                input.agents.len(),
                max
            )));
        }

        Ok(ToolResult::success(self.run_all(input.agents, ctx).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{registry, respond, tool_use, FnClient};
    use crate::llm::ContentBlock;

    fn system_of(request: &crate::llm::MessagesRequest) -> &str {
        request.system.as_deref().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_one_failure_does_not_sink_the_batch() {
        let client = FnClient::new(|request| {
            if system_of(request).contains("<task>task B</task>") {
                Err(crate::Error::Provider("B exploded".to_string()))
            } else {
                Ok(respond(vec![ContentBlock::text("A findings")]))
            }
        });
        let tool = ParallelAgentTool::new(AgentFactory::new(client, Default::default()), &ToolRegistry::new());

        let result = tool
            .execute(
                json!({"agents": [
                    {"task": "task A", "name": "alpha", "perspective": "economic"},
                    {"task": "task B", "name": "beta"}
                ]}),
                &ToolContext::new(),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        let output = result.output;
        assert!(output.starts_with("# Parallel Research Results\nExecuted 2 agents in parallel\n"));
        assert!(output.contains(
            "=== alpha ===\nTask: task A\nPerspective: economic\n\nA findings\n\nSources collected: 0\n"
        ));
        assert!(output.contains("=== Error in beta ===\nProvider error: B exploded\n"));
        assert!(output.find("=== alpha").unwrap() < output.find("=== Error in beta").unwrap());
    }

    #[tokio::test]
    async fn test_sections_keep_request_order() {
        let client = FnClient::new(|request| {
            let system = system_of(request);
            let task = system.rsplit("<task>").next().unwrap_or_default().trim_end_matches("</task>");
            Ok(respond(vec![ContentBlock::text(format!("answer for {}", task))]))
        });
        let tool = ParallelAgentTool::new(AgentFactory::new(client, Default::default()), &ToolRegistry::new());

        let specs: Vec<AgentSpec> = (0..6).map(|i| AgentSpec::new(format!("t{}", i)).with_name(format!("n{}", i))).collect();
        let output = tool.run_all(specs, &ToolContext::new()).await;

        let positions: Vec<usize> = (0..6).map(|i| output.find(&format!("=== n{} ===", i)).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(output.contains("answer for t3"));
    }

    #[tokio::test]
    async fn test_perspective_in_instruction_and_sources_counted() {
        let client = FnClient::new(|request| {
            if request.messages.len() == 1 {
                let first = serde_json::to_string(&request.messages[0]).unwrap();
                assert!(first.contains("Focus on the historical perspective."));
                Ok(respond(vec![tool_use("s1", "search", json!({}))]))
            } else {
                Ok(respond(vec![ContentBlock::text("history notes")]))
            }
        });
        let tool = ParallelAgentTool::new(AgentFactory::new(client, Default::default()), &registry(&["search"]));
        let parent = ToolContext::new();

        let output = tool
            .run_all(vec![AgentSpec::new("topic").with_perspective("historical")], &parent)
            .await;

        assert!(output.contains("Sources collected: 1"));
        assert_eq!(parent.source_count(), 1);
        assert!(output.contains("=== Research-"));
    }

    #[tokio::test]
    async fn test_panicking_subagent_is_isolated() {
        let client = FnClient::new(|request| {
            if system_of(request).contains("<task>bad</task>") {
                panic!("client bug");
            }
            Ok(respond(vec![ContentBlock::text("fine")]))
        });
        let tool = ParallelAgentTool::new(AgentFactory::new(client, Default::default()), &ToolRegistry::new());

        let output = tool
            .run_all(
                vec![AgentSpec::new("good").with_name("g"), AgentSpec::new("bad").with_name("b")],
                &ToolContext::new(),
            )
            .await;

        assert!(output.contains("=== g ==="));
        assert!(output.contains("=== Error in b ===\nsub-agent panicked"));
    }

    #[tokio::test]
    async fn test_agent_count_limits() {
        let client = FnClient::new(|_| Ok(respond(vec![ContentBlock::text("x")])));
        let tool = ParallelAgentTool::new(AgentFactory::new(client, Default::default()), &ToolRegistry::new());
        let ctx = ToolContext::new();

        let empty = tool.execute(json!({"agents": []}), &ctx).await.unwrap();
        assert!(empty.is_error);
        assert_eq!(empty.output, "Error: No agents specified");

        let agents: Vec<JsonValue> = (0..21).map(|i| json!({"task": format!("t{}", i)})).collect();
        let too_many = tool.execute(json!({"agents": agents}), &ctx).await.unwrap();
        assert!(too_many.is_error);
        assert_eq!(too_many.output, "Error: Too many agents (21). Maximum is 20");
    }

    #[tokio::test]
    async fn test_single_permit_still_runs_everything() {
        let client = FnClient::new(|_| Ok(respond(vec![ContentBlock::text("done")])));
        let mut delegation = crate::config::DelegationConfig::default();
        delegation.max_parallel_agents = 1;
        let factory = AgentFactory::new(client, Default::default()).with_delegation(delegation);
        let tool = ParallelAgentTool::new(factory, &ToolRegistry::new());

        let output = tool
            .execute(json!({"agents": [{"task": "a"}]}), &ToolContext::new())
            .await
            .unwrap()
            .output;
        assert!(output.contains("Executed 1 agents in parallel"));

        let rejected = tool
            .execute(json!({"agents": [{"task": "a"}, {"task": "b"}]}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(rejected.output, "Error: Too many agents (2). Maximum is 1");
    }
}
