//! Two-tier research orchestration
//!
//! `research_lead` builds a lead agent whose table holds the web
//! capabilities plus the delegation capabilities; the lead plans, spawns
//! research sub-agents and submits its report through `complete_task`.
//! Sub-agent tables never contain the orchestration capabilities, so a
//! sub-agent cannot construct another lead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use super::delegation::{subagent_registry, AgentTool, RunBlockingSubagentTool};
use super::factory::AgentFactory;
use super::parallel::ParallelAgentTool;
use super::prompts;
use crate::error::Result;
use crate::tool::{parse_input, SchemaBuilder, Tool, ToolContext, ToolRegistry, ToolResult};

/// Web capabilities handed to research agents
pub const WEB_TOOLS: &[&str] = &["web_search", "web_fetch"];

/// Capabilities the lead adds on top of the web capabilities
const LEAD_TOOLS: &[&str] = &[
    "run_blocking_subagent",
    "run_parallel_agents",
    "agent",
    "complete_task",
    "add_citations",
];

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// `complete_task`: format and submit the final report
#[derive(Debug, Default)]
pub struct CompleteTaskTool;

#[derive(Debug, Deserialize)]
struct CompleteInput {
    result: String,
    #[serde(default = "default_true")]
    include_sources: bool,
}

fn default_true() -> bool {
    true
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Submit the final research report in markdown format"
    }

    fn input_schema(&self) -> JsonValue {
        SchemaBuilder::object()
            .string("result", "Final research report in markdown", true)
            .boolean("include_sources", "Append the collected sources (default true)", false)
            .build()
    }

    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult> {
        let input: CompleteInput = parse_input(input)?;

        let mut lines = vec![
            "# Research Report\n".to_string(),
            format!("*Generated: {}*\n", Local::now().format("%Y-%m-%d %H:%M:%S")),
            input.result,
        ];

        let sources = ctx.sources();
        if input.include_sources && !sources.is_empty() {
            lines.push("\n\n## Sources\n".to_string());
            for (i, source) in sources.iter().enumerate() {
                let title = if source.title.is_empty() { "Untitled" } else { &source.title };
                lines.push(format!("{}. [{}]({})", i + 1, title, source.url));
                lines.push(format!("   - Tool: {}", source.tool));
                lines.push(format!("   - Accessed: {}", source.accessed_at.to_rfc3339()));
                lines.push(String::new());
            }
        }

        let report = lines.join("\n");
        ctx.submit_report(report.clone());
        info!(len = report.len(), sources = sources.len(), "Research report submitted");
        Ok(ToolResult::success(report))
    }
}

/// `add_citations`: let a tool-less agent insert citations into a report
pub struct CitationTool {
    factory: AgentFactory,
}

impl CitationTool {
    pub fn new(factory: AgentFactory) -> Self {
        Self { factory }
    }
}

#[derive(Debug, Deserialize)]
struct CitationInput {
    text: String,
    #[serde(default)]
    sources: Vec<JsonValue>,
}

const CITED_OPEN: &str = "<exact_text_with_citation>";
const CITED_CLOSE: &str = "</exact_text_with_citation>";

/// Text between the citation tags, if both are present
fn extract_cited(response: &str) -> Option<&str> {
    let start = response.find(CITED_OPEN)? + CITED_OPEN.len();
    let end = start + response[start..].find(CITED_CLOSE)?;
    Some(&response[start..end])
}

#[async_trait]
impl Tool for CitationTool {
    fn name(&self) -> &str {
        "add_citations"
    }

    fn description(&self) -> &str {
        "Add proper citations to research text"
    }

    fn input_schema(&self) -> JsonValue {
        SchemaBuilder::object()
            .string("text", "Text to add citations to", true)
            .array("sources", "List of sources used", json!({"type": "object"}), true)
            .build()
    }

    async fn execute(&self, input: JsonValue, _ctx: &ToolContext) -> Result<ToolResult> {
        let input: CitationInput = parse_input(input)?;
        let sources = serde_json::to_string_pretty(&input.sources)?;

        let mut agent = self
            .factory
            .builder("Citation-Agent")
            .system_prompt(prompts::CITATION_PROMPT)
            .model(self.factory.subagent_model())
            .temperature(0.3)
            .max_tokens(8000)
            .build();

        match agent.run(prompts::citation_request(&input.text, &sources)).await {
            Ok(response) => {
                let text = response.text();
                match extract_cited(&text) {
                    Some(cited) => Ok(ToolResult::success(cited)),
                    None => {
                        warn!("Citation agent returned no tagged text; keeping the original");
                        Ok(ToolResult::success(input.text))
                    }
                }
            }
            Err(e) => Ok(ToolResult::error(format!("Error adding citations: {}", e))),
        }
    }
}

/// `research_lead`: plan, delegate and synthesize a research report
pub struct ResearchLeadTool {
    factory: AgentFactory,
    tools: ToolRegistry,
}

impl ResearchLeadTool {
    /// `tools` is the parent table; the lead takes its web capabilities and
    /// sub-agents take everything except orchestration.
    pub fn new(factory: AgentFactory, tools: &ToolRegistry) -> Self {
        Self {
            factory,
            tools: subagent_registry(tools),
        }
    }

    /// Table for research sub-agents: the parent table plus `complete_task`
    fn subagent_tools(&self) -> Result<ToolRegistry> {
        let base = self
            .tools
            .filtered(|name| !LEAD_TOOLS.contains(&name));
        base.extended([Arc::new(CompleteTaskTool) as Arc<dyn Tool>])
    }

    /// Table for the lead agent
    pub fn lead_tools(&self, require_citations: bool) -> Result<ToolRegistry> {
        let subagent_tools = self.subagent_tools()?;
        let mut extra: Vec<Arc<dyn Tool>> = vec![
            Arc::new(RunBlockingSubagentTool::new(self.factory.clone(), &subagent_tools)),
            Arc::new(ParallelAgentTool::new(self.factory.clone(), &subagent_tools)),
            Arc::new(AgentTool::new(self.factory.clone(), &subagent_tools)),
            Arc::new(CompleteTaskTool),
        ];
        if require_citations {
            extra.push(Arc::new(CitationTool::new(self.factory.clone())));
        }

        self.tools
            .filtered(|name| WEB_TOOLS.contains(&name))
            .extended(extra)
    }

    async fn research(&self, input: LeadInput, ctx: &ToolContext) -> Result<String> {
        let lead_context = ctx.child();
        let mut lead = self
            .factory
            .builder("Research Lead")
            .system_prompt(prompts::research_lead_prompt(&today()))
            .tools(self.lead_tools(input.require_citations)?)
            .model(self.factory.lead_model())
            .temperature(0.7)
            .max_rounds(Some(input.max_rounds.unwrap_or(self.factory.delegation().lead_max_rounds)))
            .context(lead_context.clone())
            .build();

        info!(query = %input.query, "Research lead started");
        let outcome = lead.run(&input.query).await;
        ctx.extend_sources(lead_context.sources());
        let response = outcome?;

        let mut result = lead_context.take_report().unwrap_or_else(|| response.text());
        let source_count = lead_context.source_count();
        if source_count > 0 {
            result.push_str(&format!("\n\n**Research Sources:** {} sources consulted", source_count));
        }

        info!(
            rounds = response.rounds,
            sources = source_count,
            stop_reason = ?response.stop_reason,
            "Research lead finished"
        );
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
struct LeadInput {
    query: String,
    max_rounds: Option<usize>,
    #[serde(default = "default_true")]
    require_citations: bool,
}

#[async_trait]
impl Tool for ResearchLeadTool {
    fn name(&self) -> &str {
        "research_lead"
    }

    fn description(&self) -> &str {
        "Conduct comprehensive research on a topic with a research lead agent. The lead analyzes the \
query, develops a strategy, delegates to multiple sub-agents for parallel information gathering and \
synthesizes the findings into a report. Use it for complex research that needs several perspectives \
or broad information gathering."
    }

    fn input_schema(&self) -> JsonValue {
        SchemaBuilder::object()
            .string("query", "The research question or topic to investigate", true)
            .integer("max_rounds", "Maximum rounds for the research process (default 50)", false)
            .boolean(
                "require_citations",
                "Whether the lead may add citations to the final report (default true)",
                false,
            )
            .build()
    }

    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult> {
        let input: LeadInput = parse_input(input)?;
        match self.research(input, ctx).await {
            Ok(report) => Ok(ToolResult::success(report)),
            Err(e) => {
                warn!(error = %e, "Research lead failed");
                Ok(ToolResult::error(format!("Error conducting research: {}", e)))
            }
        }
    }
}

/// `quick_research`: one research agent with web capabilities
pub struct QuickResearchTool {
    factory: AgentFactory,
    tools: Arc<ToolRegistry>,
}

impl QuickResearchTool {
    pub fn new(factory: AgentFactory, tools: &ToolRegistry) -> Self {
        Self {
            factory,
            tools: Arc::new(tools.filtered(|name| WEB_TOOLS.contains(&name))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuickInput {
    query: String,
}

#[async_trait]
impl Tool for QuickResearchTool {
    fn name(&self) -> &str {
        "quick_research"
    }

    fn description(&self) -> &str {
        "Conduct quick research on a straightforward topic. For simple fact-finding that does not need \
multiple perspectives; use research_lead for comprehensive research."
    }

    fn input_schema(&self) -> JsonValue {
        SchemaBuilder::object()
            .string("query", "The research question or topic", true)
            .build()
    }

    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult> {
        let input: QuickInput = parse_input(input)?;
        let context = ctx.child();

        let mut agent = self
            .factory
            .builder("Quick Researcher")
            .system_prompt(prompts::quick_research_prompt(&input.query, &today()))
            .tools(Arc::clone(&self.tools))
            .model(self.factory.subagent_model())
            .temperature(0.3)
            .max_tokens(2048)
            .max_rounds(Some(10))
            .context(context.clone())
            .build();

        let outcome = agent
            .run(format!("Research and provide information about: {}", input.query))
            .await;
        ctx.extend_sources(context.sources());

        match outcome {
            Ok(response) => Ok(ToolResult::success(response.text())),
            Err(e) => {
                warn!(error = %e, "Quick research failed");
                Ok(ToolResult::error(format!("Error conducting quick research: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{registry, respond, tool_use, FnClient};
    use crate::llm::{ContentBlock, MessagesRequest};
    use crate::tool::Source;

    fn tool_names(request: &MessagesRequest) -> Vec<String> {
        request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_complete_task_report() {
        let ctx = ToolContext::new();
        ctx.add_source(Source::new("https://a.example", "Alpha", "web_fetch"));
        ctx.add_source(Source::new("https://b.example", "", "web_search"));

        let result = CompleteTaskTool
            .execute(json!({"result": "Body text"}), &ctx)
            .await
            .unwrap();

        let report = result.output;
        assert!(report.starts_with("# Research Report\n\n*Generated: "));
        assert!(report.contains("\nBody text\n"));
        assert!(report.contains("## Sources\n\n1. [Alpha](https://a.example)\n   - Tool: web_fetch\n   - Accessed: "));
        assert!(report.contains("2. [Untitled](https://b.example)"));
        assert_eq!(ctx.take_report(), Some(report));
    }

    #[tokio::test]
    async fn test_complete_task_without_sources() {
        let ctx = ToolContext::new();
        ctx.add_source(Source::new("https://a.example", "Alpha", "web_fetch"));

        let result = CompleteTaskTool
            .execute(json!({"result": "Body", "include_sources": false}), &ctx)
            .await
            .unwrap();
        assert!(!result.output.contains("## Sources"));
    }

    #[test]
    fn test_extract_cited() {
        assert_eq!(
            extract_cited("thinking...<exact_text_with_citation>Cited [1]</exact_text_with_citation>"),
            Some("Cited [1]")
        );
        assert_eq!(extract_cited("<exact_text_with_citation>unterminated"), None);
        assert_eq!(extract_cited("no tags"), None);
    }

    #[tokio::test]
    async fn test_citations_fall_back_to_input() {
        let client = FnClient::new(|request| {
            assert_eq!(request.temperature, Some(0.3));
            assert_eq!(request.max_tokens, 8000);
            assert!(request.tools.is_none());
            Ok(respond(vec![ContentBlock::text("I could not do it")]))
        });
        let tool = CitationTool::new(AgentFactory::new(client, Default::default()));

        let result = tool
            .execute(json!({"text": "Original report", "sources": []}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(result.output, "Original report");
    }

    #[tokio::test]
    async fn test_citations_extracted() {
        let client = FnClient::new(|_| {
            Ok(respond(vec![ContentBlock::text(
                "Done.\n<exact_text_with_citation>Report [1]</exact_text_with_citation>",
            )]))
        });
        let tool = CitationTool::new(AgentFactory::new(client, Default::default()));

        let result = tool
            .execute(json!({"text": "Report", "sources": [{"url": "https://x"}]}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(result.output, "Report [1]");
    }

    #[test]
    fn test_lead_table_has_no_cycle() {
        let client = FnClient::new(|_| Ok(respond(vec![])));
        let parent = registry(&["web_search", "web_fetch", "file_read", "research_lead", "quick_research"]);
        let tool = ResearchLeadTool::new(AgentFactory::new(client, Default::default()), &parent);

        let lead = tool.lead_tools(true).unwrap();
        assert_eq!(
            lead.tool_names(),
            vec![
                "web_search",
                "web_fetch",
                "run_blocking_subagent",
                "run_parallel_agents",
                "agent",
                "complete_task",
                "add_citations"
            ]
        );

        let sub = tool.subagent_tools().unwrap();
        assert!(!sub.contains("research_lead"));
        assert!(!sub.contains("quick_research"));
        assert!(sub.contains("complete_task"));
        assert!(sub.contains("file_read"));

        assert!(!tool.lead_tools(false).unwrap().contains("add_citations"));
    }

    #[tokio::test]
    async fn test_research_lead_end_to_end() {
        // lead: delegate once, then submit; sub-agent: search, then answer
        let client = FnClient::new(|request| {
            let tools = tool_names(request);
            let turns = request.messages.len();
            if tools.iter().any(|t| t == "run_blocking_subagent") {
                assert_eq!(request.temperature, Some(0.7));
                match turns {
                    1 => Ok(respond(vec![tool_use(
                        "lead1",
                        "run_blocking_subagent",
                        json!({"prompt": "find the facts", "name": "scout"}),
                    )])),
                    3 => Ok(respond(vec![tool_use(
                        "lead2",
                        "complete_task",
                        json!({"result": "Final synthesis"}),
                    )])),
                    _ => Ok(respond(vec![ContentBlock::text("Submitted.")])),
                }
            } else {
                assert!(!tools.iter().any(|t| t == "research_lead"));
                match turns {
                    1 => Ok(respond(vec![tool_use("sub1", "search", json!({}))])),
                    _ => Ok(respond(vec![ContentBlock::text("Facts found")])),
                }
            }
        });
        let parent_tools = registry(&["search", "research_lead"]);
        let tool = ResearchLeadTool::new(AgentFactory::new(client, Default::default()), &parent_tools);
        let ctx = ToolContext::new();

        let result = tool.execute(json!({"query": "what happened?"}), &ctx).await.unwrap();

        assert!(!result.is_error, "{}", result.output);
        assert!(result.output.starts_with("# Research Report"));
        assert!(result.output.contains("Final synthesis"));
        assert!(result.output.contains("## Sources"));
        assert!(result.output.ends_with("**Research Sources:** 1 sources consulted"));
        assert_eq!(ctx.source_count(), 1);
        // the lead's report does not leak into the caller's slot
        assert!(ctx.take_report().is_none());
    }

    #[tokio::test]
    async fn test_research_lead_error() {
        let client = FnClient::new(|_| Err(crate::Error::Provider("down".to_string())));
        let tool = ResearchLeadTool::new(AgentFactory::new(client, Default::default()), &ToolRegistry::new());

        let result = tool.execute(json!({"query": "q"}), &ToolContext::new()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.output, "Error conducting research: Provider error: down");
    }

    #[tokio::test]
    async fn test_quick_research() {
        let client = FnClient::new(|request| {
            assert_eq!(tool_names(request), vec!["web_search"]);
            assert_eq!(request.max_tokens, 2048);
            assert!(request.system.as_deref().unwrap().contains("finding information about: rust"));
            Ok(respond(vec![ContentBlock::text("Rust is a language.")]))
        });
        let tool = QuickResearchTool::new(
            AgentFactory::new(client, Default::default()),
            &registry(&["web_search", "file_write"]),
        );

        let result = tool.execute(json!({"query": "rust"}), &ToolContext::new()).await.unwrap();
        assert_eq!(result.output, "Rust is a language.");

        let failing = QuickResearchTool::new(
            AgentFactory::new(FnClient::new(|_| Err(crate::Error::Provider("x".into()))), Default::default()),
            &ToolRegistry::new(),
        );
        let result = failing.execute(json!({"query": "rust"}), &ToolContext::new()).await.unwrap();
        assert!(result.output.starts_with("Error conducting quick research: "));
    }
}
