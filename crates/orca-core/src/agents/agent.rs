//! Agent execution loop
//!
//! One [`Agent`] owns one conversation: a system prompt, an immutable tool
//! table, a [`MessageHistory`] and per-tool metrics. [`Agent::run`] drives
//! the request/dispatch cycle until the model answers without tool calls or
//! the round budget is exhausted.

use std::path::Path;
use std::sync::Arc;

use chrono::{Local, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::Result;
use crate::history::{ConversationSnapshot, MessageHistory};
use crate::llm::{
    text_of, ApiContent, ApiMessage, ContentBlock, MessagesRequest, MessagesRequestBuilder, ModelClient, Role,
    Usage,
};
use crate::tool::{ExecutionMode, MetricsRegistry, ToolContext, ToolDispatcher, ToolInvocationResult, ToolRegistry};

use super::prompts;

/// Why a run returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting tools
    EndTurn,
    /// The round budget ran out while the model still wanted tools
    MaxRounds,
}

/// Final answer of one [`Agent::run`]
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub content: Vec<ContentBlock>,
    /// Usage summed over every request of the run
    pub usage: Usage,
    pub stop_reason: StopReason,
    /// Tool-requesting rounds, including one stopped by the budget
    pub rounds: usize,
}

impl AgentResponse {
    /// Text blocks joined with newlines
    pub fn text(&self) -> String {
        text_of(&self.content)
    }
}

/// Lifetime counters of an agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStats {
    pub runs: usize,
    pub rounds: usize,
    pub tool_calls: usize,
    pub usage: Usage,
    pub messages: usize,
    pub total_tokens: u64,
    pub context_window_tokens: u64,
}

/// Conversational agent driving the model/tool loop
pub struct Agent {
    name: String,
    client: Arc<dyn ModelClient>,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    model_config: ModelConfig,
    history: MessageHistory,
    max_rounds: Option<usize>,
    execution_mode: ExecutionMode,
    metrics: MetricsRegistry,
    context: ToolContext,
    extra_params: serde_json::Map<String, JsonValue>,
    stats: AgentStats,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model_config.model)
            .field("tools", &self.tools.tool_names())
            .field("max_rounds", &self.max_rounds)
            .field("messages", &self.history.len())
            .finish()
    }
}

impl Agent {
    /// Start building an agent
    pub fn builder(name: impl Into<String>, client: Arc<dyn ModelClient>) -> AgentBuilder {
        AgentBuilder::new(name, client)
    }

    /// Process one user input to completion.
    ///
    /// Provider failures propagate; tool failures are folded into the
    /// conversation as error results.
    pub async fn run(&mut self, input: impl Into<String>) -> Result<AgentResponse> {
        let input = input.into();
        info!(agent = %self.name, input_len = input.len(), "Starting run");

        self.stats.runs += 1;
        self.history.append(Role::User, input, None);
        self.run_loop().await
    }

    async fn run_loop(&mut self) -> Result<AgentResponse> {
        let mut rounds = 0;
        let mut usage = Usage::default();

        loop {
            self.history.truncate();

            let request = self.build_request();
            debug!(
                agent = %self.name,
                round = rounds + 1,
                messages = request.messages.len(),
                "Requesting model response"
            );
            let response = self.client.create_message(request).await?;

            usage.add(&response.usage);
            self.stats.usage.add(&response.usage);
            self.history
                .append(Role::Assistant, response.content.clone(), Some(&response.usage));

            let calls = response.tool_calls();
            if calls.is_empty() {
                info!(agent = %self.name, rounds, "Run finished");
                return Ok(AgentResponse {
                    content: response.content,
                    usage,
                    stop_reason: StopReason::EndTurn,
                    rounds,
                });
            }

            rounds += 1;
            self.stats.rounds += 1;

            if let Some(limit) = self.max_rounds.filter(|limit| rounds > *limit) {
                warn!(agent = %self.name, limit, pending = calls.len(), "Reached max rounds limit");
                let skipped: Vec<ContentBlock> = calls
                    .iter()
                    .map(|call| {
                        ContentBlock::tool_result(
                            call.id.clone(),
                            format!("Tool call not executed: round limit of {} reached", limit),
                            true,
                        )
                    })
                    .collect();
                self.history.append(Role::User, skipped, None);

                return Ok(AgentResponse {
                    content: vec![ContentBlock::text(format!(
                        "I've reached my maximum number of rounds ({}). Here's what I've accomplished so far.",
                        limit
                    ))],
                    usage,
                    stop_reason: StopReason::MaxRounds,
                    rounds,
                });
            }

            debug!(
                agent = %self.name,
                round = rounds,
                tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "Dispatching tool calls"
            );
            let results = ToolDispatcher::new(&self.tools)
                .with_metrics(&self.metrics)
                .mode(self.execution_mode)
                .dispatch(&calls, &self.context)
                .await;

            self.stats.tool_calls += results.len();
            let blocks: Vec<ContentBlock> = results.into_iter().map(ToolInvocationResult::into_block).collect();
            self.history.append(Role::User, blocks, None);
        }
    }

    fn build_request(&self) -> MessagesRequest {
        MessagesRequestBuilder::new(&self.model_config.model)
            .max_tokens(self.model_config.max_tokens)
            .temperature(self.model_config.temperature)
            .system(stamped_system_prompt(&self.system_prompt))
            .messages(self.history.format_for_api())
            .tools(self.tools.definitions())
            .extra(self.extra_params.clone())
            .build()
    }

    /// Ask the provider for the exact system prompt cost
    pub async fn calibrate(&mut self) {
        self.history
            .calibrate(self.client.as_ref(), &self.model_config.model, &self.system_prompt)
            .await;
    }

    /// One tool-less request summarizing the conversation so far
    pub async fn summarize(&self) -> Result<String> {
        if self.history.is_empty() {
            return Ok("No conversation to summarize".to_string());
        }

        let mut messages = self.history.format_for_api();
        let request_block = ApiContent::from(ContentBlock::text(prompts::SUMMARY_REQUEST));
        match messages.last_mut() {
            Some(last) if last.role == Role::User => last.content.push(request_block),
            _ => messages.push(ApiMessage {
                role: Role::User,
                content: vec![request_block],
            }),
        }

        let request = MessagesRequestBuilder::new(&self.model_config.model)
            .max_tokens(self.model_config.max_tokens)
            .system(prompts::SUMMARY_SYSTEM_PROMPT)
            .messages(messages)
            .build();

        let summary = self.client.create_message(request).await?.text();
        if summary.trim().is_empty() {
            Ok("Could not generate summary".to_string())
        } else {
            Ok(summary)
        }
    }

    /// Drop the last exchange and run its input again.
    ///
    /// Returns `None` when there is no user input to retry.
    pub async fn retry_last(&mut self) -> Result<Option<AgentResponse>> {
        match self.history.pop_last_exchange() {
            Some(input) => self.run(input).await.map(Some),
            None => Ok(None),
        }
    }

    /// Forget the conversation; metrics and counters are kept
    pub fn clear(&mut self) {
        self.history.clear();
        info!(agent = %self.name, "Cleared history");
    }

    /// Capture the conversation for persistence
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            agent_name: self.name.clone(),
            model: self.model_config.model.clone(),
            timestamp: Utc::now(),
            total_tokens: self.history.total_tokens(),
            messages: self.history.messages().to_vec(),
            system_prompt: self.system_prompt.clone(),
            config: self.model_config.clone(),
        }
    }

    /// Replace the conversation with a snapshot's
    pub fn restore(&mut self, snapshot: ConversationSnapshot) {
        self.system_prompt = snapshot.system_prompt;
        self.model_config = snapshot.config;
        self.history = MessageHistory::new(
            &self.system_prompt,
            self.model_config.context_window_tokens,
            self.history.caching_enabled(),
        );
        self.history.restore(snapshot.messages, snapshot.total_tokens);
        info!(agent = %self.name, messages = self.history.len(), "Restored conversation");
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.snapshot().save(path).await
    }

    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.restore(ConversationSnapshot::load(path).await?);
        Ok(())
    }

    pub async fn export_markdown(&self, path: impl AsRef<Path>) -> Result<()> {
        self.snapshot().export_markdown(path).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = system_prompt.into();
        self.history.set_system_prompt(&self.system_prompt);
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model_config.model = model.into();
    }

    pub fn max_rounds(&self) -> Option<usize> {
        self.max_rounds
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn tool_metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            messages: self.history.len(),
            total_tokens: self.history.total_tokens(),
            context_window_tokens: self.history.context_window_tokens(),
            ..self.stats.clone()
        }
    }
}

/// System prompt with the current local time appended
pub fn stamped_system_prompt(base: &str) -> String {
    format!(
        "{}\n\nCurrent date and time: {}",
        base,
        Local::now().format("%A, %B %d, %Y at %I:%M %p")
    )
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    name: String,
    client: Arc<dyn ModelClient>,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    model_config: ModelConfig,
    max_rounds: Option<usize>,
    enable_caching: bool,
    execution_mode: ExecutionMode,
    context: Option<ToolContext>,
    extra_params: serde_json::Map<String, JsonValue>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, client: Arc<dyn ModelClient>) -> Self {
        Self {
            name: name.into(),
            client,
            system_prompt: String::new(),
            tools: Arc::new(ToolRegistry::new()),
            model_config: ModelConfig::default(),
            max_rounds: None,
            enable_caching: true,
            execution_mode: ExecutionMode::Parallel,
            context: None,
            extra_params: serde_json::Map::new(),
        }
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn tools(mut self, tools: impl Into<Arc<ToolRegistry>>) -> Self {
        self.tools = tools.into();
        self
    }

    pub fn model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model_config.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.model_config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.model_config.max_tokens = max_tokens;
        self
    }

    /// Round budget; `None` means unbounded
    pub fn max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn enable_caching(mut self, enable_caching: bool) -> Self {
        self.enable_caching = enable_caching;
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Session state shared with tools (a fresh one by default)
    pub fn context(mut self, context: ToolContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Extra provider parameter merged into every request
    pub fn extra_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Agent {
        let history = MessageHistory::new(
            &self.system_prompt,
            self.model_config.context_window_tokens,
            self.enable_caching,
        );

        debug!(
            agent = %self.name,
            model = %self.model_config.model,
            tools = self.tools.len(),
            max_rounds = ?self.max_rounds,
            "Built agent"
        );

        Agent {
            name: self.name,
            client: self.client,
            system_prompt: self.system_prompt,
            tools: self.tools,
            model_config: self.model_config,
            history,
            max_rounds: self.max_rounds,
            execution_mode: self.execution_mode,
            metrics: MetricsRegistry::new(),
            context: self.context.unwrap_or_default(),
            extra_params: self.extra_params,
            stats: AgentStats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessagesResponse;
    use crate::tool::{Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    struct Scripted {
        responses: Mutex<VecDeque<MessagesResponse>>,
        requests: Mutex<Vec<MessagesRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<MessagesResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<MessagesRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        async fn create_message(&self, request: MessagesRequest) -> Result<MessagesResponse> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| crate::Error::Provider("script exhausted".to_string()))
        }
    }

    fn reply(content: Vec<ContentBlock>, input: u64, output: u64) -> MessagesResponse {
        MessagesResponse {
            id: "msg".to_string(),
            model: "test".to_string(),
            content,
            stop_reason: None,
            usage: Usage {
                input_tokens: input,
                output_tokens: output,
                ..Default::default()
            },
        }
    }

    fn call(id: &str, expression: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.to_string(),
            name: "echo".to_string(),
            input: json!({"text": expression}),
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo text"
        }
        fn input_schema(&self) -> JsonValue {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, input: JsonValue, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(ToolResult::success(input["text"].as_str().unwrap_or_default()))
        }
    }

    fn agent(client: Arc<Scripted>, max_rounds: Option<usize>) -> Agent {
        let tools = ToolRegistry::from_tools([Arc::new(Echo) as Arc<dyn Tool>]).unwrap();
        Agent::builder("tester", client)
            .system_prompt("You are a test agent.")
            .tools(tools)
            .max_rounds(max_rounds)
            .enable_caching(false)
            .build()
    }

    #[tokio::test]
    async fn test_plain_answer() {
        let client = Scripted::new(vec![reply(vec![ContentBlock::text("hello")], 10, 3)]);
        let mut agent = agent(client.clone(), None);

        let response = agent.run("hi").await.unwrap();
        assert_eq!(response.text(), "hello");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.rounds, 0);
        assert_eq!(agent.history().len(), 2);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let system = requests[0].system.as_deref().unwrap();
        assert!(system.starts_with("You are a test agent.\n\nCurrent date and time: "));
        assert_eq!(requests[0].tools.as_ref().unwrap()[0].name, "echo");
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let client = Scripted::new(vec![
            reply(vec![ContentBlock::text("checking"), call("a", "one"), call("b", "two")], 10, 5),
            reply(vec![ContentBlock::text("done")], 30, 2),
        ]);
        let mut agent = agent(client.clone(), None);

        let response = agent.run("go").await.unwrap();
        assert_eq!(response.text(), "done");
        assert_eq!(response.rounds, 1);
        assert_eq!(response.usage.input_tokens, 40);

        // results come back as one user turn in call order
        let results = &agent.history().messages()[2];
        assert_eq!(results.role, Role::User);
        assert_eq!(results.tool_result_ids(), vec!["a", "b"]);
        assert_eq!(agent.tool_metrics().get("echo").unwrap().call_count, 2);
        assert_eq!(agent.stats().tool_calls, 2);

        let second = &client.requests()[1];
        assert_eq!(second.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_round_budget() {
        let client = Scripted::new(vec![
            reply(vec![call("1", "x")], 10, 1),
            reply(vec![call("2", "x")], 20, 1),
            reply(vec![call("3", "x")], 30, 1),
        ]);
        let mut agent = agent(client.clone(), Some(2));

        let response = agent.run("loop forever").await.unwrap();
        assert_eq!(response.stop_reason, StopReason::MaxRounds);
        assert_eq!(response.rounds, 3);
        assert_eq!(
            response.text(),
            "I've reached my maximum number of rounds (2). Here's what I've accomplished so far."
        );
        // the third batch never ran
        assert_eq!(agent.tool_metrics().total_calls(), 2);
        assert_eq!(client.requests().len(), 3);

        let last = agent.history().messages().last().unwrap();
        assert_eq!(last.tool_result_ids(), vec!["3"]);
        assert!(matches!(
            &last.content[0],
            ContentBlock::ToolResult { is_error: true, content, .. } if content.contains("round limit of 2")
        ));
    }

    #[tokio::test]
    async fn test_input_after_budget_stop_merges() {
        let client = Scripted::new(vec![
            reply(vec![call("1", "x")], 10, 1),
            reply(vec![ContentBlock::text("ok")], 20, 1),
        ]);
        let mut agent = agent(client.clone(), Some(0));

        let stopped = agent.run("first").await.unwrap();
        assert_eq!(stopped.stop_reason, StopReason::MaxRounds);

        agent.run("second").await.unwrap();
        let turns = agent.history().messages();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[2].role, Role::User);
        assert_eq!(turns[2].tool_result_ids(), vec!["1"]);
        assert_eq!(turns[2].text_content(), "second");
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let client = Scripted::new(vec![]);
        let mut agent = agent(client, None);

        let err = agent.run("hi").await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test]
    async fn test_summarize() {
        let client = Scripted::new(vec![
            reply(vec![ContentBlock::text("hello")], 10, 3),
            reply(vec![ContentBlock::text("We said hello.")], 10, 3),
        ]);
        let mut agent = agent(client.clone(), None);
        assert_eq!(agent.summarize().await.unwrap(), "No conversation to summarize");

        agent.run("hi").await.unwrap();
        assert_eq!(agent.summarize().await.unwrap(), "We said hello.");

        let request = &client.requests()[1];
        assert!(request.tools.is_none());
        assert_eq!(request.messages.last().unwrap().role, Role::User);
        // summarizing does not touch the history
        assert_eq!(agent.history().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_last() {
        let client = Scripted::new(vec![
            reply(vec![ContentBlock::text("first try")], 10, 3),
            reply(vec![ContentBlock::text("second try")], 10, 3),
        ]);
        let mut agent = agent(client.clone(), None);
        assert!(agent.retry_last().await.unwrap().is_none());

        agent.run("question").await.unwrap();
        let retried = agent.retry_last().await.unwrap().unwrap();
        assert_eq!(retried.text(), "second try");
        assert_eq!(agent.history().len(), 2);
        assert_eq!(agent.history().messages()[0].text_content(), "question");
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let client = Scripted::new(vec![reply(vec![ContentBlock::text("hello")], 40, 3)]);
        let mut source = agent(client.clone(), None);
        source.run("hi").await.unwrap();
        let snapshot = source.snapshot();
        assert_eq!(snapshot.agent_name, "tester");
        assert_eq!(snapshot.total_tokens, 43);

        let mut target = agent(Scripted::new(vec![]), None);
        target.restore(snapshot);
        assert_eq!(target.history().messages(), source.history().messages());
        assert_eq!(target.history().total_tokens(), 43);
        assert_eq!(target.history().turn_costs().len(), 1);
    }

    #[tokio::test]
    async fn test_set_system_prompt_and_model() {
        let client = Scripted::new(vec![reply(vec![ContentBlock::text("ok")], 1, 1)]);
        let mut agent = agent(client.clone(), None);
        agent.set_system_prompt("Be terse.");
        agent.set_model("other-model");
        agent.run("hi").await.unwrap();

        let request = &client.requests()[0];
        assert_eq!(request.model, "other-model");
        assert!(request.system.as_deref().unwrap().starts_with("Be terse."));
    }

    #[test]
    fn test_stamped_prompt_format() {
        let stamped = stamped_system_prompt("base");
        let stamp = stamped.strip_prefix("base\n\nCurrent date and time: ").unwrap();
        assert!(stamp.contains(" at "));
        assert!(stamp.ends_with("AM") || stamp.ends_with("PM"));
    }
}
