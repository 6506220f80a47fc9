//! End-to-end behavior of the history, dispatcher and agent loop against a
//! scripted model client (no network).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use orca_core::agents::{AgentFactory, ParallelAgentTool, StopReason};
use orca_core::history::{estimate_tokens, MessageHistory, TRUNCATION_NOTICE};
use orca_core::llm::{MessagesRequest, MessagesResponse, ToolCall};
use orca_core::tool::{ExecutionMode, MetricsRegistry, ToolDispatcher};
use orca_core::{
    Agent, ContentBlock, Error, ModelClient, ModelConfig, Result, Role, Tool, ToolContext,
    ToolRegistry, ToolResult, Usage,
};

type Responder = dyn Fn(&MessagesRequest) -> Result<MessagesResponse> + Send + Sync;

/// Model client answering with a closure and recording every request
struct ScriptedClient {
    respond: Box<Responder>,
    requests: Mutex<Vec<MessagesRequest>>,
}

impl ScriptedClient {
    fn new(
        respond: impl Fn(&MessagesRequest) -> Result<MessagesResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<MessagesRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn create_message(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let response = (self.respond)(&request);
        self.requests.lock().unwrap().push(request);
        response
    }
}

fn response(content: Vec<ContentBlock>, input: u64, output: u64) -> MessagesResponse {
    MessagesResponse {
        id: "msg_scripted".to_string(),
        model: "scripted".to_string(),
        content,
        stop_reason: None,
        usage: Usage {
            input_tokens: input,
            output_tokens: output,
            ..Default::default()
        },
    }
}

fn tool_use(id: &str, name: &str, input: JsonValue) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

fn call(id: &str, name: &str, input: JsonValue) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

/// Sleeps for `ms` then answers with `value`; fails when `fail` is set
struct Sleeper;

#[async_trait]
impl Tool for Sleeper {
    fn name(&self) -> &str {
        "sleeper"
    }

    fn description(&self) -> &str {
        "Sleep, then echo a value"
    }

    fn input_schema(&self) -> JsonValue {
        json!({"type": "object", "properties": {"ms": {"type": "integer"}, "value": {"type": "string"}}})
    }

    async fn execute(&self, input: JsonValue, _ctx: &ToolContext) -> Result<ToolResult> {
        tokio::time::sleep(Duration::from_millis(input["ms"].as_u64().unwrap_or(0))).await;
        if input["fail"].as_bool().unwrap_or(false) {
            return Err(Error::ToolExecution("sleeper failed".to_string()));
        }
        Ok(ToolResult::success(input["value"].as_str().unwrap_or_default()))
    }
}

fn sleeper_registry() -> ToolRegistry {
    ToolRegistry::from_tools([Arc::new(Sleeper) as Arc<dyn Tool>]).unwrap()
}

/// Deterministic pseudo-random sequence
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

#[test]
fn single_user_turn_formats_as_one_message() {
    let mut history = MessageHistory::new("system", 1000, false);
    history.append(Role::User, "hi", None);

    let formatted = history.format_for_api();
    assert_eq!(formatted.len(), 1);
    assert_eq!(
        serde_json::to_value(&formatted[0]).unwrap(),
        json!({"role": "user", "content": [{"type": "text", "text": "hi"}]})
    );
}

#[test]
fn formatted_tool_calls_are_always_answered() {
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);

    for _ in 0..200 {
        let mut history = MessageHistory::new("", 10_000, rng.below(2) == 0);
        let mut next_id = 0;
        for _ in 0..rng.below(12) {
            match rng.below(4) {
                0 => history.append(Role::User, "question", None),
                1 => {
                    let calls: Vec<ContentBlock> = (0..=rng.below(3))
                        .map(|_| {
                            next_id += 1;
                            tool_use(&format!("t{}", next_id), "x", json!({}))
                        })
                        .collect();
                    history.append(Role::Assistant, calls, None);
                }
                2 => {
                    // answer a random, possibly unknown, id
                    let id = format!("t{}", rng.below(next_id + 2));
                    history.append(Role::User, vec![ContentBlock::tool_result(id, "r", false)], None);
                }
                _ => history.append(Role::Assistant, "answer", None),
            }
        }

        let formatted = history.format_for_api();
        for (i, message) in formatted.iter().enumerate() {
            let call_ids: Vec<String> = message
                .content
                .iter()
                .filter_map(|c| match &c.block {
                    ContentBlock::ToolUse { id, .. } => Some(id.clone()),
                    _ => None,
                })
                .collect();
            if call_ids.is_empty() {
                continue;
            }
            assert_eq!(message.role, Role::Assistant);
            let next = formatted.get(i + 1).expect("tool calls must be followed by results");
            for id in call_ids {
                assert!(
                    next.content.iter().any(|c| matches!(
                        &c.block,
                        ContentBlock::ToolResult { tool_use_id, .. } if *tool_use_id == id
                    )),
                    "call {} has no result",
                    id
                );
            }
        }
    }
}

#[test]
fn truncation_respects_budget_or_keeps_one_pair() {
    let mut rng = XorShift(42);

    for _ in 0..100 {
        let budget = 100 + rng.below(400);
        let mut history = MessageHistory::new("", budget, false);
        let mut reported = 0;
        for _ in 0..=rng.below(15) {
            history.append(Role::User, "question", None);
            reported += 10 + rng.below(150);
            let usage = Usage {
                input_tokens: reported,
                output_tokens: 1 + rng.below(80),
                ..Default::default()
            };
            history.append(Role::Assistant, "answer", Some(&usage));
            reported += usage.output_tokens;
        }

        let before = history.len();
        let removed = history.truncate();

        assert!(history.total_tokens() <= budget || history.turn_costs().is_empty());
        assert_eq!(removed % 2, 0);
        assert_eq!(history.len(), before - removed);
        if removed > 0 && !history.is_empty() && !history.turn_costs().is_empty() {
            assert_eq!(history.messages()[0].text_content(), TRUNCATION_NOTICE);
        }
    }
}

#[test]
fn truncation_removes_oldest_pairs_first() {
    let mut history = MessageHistory::new("", 150, false);
    let mut reported = 0;
    for i in 0..6 {
        history.append(Role::User, format!("question {}", i), None);
        reported += 40;
        let usage = Usage {
            input_tokens: reported,
            output_tokens: 10,
            ..Default::default()
        };
        history.append(Role::Assistant, format!("answer {}", i), Some(&usage));
        reported += 10;
    }

    history.truncate();

    let texts: Vec<String> = history.messages().iter().map(|m| m.text_content()).collect();
    assert_eq!(texts.first().map(String::as_str), Some(TRUNCATION_NOTICE));
    assert_eq!(texts.last().map(String::as_str), Some("answer 5"));
    // the survivors are the newest answers, still in order
    let answers: Vec<&String> = texts.iter().filter(|t| t.starts_with("answer")).collect();
    let expected: Vec<String> = (6 - answers.len()..6).map(|i| format!("answer {}", i)).collect();
    assert_eq!(answers, expected.iter().collect::<Vec<_>>());
}

#[tokio::test]
async fn dispatch_preserves_request_order() {
    let registry = sleeper_registry();
    let calls: Vec<ToolCall> = [40u64, 5, 25, 0, 15]
        .iter()
        .enumerate()
        .map(|(i, ms)| call(&format!("c{}", i), "sleeper", json!({"ms": ms, "value": format!("v{}", i)})))
        .collect();

    for mode in [ExecutionMode::Parallel, ExecutionMode::Sequential] {
        let results = ToolDispatcher::new(&registry)
            .mode(mode)
            .dispatch(&calls, &ToolContext::new())
            .await;

        assert_eq!(results.len(), calls.len());
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.tool_use_id, format!("c{}", i));
            assert_eq!(result.content, format!("v{}", i));
        }
    }
}

#[tokio::test]
async fn one_failing_call_is_isolated() {
    let registry = sleeper_registry();
    let calls = vec![
        call("a", "sleeper", json!({"ms": 5, "value": "a"})),
        call("b", "sleeper", json!({"ms": 1, "fail": true})),
        call("c", "sleeper", json!({"ms": 3, "value": "c"})),
        call("d", "sleeper", json!({"value": "d"})),
    ];

    let results = ToolDispatcher::new(&registry).dispatch(&calls, &ToolContext::new()).await;

    assert_eq!(results.len(), 4);
    assert_eq!(results.iter().filter(|r| r.is_error).count(), 1);
    assert!(results[1].is_error);
    assert!(results[1].content.contains("sleeper failed"));
}

#[tokio::test]
async fn unknown_tool_becomes_error_result() {
    let registry = sleeper_registry();
    let results = ToolDispatcher::new(&registry)
        .dispatch(&[call("x", "frobnicate", json!({}))], &ToolContext::new())
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_error);
    assert!(results[0].content.contains("frobnicate"));
}

#[tokio::test]
async fn metrics_count_every_invocation() {
    let registry = sleeper_registry();
    let metrics = MetricsRegistry::new();
    let ctx = ToolContext::new();
    let mut expected = 0;

    for (batch, mode) in [ExecutionMode::Parallel, ExecutionMode::Sequential, ExecutionMode::Parallel]
        .into_iter()
        .enumerate()
    {
        let calls: Vec<ToolCall> = (0..=batch)
            .map(|i| call(&format!("{}-{}", batch, i), "sleeper", json!({"value": "v", "fail": i == 1})))
            .collect();
        ToolDispatcher::new(&registry)
            .with_metrics(&metrics)
            .mode(mode)
            .dispatch(&calls, &ctx)
            .await;

        expected += calls.len() as u64;
        let snapshot = metrics.get("sleeper").unwrap();
        assert_eq!(snapshot.call_count, expected);
        assert_eq!(snapshot.call_count, snapshot.success_count + snapshot.failure_count);
    }
}

#[tokio::test]
async fn round_budget_stops_before_extra_batch() {
    let client = ScriptedClient::new(|request| {
        let round = request.messages.len() / 2 + 1;
        Ok(response(
            vec![tool_use(&format!("call{}", round), "sleeper", json!({"value": "again"}))],
            10,
            5,
        ))
    });
    let mut agent = Agent::builder("looper", client.clone())
        .tools(sleeper_registry())
        .max_rounds(Some(3))
        .build();

    let result = agent.run("keep going").await.unwrap();

    assert_eq!(result.stop_reason, StopReason::MaxRounds);
    assert_eq!(result.rounds, 4);
    assert!(result.text().contains("maximum number of rounds (3)"));
    assert_eq!(client.requests().len(), 4);
    assert_eq!(agent.tool_metrics().get("sleeper").unwrap().call_count, 3);
}

#[tokio::test]
async fn provider_error_reaches_caller() {
    let client = ScriptedClient::new(|_| Err(Error::Provider("overloaded".to_string())));
    let mut agent = Agent::builder("fragile", client).build();

    let err = agent.run("hello").await.unwrap_err();
    assert!(matches!(err, Error::Provider(_)));
}

#[tokio::test]
async fn saved_conversation_resumes_in_new_agent() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("sessions").join("chat.json");
    let client = ScriptedClient::new(|_| Ok(response(vec![ContentBlock::text("noted")], 40, 10)));

    let mut first = Agent::builder("first", client.clone())
        .system_prompt("Remember things.")
        .build();
    first.run("my name is Ada").await.unwrap();
    first.save(&path).await.unwrap();

    let mut second = Agent::builder("second", client.clone()).build();
    second.load(&path).await.unwrap();
    assert_eq!(second.system_prompt(), "Remember things.");
    assert_eq!(second.history().messages(), first.history().messages());
    assert_eq!(second.history().total_tokens(), first.history().total_tokens());

    second.run("what is my name?").await.unwrap();
    let resumed = client.requests().pop().unwrap();
    assert_eq!(resumed.messages.len(), 3);
    assert_eq!(resumed.messages[0].content[0].block, ContentBlock::text("my name is Ada"));
}

#[tokio::test]
async fn long_conversation_is_truncated() {
    let client = ScriptedClient::new(|request| {
        // report the size of what was sent, the way the provider does
        let sent: u64 = estimate_tokens(request.system.as_deref().unwrap_or_default())
            + request
                .messages
                .iter()
                .map(|m| estimate_tokens(&serde_json::to_string(m).unwrap()))
                .sum::<u64>();
        Ok(response(vec![ContentBlock::text("x".repeat(200))], sent, 50))
    });
    let model = ModelConfig {
        context_window_tokens: 200,
        ..Default::default()
    };
    let mut agent = Agent::builder("chatty", client.clone())
        .model_config(model)
        .enable_caching(false)
        .build();

    for i in 0..10 {
        agent.run(format!("question {}", i)).await.unwrap();
    }

    let requests = client.requests();
    let last = requests.last().unwrap();
    assert!(last.messages.len() < 20);
    assert_eq!(last.messages[0].content[0].block, ContentBlock::text(TRUNCATION_NOTICE));
}

#[tokio::test]
async fn fan_out_reports_success_and_failure() {
    let client = ScriptedClient::new(|request| {
        let system = request.system.as_deref().unwrap_or_default();
        if system.contains("<task>B</task>") {
            Err(Error::Provider("B exploded".to_string()))
        } else {
            Ok(response(vec![ContentBlock::text("A findings")], 10, 5))
        }
    });
    let factory = AgentFactory::new(client, ModelConfig::default());
    let tool = ParallelAgentTool::new(factory, &ToolRegistry::new());

    let result = tool
        .execute(
            json!({"agents": [{"task": "A", "name": "alpha"}, {"task": "B", "name": "beta"}]}),
            &ToolContext::new(),
        )
        .await
        .unwrap();

    assert!(!result.is_error);
    let alpha = result.output.find("=== alpha ===").unwrap();
    let beta = result.output.find("=== Error in beta ===").unwrap();
    assert!(alpha < beta);
    assert!(result.output.contains("A findings"));
    assert!(result.output.contains("B exploded"));
}
