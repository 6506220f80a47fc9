//! Test doubles shared by the delegation tests

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use crate::error::Result;
use crate::llm::{ContentBlock, MessagesRequest, MessagesResponse, ModelClient, Usage};
use crate::tool::{Source, Tool, ToolContext, ToolRegistry, ToolResult};

type Responder = dyn Fn(&MessagesRequest) -> Result<MessagesResponse> + Send + Sync;

/// Model client answering every request with a closure
pub struct FnClient {
    respond: Box<Responder>,
}

impl FnClient {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        respond: impl Fn(&MessagesRequest) -> Result<MessagesResponse> + Send + Sync + 'static,
    ) -> Arc<dyn ModelClient> {
        Arc::new(Self {
            respond: Box::new(respond),
        })
    }
}

#[async_trait]
impl ModelClient for FnClient {
    async fn create_message(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        (self.respond)(&request)
    }
}

pub fn respond(content: Vec<ContentBlock>) -> MessagesResponse {
    MessagesResponse {
        id: "msg_test".to_string(),
        model: "test-model".to_string(),
        content,
        stop_reason: None,
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        },
    }
}

pub fn tool_use(id: &str, name: &str, input: JsonValue) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

/// Tool whose behavior depends on its name:
/// `submit` submits a report and records a source, `search` records a
/// source, anything else answers `ok`.
struct Stub(String);

#[async_trait]
impl Tool for Stub {
    fn name(&self) -> &str {
        &self.0
    }

    fn description(&self) -> &str {
        "stub"
    }

    fn input_schema(&self) -> JsonValue {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: JsonValue, ctx: &ToolContext) -> Result<ToolResult> {
        match self.0.as_str() {
            "submit" => {
                ctx.add_source(Source::new("https://example.com/report", "Report", "submit"));
                ctx.submit_report("submitted report");
                Ok(ToolResult::success("submitted"))
            }
            "search" => {
                ctx.add_source(Source::new("https://example.com/result", "Result", "search"));
                Ok(ToolResult::success("found it"))
            }
            _ => Ok(ToolResult::success("ok")),
        }
    }
}

pub fn registry(names: &[&str]) -> ToolRegistry {
    ToolRegistry::from_tools(names.iter().map(|&n| Arc::new(Stub(n.to_string())) as Arc<dyn Tool>))
        .expect("unique stub names")
}
