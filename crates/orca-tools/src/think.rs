//! Think tool: a scratchpad the model can write reasoning notes to

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct ThinkTool;

#[derive(Debug, Deserialize)]
struct Input {
    thought: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Think through a problem step by step before acting. Records the thought without \
changing anything; use it to plan multi-step work or check intermediate results."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("thought", "Your reasoning", true)
            .build()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        tracing::debug!(len = input.thought.len(), "Recorded thought");
        Ok(ToolResult::success(format!("Thought recorded: {}", input.thought)))
    }
}
