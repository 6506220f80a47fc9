//! Tool trait definition
//!
//! A tool is a named, schema-described unit of work the model can invoke.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::context::ToolContext;
use crate::llm::ToolDefinition;
use crate::{Error, Result};

/// Tool execution result
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Output string from tool execution
    pub output: String,
    /// Whether the execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// Tool trait for model tool_use
///
/// Soft failures the model should see are returned as
/// [`ToolResult::error`]. Argument problems are reported as
/// [`Error::InvalidArguments`]; any other `Err` counts as an execution
/// failure. The dispatcher turns all of them into error-flagged results.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name (unique within a registry)
    fn name(&self) -> &str;

    /// Get the tool description (shown to the model when selecting tools)
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's input parameters
    fn input_schema(&self) -> JsonValue;

    /// Execute the tool with the given input and session context
    async fn execute(&self, input: JsonValue, ctx: &ToolContext) -> Result<ToolResult>;

    /// Definition sent to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Decode tool input into a typed struct, mapping failures to argument errors.
pub fn parse_input<T: DeserializeOwned>(input: JsonValue) -> Result<T> {
    serde_json::from_value(input).map_err(Error::invalid_arguments)
}
