//! File read tool

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;

/// Read a file, optionally a line range, and remember it was read
#[derive(Debug, Default)]
pub struct FileReadTool;

#[derive(Debug, Deserialize)]
struct Input {
    path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a file from the filesystem. Supports line ranges for partial reading. \
A file must be read before it can be overwritten or edited."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("path", "Path of the file to read", true)
            .integer("offset", "Line number to start reading from (1-indexed)", false)
            .integer("limit", "Maximum number of lines to read", false)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        tracing::debug!(path = %input.path, offset = ?input.offset, limit = ?input.limit, "Reading file");

        let content = match fs::read_to_string(&input.path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Failed to read file '{}': {}",
                    input.path, e
                )));
            }
        };
        ctx.mark_read(&input.path);

        let lines: Vec<&str> = content.lines().collect();
        let start = input.offset.unwrap_or(1).saturating_sub(1);
        if start >= lines.len() {
            return Ok(ToolResult::success("(empty or beyond file end)"));
        }
        let end = match input.limit {
            Some(limit) => (start + limit).min(lines.len()),
            None => lines.len(),
        };

        Ok(ToolResult::success(lines[start..end].join("\n")))
    }
}
