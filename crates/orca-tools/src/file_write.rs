//! File write tool
//!
//! Overwriting an existing file requires that the session read it first.

use std::path::Path;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;

/// Create or overwrite a file
#[derive(Debug, Default)]
pub struct FileWriteTool;

#[derive(Debug, Deserialize)]
struct Input {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and missing parent directories if needed. \
An existing file can only be overwritten after it has been read with file_read."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("path", "Path of the file to write", true)
            .string("content", "The content to write to the file", true)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        let path = Path::new(&input.path);

        tracing::debug!(path = %input.path, content_len = input.content.len(), "Writing file");

        if fs::try_exists(path).await.unwrap_or(false) && !ctx.has_read(path) {
            tracing::warn!(path = %input.path, "Refusing to overwrite unread file");
            return Ok(ToolResult::error(format!(
                "File '{}' already exists and has not been read in this session. \
Read it with file_read before overwriting it.",
                input.path
            )));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent).await {
                return Ok(ToolResult::error(format!(
                    "Failed to create parent directories: {}",
                    e
                )));
            }
        }

        match fs::write(path, &input.content).await {
            Ok(()) => {
                // the model now knows the full contents
                ctx.mark_read(path);
                Ok(ToolResult::success(format!(
                    "Successfully wrote {} bytes to '{}'",
                    input.content.len(),
                    input.path
                )))
            }
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to write file '{}': {}",
                input.path, e
            ))),
        }
    }
}
