//! File edit tool for exact string replacement

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;

/// Replace text in a file the session has read
#[derive(Debug, Default)]
pub struct FileEditTool;

#[derive(Debug, Deserialize)]
struct Input {
    path: String,
    old_text: String,
    new_text: String,
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "file_edit"
    }

    fn description(&self) -> &str {
        "Perform exact text replacement in a file. old_text must be unique unless replace_all is set. \
The file must have been read with file_read first."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("path", "Path of the file to edit", true)
            .string("old_text", "The text to search for (must be unique in the file)", true)
            .string("new_text", "The text to replace it with", true)
            .boolean("replace_all", "Replace all occurrences (default: false)", false)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        tracing::debug!(path = %input.path, replace_all = input.replace_all, "Editing file");

        if !ctx.has_read(&input.path) {
            return Ok(ToolResult::error(format!(
                "File '{}' has not been read in this session. Read it with file_read before editing it.",
                input.path
            )));
        }
        if input.old_text.is_empty() {
            return Ok(ToolResult::error("old_text must not be empty"));
        }

        let content = match fs::read_to_string(&input.path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Failed to read file '{}': {}",
                    input.path, e
                )));
            }
        };

        let count = content.matches(&input.old_text).count();
        if count == 0 {
            return Ok(ToolResult::error(format!(
                "Text not found in file: '{}'",
                input.old_text
            )));
        }
        if count > 1 && !input.replace_all {
            return Ok(ToolResult::error(format!(
                "Found {} occurrences of the text. Use replace_all or provide more context to make it unique.",
                count
            )));
        }

        let updated = if input.replace_all {
            content.replace(&input.old_text, &input.new_text)
        } else {
            content.replacen(&input.old_text, &input.new_text, 1)
        };

        match fs::write(&input.path, updated).await {
            Ok(()) => Ok(ToolResult::success(format!(
                "Successfully replaced {} occurrence(s) in '{}'",
                count, input.path
            ))),
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to write file '{}': {}",
                input.path, e
            ))),
        }
    }
}
