//! Several replacements in one file, applied all-or-nothing

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

#[derive(Debug, Default)]
pub struct MultiEditTool;

#[derive(Debug, Deserialize)]
struct Edit {
    old_text: String,
    new_text: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Debug, Deserialize)]
struct Input {
    path: String,
    edits: Vec<Edit>,
}

/// Apply edits in order, each to the result of the previous one.
/// Returns the new content and one summary line per edit.
fn apply(content: &str, edits: &[Edit]) -> std::result::Result<(String, Vec<String>), String> {
    if edits.is_empty() {
        return Err("No edits provided".to_string());
    }

    let mut content = content.to_string();
    let mut summary = Vec::with_capacity(edits.len());
    for (i, edit) in edits.iter().enumerate() {
        let n = i + 1;
        if edit.old_text.is_empty() {
            return Err(format!("Edit {} has empty old_text", n));
        }
        if edit.old_text == edit.new_text {
            return Err(format!("Edit {} has identical old_text and new_text", n));
        }

        let count = content.matches(&edit.old_text).count();
        match count {
            0 => return Err(format!("Edit {} cannot be applied - text not found: {:?}", n, edit.old_text)),
            1 => content = content.replacen(&edit.old_text, &edit.new_text, 1),
            _ if edit.replace_all => content = content.replace(&edit.old_text, &edit.new_text),
            _ => {
                return Err(format!(
                    "Edit {} matches {} occurrences. Set replace_all or add context to make it unique.",
                    n, count
                ));
            }
        }
        summary.push(format!("Edit {}: Replaced {} occurrence(s)", n, count));
    }
    Ok((content, summary))
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multi_edit"
    }

    fn description(&self) -> &str {
        "Make multiple text replacements in a single file atomically. Edits apply in order, each to the \
result of the previous one; if any edit cannot be applied the file is left unchanged. \
The file must have been read with file_read first."
    }

    fn input_schema(&self) -> Value {
        let edit = json!({
            "type": "object",
            "properties": {
                "old_text": {"type": "string", "description": "Text to find"},
                "new_text": {"type": "string", "description": "Text to replace it with"},
                "replace_all": {"type": "boolean", "description": "Replace every occurrence (default: false)"},
            },
            "required": ["old_text", "new_text"],
        });
        SchemaBuilder::object()
            .string("path", "Path of the file to edit", true)
            .array("edits", "Edit operations, applied in order", edit, true)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        tracing::debug!(path = %input.path, edits = input.edits.len(), "Applying multiple edits");

        if !ctx.has_read(&input.path) {
            return Ok(ToolResult::error(format!(
                "File '{}' has not been read in this session. Read it with file_read before editing it.",
                input.path
            )));
        }

        let content = match fs::read_to_string(&input.path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::error(format!("Failed to read file '{}': {}", input.path, e)));
            }
        };

        let (updated, summary) = match apply(&content, &input.edits) {
            Ok(applied) => applied,
            Err(e) => return Ok(ToolResult::error(format!("{}. No changes were made.", e))),
        };

        if let Err(e) = fs::write(&input.path, updated).await {
            return Ok(ToolResult::error(format!("Failed to write file '{}': {}", input.path, e)));
        }

        Ok(ToolResult::success(format!(
            "Successfully applied {} edits to '{}':\n{}",
            summary.len(),
            input.path,
            summary.join("\n")
        )))
    }
}
