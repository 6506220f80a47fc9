//! Glob tool for file pattern matching

use std::path::Path;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::Value;

const MAX_MATCHES: usize = 500;

#[derive(Debug, Default)]
pub struct GlobTool;

#[derive(Debug, Deserialize)]
struct Input {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
}

/// Join a base directory and a relative pattern
pub(crate) fn full_pattern(base: Option<&str>, pattern: &str) -> String {
    match base.filter(|b| !b.is_empty() && *b != ".") {
        Some(base) if !Path::new(pattern).is_absolute() => {
            format!("{}/{}", base.trim_end_matches('/'), pattern)
        }
        _ => pattern.to_string(),
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g., '**/*.rs')"
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("pattern", "The glob pattern to match files against (e.g., '**/*.rs')", true)
            .string("path", "The base directory to search from (default: current directory)", false)
            .build()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        let pattern = full_pattern(input.path.as_deref(), &input.pattern);

        tracing::debug!(pattern = %pattern, "Globbing files");

        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => return Ok(ToolResult::error(format!("Invalid glob pattern: {}", e))),
        };

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => matches.push(path.display().to_string()),
                Err(e) => tracing::warn!(error = %e, "Unreadable path while globbing"),
            }
        }

        if matches.is_empty() {
            return Ok(ToolResult::success("No files found matching the pattern"));
        }

        let total = matches.len();
        matches.truncate(MAX_MATCHES);
        let mut output = matches.join("\n");
        if total > MAX_MATCHES {
            output.push_str(&format!("\n\n[{} more files not shown]", total - MAX_MATCHES));
        }
        Ok(ToolResult::success(output))
    }
}
