//! Grep tool: in-process regular expression search over files

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value;

use crate::glob::full_pattern;

const MAX_MATCHES: usize = 200;
const MAX_LINE_CHARS: usize = 300;

/// Directories never searched when walking a tree
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

#[derive(Debug, Default)]
pub struct GrepTool;

#[derive(Debug, Deserialize)]
struct Input {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    glob: Option<String>,
    #[serde(default)]
    ignore_case: bool,
}

fn skipped(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| SKIPPED_DIRS.iter().any(|d| c.as_os_str() == *d))
}

/// Files to search: the path itself, or the files under it matching `glob`
fn candidate_files(root: &str, glob: Option<&str>) -> std::result::Result<Vec<PathBuf>, String> {
    let root_path = Path::new(root);
    if root_path.is_file() {
        return Ok(vec![root_path.to_path_buf()]);
    }
    if !root_path.exists() {
        return Err(format!("Path not found: {}", root));
    }

    let file_glob = match glob {
        Some(g) if g.contains('/') => g.to_string(),
        Some(g) => format!("**/{}", g),
        None => "**/*".to_string(),
    };
    let pattern = full_pattern(Some(root), &file_glob);

    let paths = glob::glob(&pattern).map_err(|e| format!("Invalid glob pattern: {}", e))?;
    Ok(paths
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file() && !skipped(root_path, p))
        .collect())
}

fn search(regex: &Regex, files: &[PathBuf]) -> (Vec<String>, usize) {
    let mut matches = Vec::new();
    let mut total = 0;

    for file in files {
        // binary and unreadable files are skipped
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        for (number, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                total += 1;
                if matches.len() < MAX_MATCHES {
                    let line: String = line.chars().take(MAX_LINE_CHARS).collect();
                    matches.push(format!("{}:{}:{}", file.display(), number + 1, line));
                }
            }
        }
    }
    (matches, total)
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for patterns in file contents using regular expressions. \
Returns matching lines as path:line:text."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("pattern", "The regular expression pattern to search for", true)
            .string("path", "The file or directory to search in (default: current directory)", false)
            .string("glob", "File pattern to limit search (e.g., '*.rs')", false)
            .boolean("ignore_case", "Case insensitive search (default: false)", false)
            .build()
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        let root = input.path.clone().unwrap_or_else(|| ".".to_string());

        tracing::debug!(
            pattern = %input.pattern,
            path = %root,
            glob = ?input.glob,
            ignore_case = input.ignore_case,
            "Grepping files"
        );

        let regex = match RegexBuilder::new(&input.pattern)
            .case_insensitive(input.ignore_case)
            .build()
        {
            Ok(regex) => regex,
            Err(e) => return Ok(ToolResult::error(format!("Invalid regex: {}", e))),
        };

        let glob = input.glob.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            candidate_files(&root, glob.as_deref()).map(|files| search(&regex, &files))
        })
        .await
        .map_err(|e| orca_core::Error::ToolExecution(format!("search task failed: {}", e)))?;

        match outcome {
            Ok((matches, _)) if matches.is_empty() => Ok(ToolResult::success("No matches found")),
            Ok((matches, total)) => {
                let mut output = matches.join("\n");
                if total > matches.len() {
                    output.push_str(&format!("\n\n[{} more matches not shown]", total - matches.len()));
                }
                Ok(ToolResult::success(output))
            }
            Err(e) => Ok(ToolResult::error(e)),
        }
    }
}
