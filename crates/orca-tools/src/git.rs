//! Git tool: a fixed set of version-control operations
//!
//! Commands run in `path` when given, otherwise in the session shell's
//! working directory.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
pub struct GitTool;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Status,
    Diff,
    Add,
    Commit,
    Log,
    Branch,
    Checkout,
}

fn default_log_count() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
struct Input {
    operation: Operation,
    #[serde(default)]
    args: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default = "default_log_count")]
    number: u32,
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Build the git argument list, or explain what is missing
fn git_args(input: &Input) -> std::result::Result<Vec<String>, &'static str> {
    let extra: Vec<String> = input
        .args
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let with = |base: &[&str]| -> Vec<String> {
        base.iter().map(|s| s.to_string()).chain(extra.iter().cloned()).collect()
    };

    Ok(match input.operation {
        Operation::Status => with(&["status", "--short"]),
        Operation::Diff => with(&["diff"]),
        Operation::Add if extra.is_empty() => {
            return Err("Please specify files to add (use '.' for all files)");
        }
        Operation::Add => with(&["add"]),
        Operation::Commit => match input.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => vec!["commit".into(), "-m".into(), message.to_string()],
            _ => return Err("Commit message is required"),
        },
        Operation::Log => {
            let count = format!("-{}", input.number);
            with(&["log", count.as_str(), "--oneline", "--graph", "--decorate"])
        }
        Operation::Branch if extra.is_empty() => vec!["branch".into(), "-v".into()],
        Operation::Branch => with(&["branch"]),
        Operation::Checkout if extra.is_empty() => {
            return Err("Please specify branch name or file to checkout");
        }
        Operation::Checkout => with(&["checkout"]),
    })
}

#[async_trait]
impl Tool for GitTool {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Execute git commands for version control: status, diff, add, commit, log, branch, checkout."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .property(
                "operation",
                SchemaBuilder::string_enum(&["status", "diff", "add", "commit", "log", "branch", "checkout"]),
                true,
            )
            .string(
                "args",
                "Additional arguments for the git command (e.g., file paths, branch names)",
                false,
            )
            .string("message", "Commit message (required for commit)", false)
            .integer("number", "Number of log entries to show (default: 10)", false)
            .string("path", "Repository directory (default: the shell's working directory)", false)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        let args = match git_args(&input) {
            Ok(args) => args,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
        };

        let mut command = Command::new("git");
        command.args(&args).kill_on_drop(true);
        if let Some(dir) = input.path.clone().or_else(|| ctx.shell().cwd) {
            command.current_dir(dir);
        }

        tracing::debug!(args = ?args, "Running git");

        let output = match timeout(GIT_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(ToolResult::error(format!("Error executing git command: {}", e))),
            Err(_) => return Ok(ToolResult::error("Error: Git command timed out after 30 seconds")),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ToolResult::error(format!("Git error: {}", stderr.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !stdout.is_empty() {
            return Ok(ToolResult::success(stdout));
        }
        Ok(ToolResult::success(match input.operation {
            Operation::Add => format!("Successfully added files: {}", input.args.unwrap_or_default()),
            _ => format!("Command 'git {}' completed successfully", args.join(" ")),
        }))
    }
}
