//! Bash command execution tool
//!
//! Runs one shell command with a timeout and reports stdout, stderr and
//! the exit code as JSON. The working directory and exported variables
//! persist between calls of the same session: an `EXIT` trap dumps `pwd`
//! and `env -0` to a state file that seeds the next command.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder, ShellRecord, ShellSession};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 600_000;

/// Output longer than this is cut, keeping the tail
const MAX_STREAM_CHARS: usize = 30_000;

const HISTORY_PREVIEW_CHARS: usize = 500;

const STATE_FILE_VAR: &str = "ORCA_SHELL_STATE";

/// Variables bash maintains itself
const VOLATILE_VARS: &[&str] = &[STATE_FILE_VAR, "_", "SHLVL"];

#[derive(Debug, Default)]
pub struct BashTool;

#[derive(Debug, Deserialize)]
struct BashInput {
    #[serde(default)]
    command: Option<String>,
    #[serde(default = "default_timeout")]
    timeout_ms: u64,
    #[serde(default)]
    reset_session: bool,
    #[serde(default)]
    get_history: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Serialize)]
struct BashOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    cwd: Option<String>,
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let count = text.chars().count();
    if count <= MAX_STREAM_CHARS {
        return text.into_owned();
    }
    let kept: String = text.chars().skip(count - MAX_STREAM_CHARS).collect();
    format!("[... {} characters omitted ...]\n{}", count - MAX_STREAM_CHARS, kept)
}

fn session_script(command: &str) -> String {
    format!(
        "trap '{{ pwd; printf \"\\0\"; env -0; }} > \"${}\"' EXIT\n{}",
        STATE_FILE_VAR, command
    )
}

/// Parse `pwd`, a NUL, then `env -0` output
fn parse_state(bytes: &[u8]) -> Option<(PathBuf, BTreeMap<String, String>)> {
    let mut parts = bytes.split(|b| *b == 0);
    let cwd = String::from_utf8_lossy(parts.next()?).trim_end_matches('\n').to_string();
    if cwd.is_empty() {
        return None;
    }

    let env = parts
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            let (key, value) = entry.split_once('=')?;
            (!key.is_empty() && !VOLATILE_VARS.contains(&key)).then(|| (key.to_string(), value.to_string()))
        })
        .collect();

    Some((PathBuf::from(cwd), env))
}

fn render_history(session: &ShellSession) -> String {
    if session.history.is_empty() {
        return "No commands executed yet".to_string();
    }

    let cwd = session
        .cwd
        .as_ref()
        .map_or_else(|| "(process directory)".to_string(), |cwd| cwd.display().to_string());
    let mut lines = vec![
        "Command History".to_string(),
        "=".repeat(60),
        format!("Session working directory: {}", cwd),
        format!("Total commands: {}", session.history.len()),
        String::new(),
    ];

    for (i, record) in session.history.iter().enumerate() {
        lines.push(format!("{}. Command: {}", i + 1, record.command));
        let code = record.exit_code.map_or("killed".to_string(), |c| c.to_string());
        lines.push(format!("   Exit code: {}", code));
        let output: Vec<&str> = record.preview.lines().collect();
        for line in output.iter().take(3) {
            lines.push(format!("   > {}", line));
        }
        if output.len() > 3 {
            lines.push("   > ... (output truncated)".to_string());
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command with optional timeout. Use this for terminal operations like git, cargo, ls, etc. \
The working directory and exported variables persist between calls; reset_session clears them and \
get_history lists the commands run so far."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .string("command", "The command to execute", false)
            .integer(
                "timeout_ms",
                "Timeout in milliseconds (default: 120000, max: 600000)",
                false,
            )
            .boolean("reset_session", "Reset directory, environment and history before running", false)
            .boolean("get_history", "Return the command history instead of running anything", false)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: BashInput = parse_input(input)?;

        if input.get_history {
            return Ok(ToolResult::success(render_history(&ctx.shell())));
        }
        if input.reset_session {
            ctx.reset_shell();
            tracing::debug!("Shell session reset");
        }

        let command = match input.command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => command.to_string(),
            _ if input.reset_session => return Ok(ToolResult::success("Session reset successfully")),
            _ => return Ok(ToolResult::error("No command provided")),
        };

        let timeout_ms = input.timeout_ms.min(MAX_TIMEOUT_MS);
        let session = ctx.shell();
        let state_file = match NamedTempFile::new() {
            Ok(file) => file,
            Err(e) => return Ok(ToolResult::error(format!("Failed to create shell state file: {}", e))),
        };

        tracing::debug!(command = %command, timeout_ms, cwd = ?session.cwd, "Executing bash command");

        let mut process = Command::new("bash");
        process.arg("-c").arg(session_script(&command)).kill_on_drop(true);
        if let Some(cwd) = &session.cwd {
            process.current_dir(cwd);
        }
        if let Some(env) = &session.env {
            process.env_clear().envs(env);
        }
        process.env(STATE_FILE_VAR, state_file.path());

        let output = match timeout(Duration::from_millis(timeout_ms), process.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(ToolResult::error(format!("Failed to execute command: {}", e))),
            Err(_) => {
                tracing::warn!(command = %command, timeout_ms, "Command timed out");
                return Ok(ToolResult::error(format!("Command timed out after {}ms", timeout_ms)));
            }
        };

        let state = tokio::fs::read(state_file.path()).await.ok();
        let report = BashOutput {
            stdout: tail(&output.stdout),
            stderr: tail(&output.stderr),
            exit_code: output.status.code(),
            cwd: None,
        };

        let cwd = ctx.update_shell(|shell| {
            if let Some((cwd, env)) = state.as_deref().and_then(parse_state) {
                shell.cwd = Some(cwd);
                shell.env = Some(env);
            }
            shell.history.push(ShellRecord {
                command: command.clone(),
                exit_code: report.exit_code,
                preview: report.stdout.chars().take(HISTORY_PREVIEW_CHARS).collect(),
            });
            shell.cwd.as_ref().map(|cwd| cwd.display().to_string())
        });

        let text = serde_json::to_string_pretty(&BashOutput { cwd, ..report })?;
        if output.status.success() {
            Ok(ToolResult::success(text))
        } else {
            Ok(ToolResult::error(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn run(ctx: &ToolContext, input: Value) -> ToolResult {
        BashTool.execute(input, ctx).await.unwrap()
    }

    fn stdout(result: &ToolResult) -> String {
        let output: Value = serde_json::from_str(&result.output).unwrap();
        output["stdout"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_bash_echo() {
        let result = run(&ToolContext::new(), json!({"command": "echo hello"})).await;

        assert!(!result.is_error);
        let output: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(output["stdout"], "hello\n");
        assert_eq!(output["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_bash_failure() {
        let result = run(&ToolContext::new(), json!({"command": "echo oops >&2; exit 3"})).await;

        assert!(result.is_error);
        let output: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(output["stderr"], "oops\n");
        assert_eq!(output["exit_code"], 3);
    }

    #[tokio::test]
    async fn test_bash_timeout() {
        let result = run(&ToolContext::new(), json!({"command": "sleep 10", "timeout_ms": 100})).await;

        assert!(result.is_error);
        assert!(result.output.contains("timed out after 100ms"));
    }

    #[tokio::test]
    async fn test_directory_and_env_persist() {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new();

        let command = format!("cd '{}' && export ORCA_GREETING=hello", dir.path().display());
        assert!(!run(&ctx, json!({"command": command})).await.is_error);

        let pwd = stdout(&run(&ctx, json!({"command": "pwd"})).await);
        assert_eq!(
            std::fs::canonicalize(pwd.trim()).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
        assert_eq!(stdout(&run(&ctx, json!({"command": "echo $ORCA_GREETING"})).await), "hello\n");

        // another session is untouched
        let other = ToolContext::new();
        assert_eq!(stdout(&run(&other, json!({"command": "echo \"[$ORCA_GREETING]\""})).await), "[]\n");
    }

    #[tokio::test]
    async fn test_reset_session() {
        let ctx = ToolContext::new();
        run(&ctx, json!({"command": "export ORCA_MARK=1"})).await;

        let result = run(&ctx, json!({"reset_session": true})).await;
        assert_eq!(result.output, "Session reset successfully");
        assert_eq!(ctx.shell(), ShellSession::default());

        let result = run(&ctx, json!({"reset_session": true, "command": "echo \"[$ORCA_MARK]\""})).await;
        assert_eq!(stdout(&result), "[]\n");
    }

    #[tokio::test]
    async fn test_history() {
        let ctx = ToolContext::new();
        assert_eq!(run(&ctx, json!({"get_history": true})).await.output, "No commands executed yet");

        run(&ctx, json!({"command": "echo one"})).await;
        run(&ctx, json!({"command": "exit 2"})).await;

        let history = run(&ctx, json!({"get_history": true})).await.output;
        assert!(history.contains("Total commands: 2"));
        assert!(history.contains("1. Command: echo one"));
        assert!(history.contains("   > one"));
        assert!(history.contains("2. Command: exit 2\n   Exit code: 2"));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let result = run(&ToolContext::new(), json!({})).await;
        assert!(result.is_error);
        assert_eq!(result.output, "No command provided");
    }

    #[test]
    fn test_parse_state() {
        let (cwd, env) = parse_state(b"/work\n\0HOME=/root\0_=/bin/env\0SHLVL=2\0EMPTY=\0").unwrap();
        assert_eq!(cwd, PathBuf::from("/work"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/root"));
        assert_eq!(env.get("EMPTY").map(String::as_str), Some(""));
        assert!(!env.contains_key("_"));
        assert!(!env.contains_key("SHLVL"));
        assert!(parse_state(b"").is_none());
    }

    #[test]
    fn test_tail_keeps_end() {
        let long = "x".repeat(MAX_STREAM_CHARS) + "END";
        let cut = tail(long.as_bytes());
        assert!(cut.starts_with("[... 3 characters omitted ...]"));
        assert!(cut.ends_with("END"));
    }
}
