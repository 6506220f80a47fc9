//! Session task list: `todo_write` replaces it, `todo_read` renders it

use std::collections::HashSet;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder, TodoItem, TodoStatus};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Default)]
pub struct TodoReadTool;

#[derive(Debug, Default)]
pub struct TodoWriteTool;

#[derive(Debug, Deserialize)]
struct WriteInput {
    todos: Vec<TodoItem>,
}

fn render(todos: &[TodoItem]) -> String {
    if todos.is_empty() {
        return "No todos yet. Use todo_write to create your first task!".to_string();
    }

    let mut lines = vec!["TODO LIST".to_string(), "=".repeat(40)];
    let count = |status: TodoStatus| todos.iter().filter(|t| t.status == status).count();

    for (status, heading) in [
        (TodoStatus::InProgress, "IN PROGRESS:"),
        (TodoStatus::Pending, "PENDING:"),
        (TodoStatus::Completed, "COMPLETED:"),
    ] {
        let group: Vec<&TodoItem> = todos.iter().filter(|t| t.status == status).collect();
        if group.is_empty() {
            continue;
        }
        lines.push(format!("\n{}", heading));
        for todo in group {
            let label = match status {
                TodoStatus::Completed => "DONE",
                _ => todo.priority.as_str(),
            };
            lines.push(format!("  [{}] [{}] {}", label, todo.id, todo.content));
        }
    }

    lines.push(format!(
        "\nSummary: {} total | {} in progress | {} pending | {} completed",
        todos.len(),
        count(TodoStatus::InProgress),
        count(TodoStatus::Pending),
        count(TodoStatus::Completed)
    ));
    lines.join("\n")
}

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        "todo_read"
    }

    fn description(&self) -> &str {
        "Read the current to-do list for the session, grouped by status with priorities."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object().build()
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        Ok(ToolResult::success(render(&ctx.todos())))
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Create and manage a structured task list for the current session. Pass the complete list; \
it replaces the existing one. Each todo has id, content, status (pending/in_progress/completed) \
and priority (high/medium/low). Keep only one task in_progress at a time."
    }

    fn input_schema(&self) -> Value {
        let item = json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Unique identifier"},
                "content": {"type": "string", "description": "Task description"},
                "status": SchemaBuilder::string_enum(&["pending", "in_progress", "completed"]),
                "priority": SchemaBuilder::string_enum(&["high", "medium", "low"]),
            },
            "required": ["id", "content", "status", "priority"],
        });
        SchemaBuilder::object()
            .array("todos", "The complete todo list (replaces existing)", item, true)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: WriteInput = parse_input(input)?;

        let mut seen = HashSet::new();
        if !input.todos.iter().all(|todo| seen.insert(todo.id.as_str())) {
            return Ok(ToolResult::error("Duplicate todo IDs found"));
        }

        let in_progress: Vec<&TodoItem> = input
            .todos
            .iter()
            .filter(|t| t.status == TodoStatus::InProgress)
            .collect();
        let completed = input.todos.iter().filter(|t| t.status == TodoStatus::Completed).count();

        let mut lines = Vec::new();
        if in_progress.len() > 1 {
            lines.push(format!(
                "Warning: {} tasks marked as in_progress. Consider having only one active task.",
                in_progress.len()
            ));
        }
        let total = input.todos.len();
        let current = match in_progress.as_slice() {
            [only] => Some(format!("\nCurrent task: [{}] {}", only.id, only.content)),
            _ => None,
        };
        let in_progress_count = in_progress.len();

        let previous = ctx.replace_todos(input.todos);
        tracing::debug!(total, previous, "Todo list updated");

        lines.push("Todos updated successfully!".to_string());
        lines.push(format!("Total: {} tasks ({:+} change)", total, total as i64 - previous as i64));
        lines.push(format!("In Progress: {}", in_progress_count));
        lines.push(format!("Completed: {}", completed));
        lines.extend(current);

        Ok(ToolResult::success(lines.join("\n")))
    }
}
