//! Jupyter notebook tool: read, edit and add cells of `.ipynb` files
//!
//! Notebooks are handled as plain JSON. Like the other file tools, changing
//! an existing notebook requires that the session read it first.

use std::path::Path;

use async_trait::async_trait;
use orca_core::tool::{parse_input, SchemaBuilder};
use orca_core::{Result, Tool, ToolContext, ToolResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

#[derive(Debug, Default)]
pub struct NotebookTool;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Read,
    Edit,
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CellType {
    Code,
    Markdown,
}

impl CellType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Position {
    #[default]
    End,
    After,
}

#[derive(Debug, Deserialize)]
struct Input {
    operation: Operation,
    path: String,
    #[serde(default)]
    cell_index: Option<usize>,
    #[serde(default)]
    cell_type: Option<CellType>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    after_index: Option<usize>,
}

type Outcome = std::result::Result<String, String>;

/// Notebook source form: one string per line, newlines kept
fn source_lines(content: &str) -> Value {
    Value::from(content.split_inclusive('\n').collect::<Vec<_>>())
}

/// Join a string or array of strings
fn joined(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn format_output(output: &Value) -> String {
    match output["output_type"].as_str().unwrap_or("unknown") {
        "stream" => joined(output.get("text")),
        kind @ ("execute_result" | "display_data") => match output["data"].get("text/plain") {
            Some(text) => joined(Some(text)),
            None => {
                let types: Vec<&str> = output["data"]
                    .as_object()
                    .map(|data| data.keys().map(String::as_str).collect())
                    .unwrap_or_default();
                format!("[{} with mime types: {}]", kind, types.join(", "))
            }
        },
        "error" => format!(
            "{}: {}",
            output["ename"].as_str().unwrap_or("Error"),
            output["evalue"].as_str().unwrap_or_default()
        ),
        other => format!("[{} output]", other),
    }
}

fn format_cell(cell: &Value, index: usize) -> String {
    let cell_type = cell["cell_type"].as_str().unwrap_or("unknown");
    let header = match cell_type {
        "code" => {
            let count = cell["execution_count"]
                .as_u64()
                .map_or("[ ]".to_string(), |n| format!("[{}]", n));
            format!("Cell {} (code) {}:", index, count)
        }
        other => format!("Cell {} ({}):", index, other),
    };

    let mut lines = vec![header, "-".repeat(40), joined(cell.get("source"))];
    if let Some(outputs) = cell["outputs"].as_array().filter(|o| !o.is_empty()) {
        lines.push("\nOutputs:".to_string());
        lines.extend(outputs.iter().map(format_output).filter(|text| !text.is_empty()));
    }
    lines.join("\n")
}

fn new_cell(cell_type: CellType, content: &str) -> Value {
    match cell_type {
        CellType::Code => json!({
            "cell_type": "code",
            "execution_count": null,
            "metadata": {},
            "outputs": [],
            "source": source_lines(content),
        }),
        CellType::Markdown => json!({
            "cell_type": "markdown",
            "metadata": {},
            "source": source_lines(content),
        }),
    }
}

fn empty_notebook() -> Value {
    json!({
        "cells": [],
        "metadata": {
            "kernelspec": {"display_name": "Python 3", "language": "python", "name": "python3"},
            "language_info": {"name": "python"},
        },
        "nbformat": 4,
        "nbformat_minor": 4,
    })
}

async fn load(path: &str) -> std::result::Result<Value, String> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read notebook '{}': {}", path, e))?;
    let notebook: Value = serde_json::from_str(&text).map_err(|e| format!("Invalid notebook format: {}", e))?;
    if !notebook["cells"].is_array() && !notebook["cells"].is_null() {
        return Err("Invalid notebook format: 'cells' is not a list".to_string());
    }
    Ok(notebook)
}

async fn save(path: &str, notebook: &Value) -> std::result::Result<(), String> {
    let text = serde_json::to_string_pretty(notebook).map_err(|e| e.to_string())?;
    fs::write(path, text)
        .await
        .map_err(|e| format!("Failed to write notebook '{}': {}", path, e))
}

fn cells_mut(notebook: &mut Value) -> std::result::Result<&mut Vec<Value>, String> {
    notebook
        .as_object_mut()
        .ok_or("Invalid notebook format: not a JSON object")?
        .entry("cells")
        .or_insert_with(|| json!([]))
        .as_array_mut()
        .ok_or_else(|| "Invalid notebook format: 'cells' is not a list".to_string())
}

fn require_read(ctx: &ToolContext, path: &str) -> std::result::Result<(), String> {
    if ctx.has_read(path) {
        Ok(())
    } else {
        Err(format!(
            "Notebook '{}' has not been read in this session. Read it with operation 'read' first.",
            path
        ))
    }
}

async fn read(input: &Input, ctx: &ToolContext) -> Outcome {
    if Path::new(&input.path).extension().and_then(|e| e.to_str()) != Some("ipynb") {
        return Err(format!("File is not a Jupyter notebook: {}", input.path));
    }
    let notebook = load(&input.path).await?;
    ctx.mark_read(&input.path);

    let cells = notebook["cells"].as_array().cloned().unwrap_or_default();
    if cells.is_empty() {
        return Ok(format!("Notebook '{}' has no cells", input.path));
    }

    match input.cell_index {
        Some(index) => cells.get(index).map(|cell| format_cell(cell, index)).ok_or_else(|| {
            format!("Cell index {} out of range (notebook has {} cells)", index, cells.len())
        }),
        None => {
            let mut lines = vec![
                format!("Notebook: {}", input.path),
                format!("Total cells: {}", cells.len()),
                "=".repeat(60),
                String::new(),
            ];
            for (index, cell) in cells.iter().enumerate() {
                lines.push(format_cell(cell, index));
                lines.push(String::new());
            }
            Ok(lines.join("\n"))
        }
    }
}

async fn edit(input: &Input, ctx: &ToolContext) -> Outcome {
    let index = input.cell_index.ok_or("cell_index is required for edit operation")?;
    let content = input.content.as_deref().ok_or("content is required for edit operation")?;
    require_read(ctx, &input.path)?;

    let mut notebook = load(&input.path).await?;
    let cells = cells_mut(&mut notebook)?;
    let total = cells.len();
    let cell = cells
        .get_mut(index)
        .ok_or_else(|| format!("Cell index {} out of range (notebook has {} cells)", index, total))?;

    let old = joined(cell.get("source"));
    let cell_type = cell["cell_type"].as_str().unwrap_or("unknown").to_string();
    cell["source"] = source_lines(content);
    save(&input.path, &notebook).await?;

    Ok(format!(
        "Cell {} edited successfully!\nType: {}\n\nOld content:\n{}\n\nNew content:\n{}",
        index, cell_type, old, content
    ))
}

async fn add(input: &Input, ctx: &ToolContext) -> Outcome {
    let cell_type = input.cell_type.ok_or("cell_type is required for add operation")?;
    let content = input.content.as_deref().ok_or("content is required for add operation")?;

    let mut notebook = if fs::try_exists(&input.path).await.unwrap_or(false) {
        require_read(ctx, &input.path)?;
        load(&input.path).await?
    } else {
        empty_notebook()
    };

    let cells = cells_mut(&mut notebook)?;
    let location = match (input.position, input.after_index) {
        (Position::After, Some(after)) => {
            if after >= cells.len() {
                return Err(format!(
                    "after_index {} out of range (notebook has {} cells)",
                    after,
                    cells.len()
                ));
            }
            cells.insert(after + 1, new_cell(cell_type, content));
            format!("after cell {} (new index: {})", after, after + 1)
        }
        _ => {
            cells.push(new_cell(cell_type, content));
            format!("at the end (index: {})", cells.len() - 1)
        }
    };
    let total = cells.len();

    save(&input.path, &notebook).await?;
    ctx.mark_read(&input.path);

    Ok(format!(
        "New {} cell added successfully {}!\nTotal cells: {}\n\nContent:\n{}",
        cell_type.as_str(),
        location,
        total,
        content
    ))
}

#[async_trait]
impl Tool for NotebookTool {
    fn name(&self) -> &str {
        "notebook"
    }

    fn description(&self) -> &str {
        "Read and edit Jupyter notebook (.ipynb) files. Operations: 'read' (all cells or one cell_index), \
'edit' (replace the content of cell_index) and 'add' (append a code or markdown cell, or insert it \
after after_index with position 'after'). A missing notebook is created by 'add'."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object()
            .property("operation", SchemaBuilder::string_enum(&["read", "edit", "add"]), true)
            .string("path", "Path to the Jupyter notebook file", true)
            .integer("cell_index", "Index of the cell (0-based)", false)
            .property("cell_type", SchemaBuilder::string_enum(&["code", "markdown"]), false)
            .string("content", "New content for the cell", false)
            .property("position", SchemaBuilder::string_enum(&["end", "after"]), false)
            .integer("after_index", "Insert the new cell after this index (with position 'after')", false)
            .build()
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let input: Input = parse_input(input)?;
        tracing::debug!(path = %input.path, operation = ?input.operation, "Notebook operation");

        let outcome = match input.operation {
            Operation::Read => read(&input, ctx).await,
            Operation::Edit => edit(&input, ctx).await,
            Operation::Add => add(&input, ctx).await,
        };

        Ok(match outcome {
            Ok(text) => ToolResult::success(text),
            Err(e) => ToolResult::error(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Value {
        json!({
            "cells": [
                {"cell_type": "markdown", "metadata": {}, "source": ["# Title\n", "intro"]},
                {
                    "cell_type": "code",
                    "execution_count": 3,
                    "metadata": {},
                    "source": "print(1 + 1)",
                    "outputs": [{"output_type": "stream", "name": "stdout", "text": ["2\n"]}],
                },
            ],
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 4,
        })
    }

    fn setup() -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analysis.ipynb");
        std::fs::write(&path, sample().to_string()).unwrap();
        (dir, path.display().to_string())
    }

    async fn run(ctx: &ToolContext, input: Value) -> ToolResult {
        NotebookTool.execute(input, ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_read_all_and_one() {
        let (_dir, path) = setup();
        let ctx = ToolContext::new();

        let all = run(&ctx, json!({"operation": "read", "path": path})).await;
        assert!(!all.is_error, "{}", all.output);
        assert!(all.output.contains("Total cells: 2"));
        assert!(all.output.contains(&format!("Cell 0 (markdown):\n{}\n# Title\nintro", "-".repeat(40))));
        assert!(all.output.contains("Cell 1 (code) [3]:"));
        assert!(all.output.contains("Outputs:\n2\n"));

        let one = run(&ctx, json!({"operation": "read", "path": path, "cell_index": 5})).await;
        assert!(one.is_error);
        assert_eq!(one.output, "Cell index 5 out of range (notebook has 2 cells)");
    }

    #[tokio::test]
    async fn test_edit_requires_read() {
        let (_dir, path) = setup();
        let ctx = ToolContext::new();

        let edit = json!({"operation": "edit", "path": path, "cell_index": 1, "content": "x = 1\nx"});
        assert!(run(&ctx, edit.clone()).await.is_error);

        run(&ctx, json!({"operation": "read", "path": path})).await;
        let result = run(&ctx, edit).await;
        assert!(!result.is_error, "{}", result.output);
        assert!(result.output.contains("Old content:\nprint(1 + 1)"));

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["cells"][1]["source"], json!(["x = 1\n", "x"]));
        assert_eq!(saved["cells"][1]["execution_count"], 3);
    }

    #[tokio::test]
    async fn test_add_creates_and_inserts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.ipynb").display().to_string();
        let ctx = ToolContext::new();

        let result = run(
            &ctx,
            json!({"operation": "add", "path": path, "cell_type": "code", "content": "import os"}),
        )
        .await;
        assert!(result.output.contains("at the end (index: 0)"), "{}", result.output);

        let result = run(
            &ctx,
            json!({"operation": "add", "path": path, "cell_type": "markdown", "content": "# Intro",
                   "position": "after", "after_index": 0}),
        )
        .await;
        assert!(result.output.contains("after cell 0 (new index: 1)"), "{}", result.output);

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["cells"][0]["cell_type"], "code");
        assert_eq!(saved["cells"][1]["source"], json!(["# Intro"]));
    }

    #[tokio::test]
    async fn test_rejects_other_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "{}").unwrap();

        let result = run(&ToolContext::new(), json!({"operation": "read", "path": path})).await;
        assert!(result.is_error);
        assert!(result.output.starts_with("File is not a Jupyter notebook"));
    }

    #[test]
    fn test_format_output_kinds() {
        assert_eq!(
            format_output(&json!({"output_type": "execute_result", "data": {"text/plain": "42"}})),
            "42"
        );
        assert_eq!(
            format_output(&json!({"output_type": "display_data", "data": {"image/png": "..."}})),
            "[display_data with mime types: image/png]"
        );
        assert_eq!(
            format_output(&json!({"output_type": "error", "ename": "ValueError", "evalue": "bad"})),
            "ValueError: bad"
        );
    }
}
