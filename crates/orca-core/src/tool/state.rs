//! Session state owned by individual tools
//!
//! Kept in [`ToolContext`](super::ToolContext) so that linked tools
//! (`todo_read`/`todo_write`) and repeated calls (`bash`) see the same state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Shell state carried between `bash` calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellSession {
    /// Working directory for the next command; `None` uses the process cwd
    pub cwd: Option<PathBuf>,
    /// Full environment for the next command; `None` inherits the process env
    pub env: Option<BTreeMap<String, String>>,
    pub history: Vec<ShellRecord>,
}

/// One executed shell command
#[derive(Debug, Clone, PartialEq)]
pub struct ShellRecord {
    pub command: String,
    pub exit_code: Option<i32>,
    /// Leading part of the output
    pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

impl TodoPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// An entry of the session's task list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: TodoPriority,
}
