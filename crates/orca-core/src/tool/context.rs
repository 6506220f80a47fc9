//! Per-session state shared with every tool invocation
//!
//! State that would otherwise sit in process-wide globals lives here and is
//! threaded explicitly through [`Tool::execute`](super::Tool::execute):
//!
//! - the set of files read in this session, which gates overwrites;
//! - the sources collected by web tools, used for citations and reports;
//! - the report submitted through `complete_task`;
//! - the shell session of `bash` and the task list of the todo tools.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use super::state::{ShellSession, TodoItem};

/// A source consulted by a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    /// Name of the tool that recorded it
    pub tool: String,
    pub accessed_at: DateTime<Utc>,
}

impl Source {
    pub fn new(url: impl Into<String>, title: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            tool: tool.into(),
            accessed_at: Utc::now(),
        }
    }
}

/// Session context handed to tools
///
/// Cloning is cheap and clones share state. [`ToolContext::child`] creates
/// the context for a sub-agent: it shares the files-read set with its parent
/// but collects its own sources, keeps its own task list and starts its shell
/// from a copy of the parent's directory and environment.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    files_read: Arc<DashSet<PathBuf>>,
    sources: Arc<Mutex<Vec<Source>>>,
    report: Arc<Mutex<Option<String>>>,
    shell: Arc<Mutex<ShellSession>>,
    todos: Arc<Mutex<Vec<TodoItem>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolve a path to the key used in the files-read set
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a sub-agent session
    pub fn child(&self) -> Self {
        Self {
            files_read: Arc::clone(&self.files_read),
            sources: Arc::default(),
            report: Arc::default(),
            shell: Arc::new(Mutex::new(ShellSession {
                history: Vec::new(),
                ..self.shell()
            })),
            todos: Arc::default(),
        }
    }

    /// Record that a file's contents were shown to the model
    pub fn mark_read(&self, path: impl AsRef<Path>) {
        self.files_read.insert(normalize(path.as_ref()));
    }

    /// Whether the file was read earlier in this session
    pub fn has_read(&self, path: impl AsRef<Path>) -> bool {
        self.files_read.contains(&normalize(path.as_ref()))
    }

    /// Number of distinct files read
    pub fn files_read_count(&self) -> usize {
        self.files_read.len()
    }

    /// Record a source; a URL already recorded is ignored
    pub fn add_source(&self, source: Source) {
        let mut sources = lock(&self.sources);
        if !sources.iter().any(|s| s.url == source.url) {
            sources.push(source);
        }
    }

    /// Merge sources collected elsewhere (e.g. by a finished sub-agent)
    pub fn extend_sources(&self, incoming: impl IntoIterator<Item = Source>) {
        for source in incoming {
            self.add_source(source);
        }
    }

    /// Sources collected so far, in recording order
    pub fn sources(&self) -> Vec<Source> {
        lock(&self.sources).clone()
    }

    pub fn source_count(&self) -> usize {
        lock(&self.sources).len()
    }

    /// Store the final report submitted by `complete_task`
    pub fn submit_report(&self, report: impl Into<String>) {
        *lock(&self.report) = Some(report.into());
    }

    /// Take the submitted report, leaving the slot empty
    pub fn take_report(&self) -> Option<String> {
        lock(&self.report).take()
    }

    /// Copy of the current shell session
    pub fn shell(&self) -> ShellSession {
        lock(&self.shell).clone()
    }

    pub fn update_shell<R>(&self, update: impl FnOnce(&mut ShellSession) -> R) -> R {
        update(&mut lock(&self.shell))
    }

    /// Forget directory, environment and history changes
    pub fn reset_shell(&self) {
        *lock(&self.shell) = ShellSession::default();
    }

    pub fn todos(&self) -> Vec<TodoItem> {
        lock(&self.todos).clone()
    }

    /// Replace the task list, returning the previous length
    pub fn replace_todos(&self, todos: Vec<TodoItem>) -> usize {
        std::mem::replace(&mut *lock(&self.todos), todos).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mark_and_check_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let ctx = ToolContext::new();
        assert!(!ctx.has_read(&path));

        ctx.mark_read(&path);
        assert!(ctx.has_read(&path));
        // same file through a different spelling
        assert!(ctx.has_read(dir.path().join(".").join("a.txt")));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let first = ToolContext::new();
        let second = ToolContext::new();
        first.mark_read(&path);
        assert!(!second.has_read(&path));
    }

    #[test]
    fn test_child_shares_reads_not_sources() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let parent = ToolContext::new();
        parent.add_source(Source::new("https://a.example", "A", "web_search"));

        let child = parent.child();
        child.mark_read(&path);
        child.add_source(Source::new("https://b.example", "B", "web_fetch"));

        assert!(parent.has_read(&path));
        assert_eq!(parent.source_count(), 1);
        assert_eq!(child.source_count(), 1);

        parent.extend_sources(child.sources());
        assert_eq!(parent.source_count(), 2);
    }

    #[test]
    fn test_duplicate_sources_ignored() {
        let ctx = ToolContext::new();
        ctx.add_source(Source::new("https://a.example", "A", "web_search"));
        ctx.add_source(Source::new("https://a.example", "A again", "web_fetch"));
        assert_eq!(ctx.source_count(), 1);
        assert_eq!(ctx.sources()[0].title, "A");
    }

    #[test]
    fn test_child_shell_and_todos() {
        use crate::tool::state::{TodoPriority, TodoStatus};

        let parent = ToolContext::new();
        parent.update_shell(|shell| {
            shell.cwd = Some(PathBuf::from("/tmp"));
            shell.history.push(crate::tool::state::ShellRecord {
                command: "cd /tmp".to_string(),
                exit_code: Some(0),
                preview: String::new(),
            });
        });
        parent.replace_todos(vec![TodoItem {
            id: "1".to_string(),
            content: "write tests".to_string(),
            status: TodoStatus::Pending,
            priority: TodoPriority::High,
        }]);

        let child = parent.child();
        assert_eq!(child.shell().cwd, Some(PathBuf::from("/tmp")));
        assert!(child.shell().history.is_empty());
        assert!(child.todos().is_empty());

        child.update_shell(|shell| shell.cwd = Some(PathBuf::from("/")));
        assert_eq!(parent.shell().cwd, Some(PathBuf::from("/tmp")));

        assert_eq!(parent.replace_todos(Vec::new()), 1);
        parent.reset_shell();
        assert_eq!(parent.shell(), ShellSession::default());
    }

    #[test]
    fn test_report_slot() {
        let ctx = ToolContext::new();
        assert!(ctx.take_report().is_none());
        ctx.submit_report("# Report");
        assert_eq!(ctx.take_report().as_deref(), Some("# Report"));
        assert!(ctx.take_report().is_none());
    }
}
