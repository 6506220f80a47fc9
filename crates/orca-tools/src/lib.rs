//! orca-tools: built-in capabilities for orca agents
//!
//! File, notebook, search, shell, git and web tools plus a calculator, a
//! random number source, a scratchpad and a session to-do list.
//! Session state lives in [`ToolContext`](orca_core::ToolContext): file
//! tools share the files-read set, `bash` keeps its working directory and
//! environment, the `todo_*` pair shares one list, and web tools record the
//! sources they consult.

use std::sync::Arc;

use orca_core::{Result, Tool, ToolRegistry};

pub mod bash;
pub mod calculator;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod git;
pub mod glob;
pub mod grep;
pub mod multi_edit;
pub mod notebook;
pub mod random_number;
pub mod think;
pub mod todo;
pub mod web_fetch;
pub mod web_search;

pub use bash::BashTool;
pub use calculator::CalculatorTool;
pub use file_edit::FileEditTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use git::GitTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use multi_edit::MultiEditTool;
pub use notebook::NotebookTool;
pub use random_number::RandomNumberTool;
pub use think::ThinkTool;
pub use todo::{TodoReadTool, TodoWriteTool};
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;

/// Every built-in tool, in the order the model sees them
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CalculatorTool),
        Arc::new(RandomNumberTool),
        Arc::new(ThinkTool),
        Arc::new(TodoReadTool),
        Arc::new(TodoWriteTool),
        Arc::new(FileReadTool),
        Arc::new(FileWriteTool),
        Arc::new(FileEditTool),
        Arc::new(MultiEditTool),
        Arc::new(NotebookTool),
        Arc::new(GlobTool),
        Arc::new(GrepTool),
        Arc::new(BashTool),
        Arc::new(GitTool),
        Arc::new(WebSearchTool::new()),
        Arc::new(WebFetchTool::new()),
    ]
}

/// Registry holding every built-in tool
pub fn default_tools() -> Result<ToolRegistry> {
    ToolRegistry::from_tools(builtin_tools())
}
