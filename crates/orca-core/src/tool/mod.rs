//! Tool system
//!
//! Capabilities, the per-session context they receive, the registration
//! table, the dispatcher and per-tool metrics.

pub mod context;
pub mod definition;
pub mod dispatch;
pub mod metrics;
pub mod registry;
pub mod state;
pub mod traits;

pub use context::{Source, ToolContext};
pub use definition::{SchemaBuilder, ToolDefinition};
pub use dispatch::{ExecutionMode, ToolDispatcher, ToolInvocationResult};
pub use metrics::{MetricsRegistry, ToolMetrics};
pub use registry::ToolRegistry;
pub use state::{ShellRecord, ShellSession, TodoItem, TodoPriority, TodoStatus};
pub use traits::{Tool, ToolResult, parse_input};
