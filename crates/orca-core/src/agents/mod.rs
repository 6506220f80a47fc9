//! Agents and delegation
//!
//! An [`Agent`] owns a [`MessageHistory`](crate::history::MessageHistory),
//! a model client and a capability table, and loops until the model stops
//! asking for tools. Delegation is exposed to the model as ordinary tools:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Agent (main)                          │
//! │   agent │ quick_research │ research_lead │ file/web tools     │
//! └────┬───────────┬────────────────┬─────────────────────────────┘
//!      │           │                ▼
//!      │           │        ┌──────────────────────────────────┐
//!      │           │        │        Research lead agent        │
//!      │           │        │ run_blocking_subagent            │
//!      │           │        │ run_parallel_agents (≤ 20)       │
//!      │           │        │ complete_task │ add_citations    │
//!      │           │        └────┬─────────────────────────────┘
//!      ▼           ▼             ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │     Sub-agents: parent table minus orchestration tools        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sub-agents never receive `research_lead` or `quick_research`, so the
//! delegation graph cannot cycle.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use orca_core::agents::{delegation_tools, AgentFactory};
//!
//! let factory = AgentFactory::from_config(client, &config);
//! let base = orca_tools::default_tools()?;
//! let tools = base.extended(delegation_tools(&factory, &base))?;
//!
//! let mut agent = factory.builder("Orca").tools(tools).build();
//! let response = agent.run("Compare the three largest Rust web frameworks").await?;
//! println!("{}", response.text());
//! ```

mod agent;
mod delegation;
mod factory;
mod parallel;
pub mod prompts;
mod research;
mod types;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use crate::tool::{Tool, ToolRegistry};

pub use agent::{stamped_system_prompt, Agent, AgentBuilder, AgentResponse, AgentStats, StopReason};
pub use delegation::{
    delegate, subagent_registry, AgentTool, RunBlockingSubagentTool, ORCHESTRATION_TOOLS,
};
pub use factory::AgentFactory;
pub use parallel::{AgentSpec, ParallelAgentTool};
pub use research::{CitationTool, CompleteTaskTool, QuickResearchTool, ResearchLeadTool, WEB_TOOLS};
pub use types::{SubAgentResult, SubAgentTask, SubAgentTaskBuilder, TaskId, TaskStatus};

/// Delegation capabilities for a main agent: `agent`, `research_lead` and
/// `quick_research`, each built over `base`.
pub fn delegation_tools(factory: &AgentFactory, base: &ToolRegistry) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(AgentTool::new(factory.clone(), base)),
        Arc::new(ResearchLeadTool::new(factory.clone(), base)),
        Arc::new(QuickResearchTool::new(factory.clone(), base)),
    ]
}
