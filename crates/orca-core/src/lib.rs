//! orca-core: agent runtime
//!
//! The model client, the capability system, conversation history with token
//! accounting, and agents that can delegate work to sub-agents.

pub mod agents;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod tool;

pub use agents::{Agent, AgentBuilder, AgentFactory, AgentResponse, StopReason};
pub use config::{AgentConfig, Config, DelegationConfig, LlmConfig, ModelConfig};
pub use error::{Error, Result};
pub use history::{ConversationSnapshot, MessageHistory};
pub use llm::{AnthropicClient, ContentBlock, Message, ModelClient, Role, Usage};
pub use tool::{Source, Tool, ToolContext, ToolRegistry, ToolResult};
