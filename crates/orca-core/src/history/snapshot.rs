//! Conversation snapshots
//!
//! A snapshot is a JSON document holding everything needed to resume a
//! conversation: the turns, the accounted token total, the system prompt
//! and the model settings.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::llm::{ContentBlock, Message, Role};

/// Serializable state of one agent's conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub agent_name: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
    pub total_tokens: u64,
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub config: ModelConfig,
}

impl ConversationSnapshot {
    /// Write the snapshot as pretty-printed JSON, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).await?;
        info!(path = %path.display(), messages = self.messages.len(), "Saved conversation");
        Ok(())
    }

    /// Read a snapshot written by [`save`](Self::save).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot: Self = serde_json::from_str(&fs::read_to_string(path).await?)?;
        info!(path = %path.display(), messages = snapshot.messages.len(), "Loaded conversation");
        Ok(snapshot)
    }

    /// Render the conversation as a Markdown transcript
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Conversation with {}\n", self.agent_name);
        let _ = writeln!(out, "- Model: {}", self.model);
        let _ = writeln!(out, "- Exported: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "- Tokens: {}\n", self.total_tokens);

        if !self.system_prompt.is_empty() {
            let _ = writeln!(out, "## System\n\n{}\n", self.system_prompt);
        }

        for message in &self.messages {
            let heading = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let _ = writeln!(out, "## {}\n", heading);
            for block in &message.content {
                match block {
                    ContentBlock::Text { text } => {
                        let _ = writeln!(out, "{}\n", text);
                    }
                    ContentBlock::ToolUse { name, input, .. } => {
                        let _ = writeln!(out, "**Tool call:** `{}`\n\n```json\n{}\n```\n", name, input);
                    }
                    ContentBlock::ToolResult { content, is_error, .. } => {
                        let label = if *is_error { "Tool error" } else { "Tool result" };
                        let _ = writeln!(out, "**{}:**\n\n```\n{}\n```\n", label, content);
                    }
                }
            }
        }
        out
    }

    /// Write the Markdown transcript to `path`
    pub async fn export_markdown(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, self.to_markdown()).await?;
        info!(path = %path.display(), "Exported conversation");
        Ok(())
    }
}
