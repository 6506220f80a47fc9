//! Messages API wire types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content block in a conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: JsonValue,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool result block
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    /// Parse a raw block, keeping unknown or malformed shapes as opaque text.
    pub fn coerce(value: JsonValue) -> Self {
        match serde_json::from_value::<ContentBlock>(value.clone()) {
            Ok(block) => block,
            Err(e) => {
                tracing::debug!(error = %e, "Coercing unrecognized content block to text");
                match value {
                    JsonValue::String(text) => Self::Text { text },
                    other => Self::Text {
                        text: other.to_string(),
                    },
                }
            }
        }
    }

    /// Text payload, if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Whether the block carries nothing worth sending
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text { text } if text.is_empty())
    }
}

/// Deserialize a block list leniently via [`ContentBlock::coerce`]
pub fn deserialize_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<JsonValue>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(ContentBlock::coerce).collect())
}

/// A role-tagged conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(deserialize_with = "deserialize_blocks")]
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a turn from blocks
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    /// Create a user turn with text
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    /// Create an assistant turn with text
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    /// Text blocks joined with newlines
    pub fn text_content(&self) -> String {
        text_of(&self.content)
    }

    /// Tool calls requested by this turn, in order
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        tool_calls_of(&self.content)
    }

    /// Ids of the tool results carried by this turn
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True when there is no content worth sending
    pub fn is_empty(&self) -> bool {
        self.content.iter().all(ContentBlock::is_empty)
    }
}

/// Join the text blocks of a block list
pub fn text_of(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract tool calls from a block list
pub fn tool_calls_of(blocks: &[ContentBlock]) -> Vec<ToolCall> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: JsonValue,
}

/// Provider cache hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub cache_type: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            cache_type: "ephemeral".to_string(),
        }
    }
}

/// Content block as sent to the provider, optionally carrying a cache hint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiContent {
    #[serde(flatten)]
    pub block: ContentBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl From<ContentBlock> for ApiContent {
    fn from(block: ContentBlock) -> Self {
        Self {
            block,
            cache_control: None,
        }
    }
}

/// Turn as sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: Role,
    pub content: Vec<ApiContent>,
}

/// Tool definition for the Messages API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: JsonValue) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Messages API request
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Extra provider parameters merged into the request body
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Messages API response
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, deserialize_with = "deserialize_blocks")]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    /// Text blocks joined with newlines
    pub fn text(&self) -> String {
        text_of(&self.content)
    }

    /// Tool calls in this response, in order
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        tool_calls_of(&self.content)
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, rename = "cache_read_input_tokens")]
    pub cache_read_tokens: u64,
    #[serde(default, rename = "cache_creation_input_tokens")]
    pub cache_creation_tokens: u64,
}

impl Usage {
    /// Full context size the provider saw for this request
    pub fn total_input(&self) -> u64 {
        self.input_tokens + self.cache_read_tokens + self.cache_creation_tokens
    }

    /// Accumulate another report into this one
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
    }
}

/// Builder for MessagesRequest
pub struct MessagesRequestBuilder {
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    system: Option<String>,
    messages: Vec<ApiMessage>,
    tools: Option<Vec<ToolDefinition>>,
    extra: serde_json::Map<String, JsonValue>,
}

impl MessagesRequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            temperature: None,
            system: None,
            messages: vec![],
            tools: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn messages(mut self, messages: Vec<ApiMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Tool list; an empty list omits the field entirely
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = if tools.is_empty() { None } else { Some(tools) };
        self
    }

    pub fn extra(mut self, extra: serde_json::Map<String, JsonValue>) -> Self {
        self.extra = extra;
        self
    }

    pub fn build(self) -> MessagesRequest {
        MessagesRequest {
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: self.system,
            messages: self.messages,
            tools: self.tools,
            extra: self.extra,
        }
    }
}
