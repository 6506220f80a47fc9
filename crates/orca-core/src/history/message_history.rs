//! Conversation history with token accounting
//!
//! Turns alternate User/Assistant. Every Assistant turn owns one
//! [`TurnCost`] entry, so `turn_costs[i]` is the cost of the i-th
//! (User, Assistant) pair and truncation can drop whole pairs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::{ApiContent, ApiMessage, CacheControl, ContentBlock, Message, ModelClient, Role, Usage};

/// Replaces the oldest surviving user turn after truncation
pub const TRUNCATION_NOTICE: &str = "[Earlier history has been truncated.]";

/// Token cost charged for the truncation notice
pub const TRUNCATION_NOTICE_TOKENS: u64 = 25;

/// Result text for a tool call whose result was lost
pub const MISSING_RESULT: &str = "Tool result unavailable";

/// Rough token estimate: one token per four characters
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Token cost of one (User, Assistant) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCost {
    /// New input tokens this pair added to the context
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TurnCost {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Content accepted by [`MessageHistory::append`]
#[derive(Debug, Clone)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<&str> for TurnContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for TurnContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<ContentBlock>> for TurnContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

impl TurnContent {
    fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) => vec![ContentBlock::text(text)],
            Self::Blocks(blocks) => blocks,
        }
    }
}

/// Bounded conversation log owned by one agent
#[derive(Debug, Clone)]
pub struct MessageHistory {
    turns: Vec<Message>,
    turn_costs: Vec<TurnCost>,
    total_tokens: u64,
    system_tokens: u64,
    context_window_tokens: u64,
    enable_caching: bool,
}

impl MessageHistory {
    /// Create a history whose initial cost is a heuristic estimate of the
    /// system prompt.
    pub fn new(system_prompt: &str, context_window_tokens: u64, enable_caching: bool) -> Self {
        let system_tokens = estimate_tokens(system_prompt);
        Self {
            turns: Vec::new(),
            turn_costs: Vec::new(),
            total_tokens: system_tokens,
            system_tokens,
            context_window_tokens,
            enable_caching,
        }
    }

    /// Replace the system prompt estimate with the provider's exact count.
    ///
    /// Any failure keeps the heuristic estimate.
    pub async fn calibrate(&mut self, client: &dyn ModelClient, model: &str, system_prompt: &str) {
        match client.count_system_tokens(model, system_prompt).await {
            Ok(count) => self.set_system_tokens(count),
            Err(e) => {
                warn!(error = %e, "Token counting failed, keeping length/4 estimate");
                self.set_system_tokens(estimate_tokens(system_prompt));
            }
        }
    }

    /// Re-estimate the system prompt cost after the prompt changed
    pub fn set_system_prompt(&mut self, system_prompt: &str) {
        self.set_system_tokens(estimate_tokens(system_prompt));
    }

    fn set_system_tokens(&mut self, count: u64) {
        self.total_tokens = self.total_tokens.saturating_sub(self.system_tokens) + count;
        self.system_tokens = count;
    }

    /// Append a turn.
    ///
    /// For Assistant turns with `usage`, the new input is the provider's
    /// reported context size minus what is already accounted for. A
    /// negative delta is clamped to zero. Assistant turns without usage are
    /// charged a heuristic output cost so costs stay aligned with pairs.
    /// A User turn directly after another User turn is merged into it.
    pub fn append(&mut self, role: Role, content: impl Into<TurnContent>, usage: Option<&Usage>) {
        let blocks = content.into().into_blocks();

        if role == Role::Assistant {
            let cost = match usage {
                Some(usage) => {
                    let total_input = usage.total_input();
                    if total_input < self.total_tokens {
                        warn!(
                            reported = total_input,
                            accounted = self.total_tokens,
                            "Provider reported a smaller context than accounted; clamping delta to 0"
                        );
                    }
                    TurnCost {
                        input_tokens: total_input.saturating_sub(self.total_tokens),
                        output_tokens: usage.output_tokens,
                    }
                }
                None => TurnCost {
                    input_tokens: 0,
                    output_tokens: estimate_tokens(&blocks_json(&blocks)),
                },
            };
            self.total_tokens += cost.total();
            self.turn_costs.push(cost);
            debug!(
                input = cost.input_tokens,
                output = cost.output_tokens,
                total = self.total_tokens,
                "Recorded turn cost"
            );
        }

        match self.turns.last_mut() {
            Some(last) if role == Role::User && last.role == Role::User => {
                last.content.extend(blocks);
            }
            _ => self.turns.push(Message::new(role, blocks)),
        }
    }

    /// Drop the oldest pairs until the history fits its budget.
    ///
    /// Returns the number of turns removed.
    pub fn truncate(&mut self) -> usize {
        let mut removed = 0;

        while self.total_tokens > self.context_window_tokens
            && !self.turn_costs.is_empty()
            && self.turns.len() >= 2
        {
            self.turns.drain(..2);
            let cost = self.turn_costs.remove(0);
            self.total_tokens = self.total_tokens.saturating_sub(cost.total());
            removed += 2;

            if !self.turns.is_empty() && !self.turn_costs.is_empty() {
                self.turns[0] = Message::user(TRUNCATION_NOTICE);
                let original = self.turn_costs[0].input_tokens;
                self.turn_costs[0].input_tokens = TRUNCATION_NOTICE_TOKENS;
                self.total_tokens = (self.total_tokens + TRUNCATION_NOTICE_TOKENS).saturating_sub(original);
            }
        }

        if removed > 0 {
            debug!(
                removed,
                remaining = self.turns.len(),
                total = self.total_tokens,
                budget = self.context_window_tokens,
                "Truncated history"
            );
        }
        removed
    }

    /// Turns in the form the provider accepts.
    ///
    /// Empty turns are skipped. Tool calls are always answered by the next
    /// turn: missing results are filled with an error result, a trailing
    /// Assistant turn with unanswered calls is withheld, and results that
    /// answer no call are sent as plain text. With caching enabled the last
    /// block of a trailing User turn carries an ephemeral cache hint.
    pub fn format_for_api(&self) -> Vec<ApiMessage> {
        let mut out: Vec<Message> = Vec::with_capacity(self.turns.len());
        let mut pending: Vec<String> = Vec::new();

        for turn in &self.turns {
            let blocks: Vec<ContentBlock> = turn
                .content
                .iter()
                .filter(|block| !block.is_empty())
                .cloned()
                .collect();
            if blocks.is_empty() {
                continue;
            }

            match turn.role {
                Role::Assistant => {
                    if !pending.is_empty() {
                        out.push(Message::new(Role::User, missing_results(&pending)));
                    }
                    let turn = Message::new(Role::Assistant, blocks);
                    pending = turn.tool_calls().into_iter().map(|call| call.id).collect();
                    out.push(turn);
                }
                Role::User => {
                    let answered: HashSet<&str> = blocks
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                            _ => None,
                        })
                        .collect();
                    let unanswered: Vec<String> = pending
                        .iter()
                        .filter(|id| !answered.contains(id.as_str()))
                        .cloned()
                        .collect();

                    let mut content = missing_results(&unanswered);
                    content.extend(blocks.into_iter().map(|block| match block {
                        ContentBlock::ToolResult { tool_use_id, content, is_error }
                            if !pending.contains(&tool_use_id) =>
                        {
                            let label = if is_error { "Tool error" } else { "Tool result" };
                            ContentBlock::text(format!("{} ({}): {}", label, tool_use_id, content))
                        }
                        other => other,
                    }));
                    pending.clear();

                    match out.last_mut() {
                        Some(last) if last.role == Role::User => last.content.extend(content),
                        _ => out.push(Message::new(Role::User, content)),
                    }
                }
            }
        }

        if !pending.is_empty() {
            out.pop();
        }

        // One breakpoint on the final block caches the whole prefix; the
        // provider rejects requests with more than four.
        let last_index = out.len().checked_sub(1);
        out.into_iter()
            .enumerate()
            .map(|(i, turn)| {
                let cache_last = self.enable_caching && Some(i) == last_index && turn.role == Role::User;
                let block_count = turn.content.len();
                ApiMessage {
                    role: turn.role,
                    content: turn
                        .content
                        .into_iter()
                        .enumerate()
                        .map(|(j, block)| ApiContent {
                            block,
                            cache_control: (cache_last && j + 1 == block_count).then(CacheControl::ephemeral),
                        })
                        .collect(),
                }
            })
            .collect()
    }

    /// Forget all turns; the system prompt cost is kept.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.turn_costs.clear();
        self.total_tokens = self.system_tokens;
    }

    /// Replace the turns with restored ones.
    ///
    /// `total_tokens` is taken verbatim; pair costs are re-estimated from
    /// the serialized size of each turn.
    pub fn restore(&mut self, turns: Vec<Message>, total_tokens: u64) {
        self.turn_costs = turns
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| TurnCost {
                input_tokens: estimate_tokens(&message_json(&pair[0])),
                output_tokens: estimate_tokens(&message_json(&pair[1])),
            })
            .collect();
        self.turns = turns;
        self.total_tokens = total_tokens;
    }

    /// Remove the most recent user input and everything after it.
    ///
    /// Returns the removed input text. Tool results merged into the same
    /// turn are kept so earlier tool calls stay answered.
    pub fn pop_last_exchange(&mut self) -> Option<String> {
        let index = self.turns.iter().rposition(|turn| {
            turn.role == Role::User && turn.content.iter().any(|block| block.as_text().is_some())
        })?;

        let removed_costs = self.turns[index + 1..]
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .count();
        for _ in 0..removed_costs.min(self.turn_costs.len()) {
            if let Some(cost) = self.turn_costs.pop() {
                self.total_tokens = self.total_tokens.saturating_sub(cost.total());
            }
        }
        self.turns.truncate(index + 1);

        let turn = self.turns.pop()?;
        let (texts, kept): (Vec<_>, Vec<_>) = turn
            .content
            .into_iter()
            .partition(|block| block.as_text().is_some());
        if !kept.is_empty() {
            self.turns.push(Message::new(Role::User, kept));
        }

        Some(crate::llm::text_of(&texts))
    }

    /// All turns, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Tokens currently accounted to the context
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    /// Tokens charged for the system prompt
    pub fn system_tokens(&self) -> u64 {
        self.system_tokens
    }

    /// Per-pair costs, oldest first
    pub fn turn_costs(&self) -> &[TurnCost] {
        &self.turn_costs
    }

    pub fn context_window_tokens(&self) -> u64 {
        self.context_window_tokens
    }

    pub fn set_context_window_tokens(&mut self, tokens: u64) {
        self.context_window_tokens = tokens;
    }

    pub fn caching_enabled(&self) -> bool {
        self.enable_caching
    }

    /// Text of the most recent user input, if any
    pub fn last_user_text(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .filter(|turn| turn.role == Role::User)
            .map(Message::text_content)
            .find(|text| !text.is_empty())
    }
}

fn missing_results(ids: &[String]) -> Vec<ContentBlock> {
    ids.iter()
        .map(|id| ContentBlock::tool_result(id.clone(), MISSING_RESULT, true))
        .collect()
}

fn blocks_json(blocks: &[ContentBlock]) -> String {
    serde_json::to_string(blocks).unwrap_or_default()
}

fn message_json(message: &Message) -> String {
    serde_json::to_string(message).unwrap_or_default()
}
