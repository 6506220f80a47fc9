//! Bounded conversation history and snapshots

mod message_history;
mod snapshot;

pub use message_history::{
    estimate_tokens, MessageHistory, TurnContent, TurnCost, MISSING_RESULT, TRUNCATION_NOTICE,
    TRUNCATION_NOTICE_TOKENS,
};
pub use snapshot::ConversationSnapshot;
