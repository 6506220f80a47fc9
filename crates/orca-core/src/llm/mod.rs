//! Model RPC client and Messages API types

mod client;
mod types;

pub use client::{AnthropicClient, ModelClient};
pub use types::*;
