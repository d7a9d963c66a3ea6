//! Token-budgeted conversation state for colloquy.
//!
//! This crate provides:
//!
//! - **Turns**: role-tagged messages with lazily or eagerly computed embeddings
//! - **Token Counter**: per-model estimate of a log's token cost
//! - **Conversation Manager**: the log itself, with budget eviction,
//!   generation, search and JSON persistence

pub mod config;
pub mod error;
pub mod manager;
pub mod persistence;
pub mod token;
pub mod turn;

#[cfg(test)]
mod test_support;

pub use colloquy_ai::Role;
pub use config::ConversationConfig;
pub use error::{ConversationError, PersistenceError, TokenCountError};
pub use manager::{ConversationManager, ConversationManagerBuilder};
pub use token::{REPLY_PRIMER_TOKENS, Scheme, TokenCounter, count_tokens};
pub use turn::{Turn, TurnRecord};
