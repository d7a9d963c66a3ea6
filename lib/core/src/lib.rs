//! Core types shared by the colloquy crates.
//!
//! This crate holds the identifiers and the report-based `Result` alias that
//! the adapter and conversation crates build on.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, ParseIdError, TurnId};
