//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `TokenCountError`: the token counter cannot account for a model
//! - `PersistenceError`: saving or loading the log failed
//! - `ConversationError`: high-level wrapper naming the manager operation

use colloquy_ai::Role;
use std::fmt;
use std::path::PathBuf;

/// Errors from token accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCountError {
    /// No accounting rules exist for this model family.
    UnsupportedModel { model: String },
    /// Neither the model's encoding nor the fallback could be loaded.
    EncodingUnavailable { model: String, reason: String },
}

impl fmt::Display for TokenCountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedModel { model } => {
                write!(f, "token counting is not supported for model '{model}'")
            }
            Self::EncodingUnavailable { model, reason } => {
                write!(f, "no token encoding available for model '{model}': {reason}")
            }
        }
    }
}

impl std::error::Error for TokenCountError {}

/// Errors from saving or loading a conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// Reading or writing the file failed.
    Io { path: PathBuf, reason: String },
    /// The file does not hold a valid log.
    Malformed { path: PathBuf, reason: String },
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => {
                write!(f, "conversation log I/O failed for {}: {reason}", path.display())
            }
            Self::Malformed { path, reason } => {
                write!(f, "malformed conversation log {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for PersistenceError {}

/// High-level conversation errors.
///
/// Use these to add context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// The manager configuration is unusable.
    InvalidConfig { reason: String },
    /// Appending a turn failed (use as context wrapper).
    Append { role: Role },
    /// Generating a reply failed (use as context wrapper).
    Generation { model: String },
    /// No turn exists at the requested position.
    NoSuchTurn { position: usize, len: usize },
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => {
                write!(f, "invalid conversation configuration: {reason}")
            }
            Self::Append { role } => write!(f, "failed to append {role} turn"),
            Self::Generation { model } => {
                write!(f, "failed to generate a response with model '{model}'")
            }
            Self::NoSuchTurn { position, len } => {
                write!(f, "no turn at position {position}, log has {len} turns")
            }
        }
    }
}

impl std::error::Error for ConversationError {}
