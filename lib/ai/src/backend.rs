//! Service adapter abstraction.
//!
//! Defines the two external collaborators a conversation talks to: a
//! generation service that turns an ordered message list into reply text,
//! and an embedding service that turns text into a fixed-length vector.

use crate::embedding::Embedding;
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
}

impl Role {
    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown role '{}', expected system, user or assistant",
            self.value
        )
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(ParseRoleError {
                value: s.to_string(),
            }),
        }
    }
}

/// A message as sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with the given role.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A request to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier.
    pub model: String,
    /// The ordered conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Temperature for sampling.
    pub temperature: f32,
}

impl GenerationRequest {
    /// Creates a request for the given model and messages.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
        }
    }
}

/// A response from the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// The generated text.
    pub content: String,
    /// Model that generated the response, as reported by the service.
    pub model: String,
    /// Token usage statistics, when the service reports them.
    pub usage: Option<TokenUsage>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens, saturating at `u32::MAX`.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// A request to the embedding service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Embedding engine identifier.
    pub engine: String,
    /// Text to embed.
    pub input: String,
}

/// Trait for generation services.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generates a reply for the given request.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RateLimited` when the service asks the caller
    /// to back off, and another variant for any other failure.
    async fn generate(&self, request: &GenerationRequest)
    -> Result<GenerationResponse, ServiceError>;

    /// Returns a short provider name for logs.
    fn provider(&self) -> &str;
}

/// Trait for embedding services.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embeds the request's input text.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::RateLimited` when the service asks the caller
    /// to back off, and another variant for any other failure.
    async fn embed(&self, request: &EmbeddingRequest) -> Result<Embedding, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("User".parse::<Role>(), Ok(Role::User));
        assert_eq!(" assistant ".parse::<Role>(), Ok(Role::Assistant));
        assert_eq!("SYSTEM".parse::<Role>(), Ok(Role::System));
    }

    #[test]
    fn role_rejects_unknown_values() {
        let err = "bot".parse::<Role>().unwrap_err();
        assert_eq!(err.value, "bot");
        assert!(err.to_string().contains("bot"));
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).expect("serialize");
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn token_usage_total_saturates() {
        let usage = TokenUsage {
            input_tokens: u32::MAX - 1,
            output_tokens: 10,
        };
        assert_eq!(usage.total(), u32::MAX);
    }

    #[test]
    fn generation_request_keeps_message_order() {
        let request = GenerationRequest::new(
            "gpt-4",
            vec![
                ChatMessage::new(Role::System, "Be brief."),
                ChatMessage::new(Role::User, "Hi"),
            ],
            0.2,
        );
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "Hi");
    }
}
