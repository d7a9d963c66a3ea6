//! Conversation manager configuration.

use colloquy_ai::{DEFAULT_EMBEDDING_ENGINE, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Default generation model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default token budget for the whole log.
pub const DEFAULT_MAX_TOKENS: usize = 2000;

/// Settings for a [`ConversationManager`](crate::ConversationManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Generation model; also selects the token accounting scheme.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature passed to the generation service.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on the estimated token cost of the log.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Engine identifier for the embedding service.
    #[serde(default = "default_embedding_engine")]
    pub embedding_engine: String,
    /// Rate-limit retry behavior for both services.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_embedding_engine() -> String {
    DEFAULT_EMBEDDING_ENGINE.to_string()
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            embedding_engine: default_embedding_engine(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ConversationConfig {
    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the token budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
