//! Service adapters for colloquy.
//!
//! This crate provides the external collaborators a conversation depends on:
//!
//! - **Generation**: ordered messages in, reply text out
//! - **Embedding**: text in, fixed-length vector out
//! - **Retry**: bounded exponential backoff on rate limits, with caller
//!   cancellation and an optional deadline
//!
//! An OpenAI-compatible HTTP client implements both adapters.

pub mod backend;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod retry;

pub use backend::{
    ChatMessage, EmbeddingBackend, EmbeddingRequest, GenerationBackend, GenerationRequest,
    GenerationResponse, ParseRoleError, Role, TokenUsage,
};
pub use embedding::{DEFAULT_EMBEDDING_ENGINE, Embedder, Embedding, sanitize_for_transport};
pub use error::{AiError, ServiceError};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use retry::{Retrier, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
