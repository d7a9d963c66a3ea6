//! Conversation turns.
//!
//! A turn is one contribution to the conversation. Its role and content are
//! fixed at creation. The embedding is fetched once, eagerly when a turn is
//! created through [`Turn::new`], or on first use for turns rebuilt from a
//! persisted [`TurnRecord`].

use colloquy_ai::{AiError, ChatMessage, Embedder, Embedding, Role, ServiceError};
use colloquy_core::TurnId;
use rootcause::prelude::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::OnceCell;

/// One message in the conversation log.
#[derive(Debug, Clone)]
pub struct Turn {
    id: TurnId,
    role: Role,
    content: String,
    embedding: OnceCell<Embedding>,
}

impl Turn {
    /// Creates a turn, embedding its content right away.
    ///
    /// # Errors
    ///
    /// Returns the embedding failure; no turn is created in that case.
    pub async fn new(
        role: Role,
        content: impl Into<String>,
        embedder: &Embedder,
    ) -> colloquy_core::Result<Self, AiError> {
        let content = content.into();
        let embedding = embedder.embed(&content).await?;
        Ok(Self {
            id: TurnId::new(),
            role,
            content,
            embedding: OnceCell::from(embedding),
        })
    }

    /// Rebuilds a turn from its persisted form without calling the
    /// embedding service.
    ///
    /// The embedding is computed on first use and may differ from the one
    /// computed before the record was saved if the embedding service or
    /// engine has changed in between.
    #[must_use]
    pub fn from_record(record: TurnRecord) -> Self {
        Self {
            id: TurnId::new(),
            role: record.role,
            content: record.content,
            embedding: OnceCell::new(),
        }
    }

    /// Unique identifier of this turn, used to follow it through log output.
    #[must_use]
    pub fn id(&self) -> TurnId {
        self.id
    }

    /// Who spoke.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// What was said.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The embedding, if it has been computed.
    #[must_use]
    pub fn cached_embedding(&self) -> Option<&Embedding> {
        self.embedding.get()
    }

    /// The embedding, computing it now if this turn was loaded from disk.
    ///
    /// # Errors
    ///
    /// Returns the embedding failure. A later call will try again.
    pub async fn embedding(&self, embedder: &Embedder) -> colloquy_core::Result<&Embedding, AiError> {
        self.embedding
            .get_or_try_init(|| embedder.embed(&self.content))
            .await
    }

    /// Cosine similarity between this turn and `other_text`, in `[-1, 1]`.
    ///
    /// `other_text` is embedded afresh on every call; nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns the embedding failure, or `DimensionMismatch` if this turn
    /// was embedded by a differently configured embedder.
    pub async fn semantic_similarity(
        &self,
        other_text: &str,
        embedder: &Embedder,
    ) -> colloquy_core::Result<f32, AiError> {
        let own = self.embedding(embedder).await?;
        let other = embedder.embed(other_text).await?;
        own.cosine_similarity(&other)
            .ok_or(ServiceError::DimensionMismatch {
                expected: own.dim(),
                actual: other.dim(),
            })
            .context(AiError::Embedding {
                engine: embedder.engine().to_string(),
            })
    }

    /// The persisted form of this turn.
    #[must_use]
    pub fn to_record(&self) -> TurnRecord {
        TurnRecord {
            role: self.role,
            content: self.content.clone(),
        }
    }

    /// The form sent to the generation service.
    #[must_use]
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

/// The persisted form of a turn: role and content only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnRecord {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl TurnRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingEmbeddings, embedder};
    use std::sync::Arc;

    #[tokio::test]
    async fn new_turn_embeds_exactly_once() {
        let backend = Arc::new(CountingEmbeddings::default());
        let embedder = embedder(&backend);

        let turn = Turn::new(Role::User, "Hello, how are you?", &embedder)
            .await
            .expect("turn");

        assert_eq!(backend.calls(), 1);
        assert!(turn.cached_embedding().is_some());
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.content(), "Hello, how are you?");
    }

    #[tokio::test]
    async fn every_turn_gets_its_own_id() {
        let backend = Arc::new(CountingEmbeddings::default());
        let embedder = embedder(&backend);
        let a = Turn::new(Role::User, "Hi", &embedder).await.expect("turn");
        let b = Turn::new(Role::User, "Hi", &embedder).await.expect("turn");
        let loaded = Turn::from_record(a.to_record());

        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), loaded.id());
        assert!(a.id().to_string().starts_with("turn_"));
    }

    #[tokio::test]
    async fn display_matches_role_and_content() {
        let backend = Arc::new(CountingEmbeddings::default());
        let turn = Turn::new(Role::User, "Hello, how are you?", &embedder(&backend))
            .await
            .expect("turn");
        assert_eq!(turn.to_string(), "user: Hello, how are you?");
    }

    #[tokio::test]
    async fn similarity_with_own_content_is_one() {
        let backend = Arc::new(CountingEmbeddings::default());
        let embedder = embedder(&backend);
        let turn = Turn::new(Role::Assistant, "The weather is sunny.", &embedder)
            .await
            .expect("turn");

        let sim = turn
            .semantic_similarity("The weather is sunny.", &embedder)
            .await
            .expect("similarity");

        assert!((sim - 1.0).abs() < 1e-5, "got {sim}");
        // one at construction, one fresh call for the comparison text
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn similarity_is_never_cached() {
        let backend = Arc::new(CountingEmbeddings::default());
        let embedder = embedder(&backend);
        let turn = Turn::new(Role::User, "Hi", &embedder).await.expect("turn");

        for _ in 0..3 {
            let sim = turn
                .semantic_similarity("Hi, what's up?", &embedder)
                .await
                .expect("similarity");
            assert!((-1.0..=1.0).contains(&sim));
        }
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn loaded_turn_embeds_lazily() {
        let backend = Arc::new(CountingEmbeddings::default());
        let embedder = embedder(&backend);
        let turn = Turn::from_record(TurnRecord::new(Role::User, "Hi"));

        assert_eq!(backend.calls(), 0);
        assert!(turn.cached_embedding().is_none());

        turn.embedding(&embedder).await.expect("embedding");
        turn.embedding(&embedder).await.expect("embedding");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn failed_embedding_creates_no_turn() {
        let backend = Arc::new(CountingEmbeddings::failing());
        let result = Turn::new(Role::User, "Hi", &embedder(&backend)).await;
        assert!(result.is_err());
    }

    #[test]
    fn record_uses_only_role_and_content() {
        let record = TurnRecord::new(Role::User, "Hello, how are you?");
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"role": "user", "content": "Hello, how are you?"})
        );
    }

    #[test]
    fn record_rejects_extra_fields_and_bad_roles() {
        let extra = r#"{"role": "user", "content": "x", "embedding": [0.1]}"#;
        assert!(serde_json::from_str::<TurnRecord>(extra).is_err());
        let bad_role = r#"{"role": "bot", "content": "x"}"#;
        assert!(serde_json::from_str::<TurnRecord>(bad_role).is_err());
    }

    #[test]
    fn record_round_trips_through_turn() {
        let record = TurnRecord::new(Role::Assistant, "Hello!");
        let turn = Turn::from_record(record.clone());
        assert_eq!(turn.to_record(), record);
        assert_eq!(turn.to_message(), ChatMessage::new(Role::Assistant, "Hello!"));
    }
}
