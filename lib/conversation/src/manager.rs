//! The conversation manager.
//!
//! A [`ConversationManager`] owns an ordered log of turns and keeps its
//! estimated token cost within a budget. After every append the oldest
//! turns are evicted until the log fits again or one turn is left. A system
//! turn, when present, is always at index 0 and is never evicted while any
//! other turn remains.
//!
//! All logging happens inside the span the manager was built with, so the
//! caller decides where conversation events end up.

use crate::config::ConversationConfig;
use crate::error::{ConversationError, PersistenceError};
use crate::persistence;
use crate::token::TokenCounter;
use crate::turn::{Turn, TurnRecord};
use colloquy_ai::{
    CancellationToken, Embedder, EmbeddingBackend, GenerationBackend, GenerationRequest, Retrier,
    Role,
};
use colloquy_core::ConversationId;
use rootcause::prelude::ResultExt;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, Span, debug, error, info, info_span};

/// Builder for [`ConversationManager`].
#[must_use]
pub struct ConversationManagerBuilder {
    config: ConversationConfig,
    generation: Arc<dyn GenerationBackend>,
    embedding: Arc<dyn EmbeddingBackend>,
    cancel: Option<CancellationToken>,
    span: Option<Span>,
}

impl ConversationManagerBuilder {
    /// Shares `token` with every service call the manager makes.
    /// Cancelling it aborts in-flight retries.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs every manager operation inside `span`.
    ///
    /// Defaults to an `info` span named `conversation` carrying the
    /// conversation id and model.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Validates the configuration and creates an empty manager.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the budget is zero or the model has no
    /// token accounting scheme.
    pub fn build(self) -> colloquy_core::Result<ConversationManager, ConversationError> {
        let config = self.config;
        if config.max_tokens == 0 {
            return Err(ConversationError::InvalidConfig {
                reason: "max_tokens must be greater than zero".to_string(),
            }
            .into());
        }
        let counter =
            TokenCounter::for_model(&config.model).context(ConversationError::InvalidConfig {
                reason: format!("cannot count tokens for model '{}'", config.model),
            })?;

        let cancel = self.cancel.unwrap_or_default();
        let retrier = Retrier::new(config.retry.clone()).with_cancellation(cancel);
        let embedder = Embedder::new(
            self.embedding,
            config.embedding_engine.clone(),
            retrier.clone(),
        );

        let id = ConversationId::new();
        let span = self
            .span
            .unwrap_or_else(|| info_span!("conversation", id = %id, model = %config.model));

        span.in_scope(|| {
            debug!(
                max_tokens = config.max_tokens,
                temperature = config.temperature,
                "conversation manager ready"
            );
        });

        Ok(ConversationManager {
            id,
            config,
            turns: Vec::new(),
            counter,
            embedder,
            generator: self.generation,
            retrier,
            span,
        })
    }
}

/// A token-budgeted conversation log with generation and search.
///
/// Not safe for concurrent mutation; every mutating operation takes
/// `&mut self`.
pub struct ConversationManager {
    id: ConversationId,
    config: ConversationConfig,
    turns: Vec<Turn>,
    counter: TokenCounter,
    embedder: Embedder,
    generator: Arc<dyn GenerationBackend>,
    retrier: Retrier,
    span: Span,
}

impl fmt::Debug for ConversationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationManager")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("turns", &self.turns.len())
            .field("generator", &self.generator.provider())
            .finish_non_exhaustive()
    }
}

impl ConversationManager {
    /// Starts building a manager that talks to the given services.
    pub fn builder(
        config: ConversationConfig,
        generation: Arc<dyn GenerationBackend>,
        embedding: Arc<dyn EmbeddingBackend>,
    ) -> ConversationManagerBuilder {
        ConversationManagerBuilder {
            config,
            generation,
            embedding,
            cancel: None,
            span: None,
        }
    }

    /// Identifier of this conversation, used in log output.
    #[must_use]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Generation model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sampling temperature.
    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.config.temperature
    }

    /// Token budget.
    #[must_use]
    pub fn max_tokens(&self) -> usize {
        self.config.max_tokens
    }

    /// The embedder turns are embedded with.
    #[must_use]
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Token shared by every service call; cancel it to abort retries.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.retrier.cancellation_token()
    }

    /// The log, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The pinned system turn, if any.
    #[must_use]
    pub fn system_turn(&self) -> Option<&Turn> {
        self.turns.first().filter(|turn| turn.role() == Role::System)
    }

    /// The turn at `position`.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchTurn` when `position` is past the end of the log.
    pub fn turn_at(&self, position: usize) -> colloquy_core::Result<&Turn, ConversationError> {
        self.turns.get(position).ok_or_else(|| {
            ConversationError::NoSuchTurn {
                position,
                len: self.turns.len(),
            }
            .into()
        })
    }

    /// The most recent turn spoken by `role`.
    #[must_use]
    pub fn latest(&self, role: Role) -> Option<&Turn> {
        self.turns.iter().rev().find(|turn| turn.role() == role)
    }

    /// Every turn rendered as `role: content`, one per line.
    #[must_use]
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Estimated token cost of the whole log.
    #[must_use]
    pub fn total_tokens(&self) -> usize {
        self.counter.count(&self.turns)
    }

    /// Changes the budget and evicts turns until the log fits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero budget; the old budget is kept.
    pub fn set_max_tokens(
        &mut self,
        max_tokens: usize,
    ) -> colloquy_core::Result<(), ConversationError> {
        if max_tokens == 0 {
            return Err(ConversationError::InvalidConfig {
                reason: "max_tokens must be greater than zero".to_string(),
            }
            .into());
        }
        self.config.max_tokens = max_tokens;
        self.enforce_budget();
        Ok(())
    }

    /// Replaces the log with a single system turn.
    ///
    /// # Errors
    ///
    /// Returns the embedding failure; the log is left untouched.
    pub async fn initialize(
        &mut self,
        system_text: impl Into<String>,
    ) -> colloquy_core::Result<(), ConversationError> {
        let span = self.span.clone();
        self.replace_with_system(system_text.into())
            .instrument(span)
            .await
    }

    async fn replace_with_system(
        &mut self,
        text: String,
    ) -> colloquy_core::Result<(), ConversationError> {
        let turn = Turn::new(Role::System, text, &self.embedder)
            .await
            .context(ConversationError::Append { role: Role::System })?;
        let turn_tokens = self.counter.turn_cost(&turn);
        let turn_id = turn.id();
        self.turns = vec![turn];
        info!(
            turn = %turn_id,
            turn_tokens,
            total_tokens = self.total_tokens(),
            "initialized conversation"
        );
        Ok(())
    }

    /// Empties the log, system turn included.
    pub fn reset(&mut self) {
        let removed = self.turns.len();
        self.turns.clear();
        self.span.in_scope(|| info!(removed, "reset conversation"));
    }

    /// Appends a user turn, then enforces the budget.
    ///
    /// # Errors
    ///
    /// Returns the embedding failure; the log is left untouched.
    pub async fn append_user(
        &mut self,
        text: impl Into<String>,
    ) -> colloquy_core::Result<(), ConversationError> {
        let span = self.span.clone();
        self.append(Role::User, text.into()).instrument(span).await
    }

    /// Appends an assistant turn, then enforces the budget.
    ///
    /// # Errors
    ///
    /// Returns the embedding failure; the log is left untouched.
    pub async fn append_assistant(
        &mut self,
        text: impl Into<String>,
    ) -> colloquy_core::Result<(), ConversationError> {
        let span = self.span.clone();
        self.append(Role::Assistant, text.into())
            .instrument(span)
            .await
    }

    /// Sets the system turn, then enforces the budget.
    ///
    /// There is at most one system turn. An existing one is replaced in
    /// place; otherwise the new turn is inserted at index 0.
    ///
    /// # Errors
    ///
    /// Returns the embedding failure; the log is left untouched.
    pub async fn append_system(
        &mut self,
        text: impl Into<String>,
    ) -> colloquy_core::Result<(), ConversationError> {
        let span = self.span.clone();
        self.append(Role::System, text.into()).instrument(span).await
    }

    async fn append(
        &mut self,
        role: Role,
        text: String,
    ) -> colloquy_core::Result<(), ConversationError> {
        let turn = Turn::new(role, text, &self.embedder)
            .await
            .context(ConversationError::Append { role })?;
        let turn_tokens = self.counter.turn_cost(&turn);
        let turn_id = turn.id();

        if role == Role::System {
            if self.system_turn().is_some() {
                self.turns[0] = turn;
            } else {
                self.turns.insert(0, turn);
            }
        } else {
            self.turns.push(turn);
        }

        info!(
            turn = %turn_id,
            role = %role,
            turn_tokens,
            total_tokens = self.total_tokens(),
            "appended turn"
        );
        self.enforce_budget();
        Ok(())
    }

    // Evicts from the front, after the pinned system turn, until the log
    // fits the budget or a single turn is left.
    fn enforce_budget(&mut self) {
        let mut total = self.total_tokens();
        if total <= self.config.max_tokens {
            return;
        }
        let first_evictable = usize::from(self.system_turn().is_some());
        let _guard = self.span.enter();
        while total > self.config.max_tokens && self.turns.len() > 1 {
            let removed = self.turns.remove(first_evictable);
            let removed_tokens = self.counter.turn_cost(&removed);
            total -= removed_tokens;
            info!(
                turn = %removed.id(),
                role = %removed.role(),
                removed_tokens,
                remaining_tokens = total,
                "evicted turn"
            );
        }
    }

    /// Asks the generation service to continue the conversation and
    /// appends the reply as an assistant turn.
    ///
    /// # Errors
    ///
    /// Returns `Generation` when the service fails (after rate-limit
    /// retries, cancellation or timeout), or `Append` when the reply cannot
    /// be embedded. The log is unchanged in both cases.
    pub async fn try_generate_response(
        &mut self,
    ) -> colloquy_core::Result<String, ConversationError> {
        let span = self.span.clone();
        self.generate().instrument(span).await
    }

    async fn generate(&mut self) -> colloquy_core::Result<String, ConversationError> {
        let request = GenerationRequest::new(
            self.config.model.clone(),
            self.turns.iter().map(Turn::to_message).collect(),
            self.config.temperature,
        );
        debug!(messages = request.messages.len(), "requesting response");

        let response = self
            .retrier
            .call("generate", || self.generator.generate(&request))
            .await
            .context(ConversationError::Generation {
                model: self.config.model.clone(),
            })?;
        if let Some(usage) = &response.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "service reported usage"
            );
        }

        self.append(Role::Assistant, response.content.clone())
            .await?;
        Ok(response.content)
    }

    /// Like [`try_generate_response`](Self::try_generate_response), but any
    /// failure is logged and an empty string returned instead.
    pub async fn generate_response(&mut self) -> String {
        match self.try_generate_response().await {
            Ok(reply) => reply,
            Err(report) => {
                self.span
                    .in_scope(|| error!(error = %report, "response generation failed"));
                String::new()
            }
        }
    }

    /// Turns whose content contains `query`, ignoring case, oldest first.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Turn> {
        let needle = query.to_lowercase();
        let matches: Vec<&Turn> = self
            .turns
            .iter()
            .filter(|turn| turn.content().to_lowercase().contains(&needle))
            .collect();
        self.span
            .in_scope(|| debug!(query, matches = matches.len(), "searched conversation"));
        matches
    }

    /// Writes the log to `path` as a JSON array of `{role, content}`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> colloquy_core::Result<(), PersistenceError> {
        let records: Vec<TurnRecord> = self.turns.iter().map(Turn::to_record).collect();
        self.span
            .in_scope(|| persistence::write_log(path.as_ref(), &records))
    }

    /// Replaces the log with the one stored at `path`.
    ///
    /// The loaded log is not trimmed to the budget, and no embeddings are
    /// requested; each turn is embedded on first use. Those embeddings are
    /// not guaranteed to equal the ones computed before the log was saved.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Malformed`; the current log is left untouched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> colloquy_core::Result<(), PersistenceError> {
        let _entered = self.span.clone().entered();
        let records = persistence::read_log(path.as_ref())?;
        self.turns = records.into_iter().map(Turn::from_record).collect();
        info!(
            turns = self.turns.len(),
            total_tokens = self.total_tokens(),
            "loaded conversation"
        );
        Ok(())
    }
}
