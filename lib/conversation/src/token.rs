//! Token accounting for conversation logs.
//!
//! Cost of a log for a model:
//!
//! ```text
//! sum over turns (tokens_per_message + encoded_len(content)) + REPLY_PRIMER_TOKENS
//! ```
//!
//! `tokens_per_message` depends on the model's dated accounting scheme.
//! Undated aliases (`gpt-4`, `gpt-3.5-turbo`, `*-latest`) resolve to a
//! dated scheme first. A model without a scheme is rejected; a scheme
//! without a known encoding falls back to `cl100k_base`.

use crate::error::TokenCountError;
use crate::turn::Turn;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

/// Tokens that prime every reply (`<|start|>assistant<|message|>`).
pub const REPLY_PRIMER_TOKENS: usize = 3;

/// Encoding used when a model's own encoding is unknown.
pub const FALLBACK_ENCODING: &str = "cl100k_base";

const MAX_ALIAS_DEPTH: usize = 4;

/// Per-model accounting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheme {
    /// Dated model identifier the rules apply to.
    pub model: &'static str,
    /// Framing overhead added for every message.
    pub tokens_per_message: usize,
}

// every message follows <|start|>{role/name}\n{content}<|end|>\n
const SCHEMES: &[Scheme] = &[
    Scheme {
        model: "gpt-3.5-turbo-0301",
        tokens_per_message: 4,
    },
    Scheme {
        model: "gpt-3.5-turbo-0613",
        tokens_per_message: 3,
    },
    Scheme {
        model: "gpt-3.5-turbo-16k-0613",
        tokens_per_message: 3,
    },
    Scheme {
        model: "gpt-4-0314",
        tokens_per_message: 3,
    },
    Scheme {
        model: "gpt-4-32k-0314",
        tokens_per_message: 3,
    },
    Scheme {
        model: "gpt-4-0613",
        tokens_per_message: 3,
    },
    Scheme {
        model: "gpt-4-32k-0613",
        tokens_per_message: 3,
    },
];

// Undated names move over time; count as their oldest dated snapshot.
const ALIASES: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "gpt-3.5-turbo-0301"),
    ("gpt-3.5-turbo-16k", "gpt-3.5-turbo-16k-0613"),
    ("gpt-4", "gpt-4-0314"),
    ("gpt-4-32k", "gpt-4-32k-0314"),
];

impl Scheme {
    /// Resolves the accounting scheme for `model_id`, following aliases.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedModel` when no scheme exists for the model family.
    pub fn for_model(model_id: &str) -> Result<&'static Scheme, TokenCountError> {
        let mut current = model_id;
        for _ in 0..=MAX_ALIAS_DEPTH {
            if let Some(scheme) = SCHEMES.iter().find(|s| s.model == current) {
                return Ok(scheme);
            }
            let target = ALIASES
                .iter()
                .find(|(alias, _)| *alias == current)
                .map(|(_, target)| *target)
                .or_else(|| current.strip_suffix("-latest"));
            match target {
                Some(target) => {
                    warn!(
                        model = current,
                        resolved = target,
                        "model may change over time, counting tokens as {target}"
                    );
                    current = target;
                }
                None => break,
            }
        }
        Err(TokenCountError::UnsupportedModel {
            model: model_id.to_string(),
        })
    }
}

fn encodings() -> &'static Mutex<HashMap<&'static str, Arc<CoreBPE>>> {
    static ENCODINGS: OnceLock<Mutex<HashMap<&'static str, Arc<CoreBPE>>>> = OnceLock::new();
    ENCODINGS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn load_encoding(scheme: &Scheme) -> Result<Arc<CoreBPE>, TokenCountError> {
    let mut cache = encodings().lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(bpe) = cache.get(scheme.model) {
        return Ok(Arc::clone(bpe));
    }

    let bpe = match tiktoken_rs::get_bpe_from_model(scheme.model) {
        Ok(bpe) => bpe,
        Err(e) => {
            warn!(
                model = scheme.model,
                error = %e,
                "model encoding not found, using {FALLBACK_ENCODING}"
            );
            tiktoken_rs::cl100k_base().map_err(|e| TokenCountError::EncodingUnavailable {
                model: scheme.model.to_string(),
                reason: e.to_string(),
            })?
        }
    };
    let bpe = Arc::new(bpe);
    cache.insert(scheme.model, Arc::clone(&bpe));
    Ok(bpe)
}

/// Estimates the token cost of turns for one model.
///
/// Construction resolves the model, so counting itself cannot fail.
#[derive(Clone)]
pub struct TokenCounter {
    model_id: String,
    scheme: &'static Scheme,
    bpe: Arc<CoreBPE>,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("model_id", &self.model_id)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl TokenCounter {
    /// Creates a counter for `model_id`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedModel` for an unknown model family, or
    /// `EncodingUnavailable` if no encoding can be loaded at all.
    pub fn for_model(model_id: &str) -> colloquy_core::Result<Self, TokenCountError> {
        let scheme = Scheme::for_model(model_id)?;
        let bpe = load_encoding(scheme)?;
        debug!(model = model_id, scheme = scheme.model, "token counter ready");
        Ok(Self {
            model_id: model_id.to_string(),
            scheme,
            bpe,
        })
    }

    /// The model identifier this counter was created for.
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// The resolved accounting scheme.
    #[must_use]
    pub fn scheme(&self) -> &'static Scheme {
        self.scheme
    }

    /// Number of tokens `text` encodes to.
    ///
    /// Special-token markup in `text` is counted as the literal characters
    /// the service receives.
    #[must_use]
    pub fn encoded_len(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Cost of a single turn inside a log, excluding the reply primer.
    #[must_use]
    pub fn turn_cost(&self, turn: &Turn) -> usize {
        self.scheme.tokens_per_message + self.encoded_len(turn.content())
    }

    /// Cost of a whole log, including the reply primer.
    #[must_use]
    pub fn count<'a>(&self, turns: impl IntoIterator<Item = &'a Turn>) -> usize {
        turns
            .into_iter()
            .map(|turn| self.turn_cost(turn))
            .sum::<usize>()
            + REPLY_PRIMER_TOKENS
    }
}

/// Counts the tokens of `turns` for `model_id` in one step.
///
/// # Errors
///
/// Same as [`TokenCounter::for_model`].
pub fn count_tokens(turns: &[Turn], model_id: &str) -> colloquy_core::Result<usize, TokenCountError> {
    Ok(TokenCounter::for_model(model_id)?.count(turns))
}
