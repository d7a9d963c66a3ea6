//! Error types for the AI crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ServiceError`: a single failed (or abandoned) call to an external
//!   generation or embedding service
//! - `AiError`: high-level wrapper naming the operation that failed

use std::fmt;

/// Errors from generation and embedding service calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Provider is unreachable.
    ProviderUnavailable { provider: String, reason: String },
    /// Request was rejected or failed in transport.
    RequestFailed { reason: String },
    /// Response body could not be interpreted.
    ResponseParseFailed { reason: String },
    /// The service asked us to slow down.
    RateLimited { retry_after_secs: Option<u64> },
    /// Adapter configuration is unusable.
    InvalidConfig { reason: String },
    /// An embedding came back with a different length than earlier ones.
    DimensionMismatch { expected: usize, actual: usize },
    /// Gave up after repeated rate limiting.
    RetriesExhausted { attempts: u32 },
    /// The caller's overall deadline elapsed.
    Timeout,
    /// The caller cancelled the call.
    Cancelled,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => write!(f, "service request failed: {reason}"),
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse service response: {reason}")
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidConfig { reason } => write!(f, "invalid adapter configuration: {reason}"),
            Self::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "embedding dimension mismatch: expected {expected}, got {actual}"
                )
            }
            Self::RetriesExhausted { attempts } => {
                write!(f, "still rate limited after {attempts} attempts")
            }
            Self::Timeout => write!(f, "service call timed out"),
            Self::Cancelled => write!(f, "service call cancelled"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// High-level AI operation errors.
///
/// Use these to add context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// Generating a reply failed (use as context wrapper).
    Generation { model: String },
    /// Embedding a text failed (use as context wrapper).
    Embedding { engine: String },
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation { model } => write!(f, "generation with model '{model}' failed"),
            Self::Embedding { engine } => write!(f, "embedding with engine '{engine}' failed"),
        }
    }
}

impl std::error::Error for AiError {}
