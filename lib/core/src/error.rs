//! Error handling foundation for colloquy.
//!
//! Only the `Result` alias lives here. Each crate defines its own error
//! enums and layers context onto reports with `.context()` as errors move
//! from adapters up to the conversation manager.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
