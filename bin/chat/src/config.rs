//! Chat client configuration.
//!
//! Loaded via the `config` crate from an optional `colloquy.toml` in the
//! working directory, overlaid with `COLLOQUY__`-prefixed environment
//! variables (`COLLOQUY__OPENAI__API_KEY`, `COLLOQUY__CONVERSATION__MODEL`).

use colloquy_ai::OpenAiConfig;
use colloquy_conversation::ConversationConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Default configuration file name, looked up without extension.
pub const DEFAULT_CONFIG_FILE: &str = "colloquy";

/// Chat client configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ChatConfig {
    /// Generation and embedding service connection.
    pub openai: OpenAiConfig,

    /// Conversation manager settings.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// System prompt pinned at the start of the conversation.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Forget the conversation after every reply.
    #[serde(default)]
    pub amnesic: bool,

    /// Where `/save` and `/load` go when no path is given.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("chat_log.json")
}

impl ChatConfig {
    /// Loads configuration from `colloquy.toml` (if present) and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder
            .add_source(
                config::Environment::with_prefix("COLLOQUY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}
