//! Input line parsing.
//!
//! Anything that is not a recognized command is sent to the conversation
//! as a user message.

use std::fmt;
use std::path::PathBuf;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send text to the assistant.
    Say(String),
    /// Show the turn at a position (`print_message <n>`).
    PrintMessage(usize),
    /// List turns containing a phrase (`/search <text>`).
    Search(String),
    /// Save the log (`/save [path]`).
    Save(Option<PathBuf>),
    /// Replace the log with a saved one (`/load [path]`).
    Load(Option<PathBuf>),
    /// Start over, keeping the configured system prompt (`/reset`).
    Reset,
    /// Print the whole log (`/log`).
    Log,
    /// Leave (`/quit`, `/exit`).
    Quit,
    /// Blank line.
    Empty,
}

/// Errors from parsing an input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// `print_message` without a valid non-negative position.
    InvalidPosition { value: String },
    /// A command that needs an argument got none.
    MissingArgument { command: &'static str },
    /// A `/` command that does not exist.
    Unknown { command: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPosition { value } => write!(
                f,
                "invalid position '{value}', please enter a valid position"
            ),
            Self::MissingArgument { command } => write!(f, "{command} needs an argument"),
            Self::Unknown { command } => write!(f, "unknown command '{command}'"),
        }
    }
}

impl std::error::Error for CommandError {}

fn optional_path(rest: &str) -> Option<PathBuf> {
    (!rest.is_empty()).then(|| PathBuf::from(rest))
}

/// Parses one input line.
///
/// # Errors
///
/// Returns `CommandError` for a malformed or unknown command.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }

    if let Some(rest) = line.strip_prefix("print_message") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let value = rest.trim();
            return value
                .parse()
                .map(Command::PrintMessage)
                .map_err(|_| CommandError::InvalidPosition {
                    value: value.to_string(),
                });
        }
    }

    let Some(command_line) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };
    let (name, rest) = command_line
        .split_once(char::is_whitespace)
        .map_or((command_line, ""), |(name, rest)| (name, rest.trim()));

    match name {
        "search" if rest.is_empty() => Err(CommandError::MissingArgument { command: "/search" }),
        "search" => Ok(Command::Search(rest.to_string())),
        "save" => Ok(Command::Save(optional_path(rest))),
        "load" => Ok(Command::Load(optional_path(rest))),
        "reset" => Ok(Command::Reset),
        "log" => Ok(Command::Log),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown {
            command: format!("/{other}"),
        }),
    }
}
