//! Command handling for the interactive chat.

use crate::command::Command;
use colloquy_conversation::{ConversationError, ConversationManager, Turn};
use rootcause::Report;
use std::path::PathBuf;
use tracing::info;

/// What the input loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Print this and read the next line.
    Reply(String),
    /// Read the next line.
    Silent,
    /// Stop.
    Quit,
}

/// Connects parsed commands to a conversation manager.
///
/// By default the conversation accumulates history. An amnesic shell
/// starts over after every reply, keeping only the system prompt.
#[derive(Debug)]
pub struct Shell {
    manager: ConversationManager,
    system_prompt: Option<String>,
    log_path: PathBuf,
    amnesic: bool,
}

impl Shell {
    pub fn new(
        manager: ConversationManager,
        system_prompt: Option<String>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            manager,
            system_prompt,
            log_path,
            amnesic: false,
        }
    }

    pub fn with_amnesia(mut self, amnesic: bool) -> Self {
        self.amnesic = amnesic;
        self
    }

    pub fn manager(&self) -> &ConversationManager {
        &self.manager
    }

    /// Pins the configured system prompt, if any.
    pub async fn start(&mut self) -> Result<(), Report<ConversationError>> {
        if let Some(prompt) = &self.system_prompt {
            self.manager.initialize(prompt.clone()).await?;
        }
        Ok(())
    }

    pub async fn handle(&mut self, command: Command) -> Outcome {
        match command {
            Command::Say(text) => self.say(text).await,
            Command::PrintMessage(position) => match self.manager.turn_at(position) {
                Ok(turn) => Outcome::Reply(format!(
                    "Message at position {position}: {}",
                    turn.content()
                )),
                Err(_) => Outcome::Reply(
                    "Invalid position. Please enter a valid position.".to_string(),
                ),
            },
            Command::Search(query) => {
                let hits = self.manager.search(&query);
                if hits.is_empty() {
                    Outcome::Reply(format!("No messages contain '{query}'."))
                } else {
                    Outcome::Reply(render(hits))
                }
            }
            Command::Save(path) => {
                let path = path.unwrap_or_else(|| self.log_path.clone());
                match self.manager.save(&path) {
                    Ok(()) => Outcome::Reply(format!(
                        "Saved {} messages to {}.",
                        self.manager.len(),
                        path.display()
                    )),
                    Err(e) => Outcome::Reply(format!("error: {e}")),
                }
            }
            Command::Load(path) => {
                let path = path.unwrap_or_else(|| self.log_path.clone());
                match self.manager.load(&path) {
                    Ok(()) => Outcome::Reply(format!(
                        "Loaded {} messages from {}.",
                        self.manager.len(),
                        path.display()
                    )),
                    Err(e) => Outcome::Reply(format!("error: {e}")),
                }
            }
            Command::Reset => {
                self.manager.reset();
                match self.start().await {
                    Ok(()) => Outcome::Reply("Conversation reset.".to_string()),
                    Err(e) => Outcome::Reply(format!("error: {e}")),
                }
            }
            Command::Log => {
                if self.manager.is_empty() {
                    Outcome::Reply("(empty)".to_string())
                } else {
                    Outcome::Reply(self.manager.transcript())
                }
            }
            Command::Quit => Outcome::Quit,
            Command::Empty => Outcome::Silent,
        }
    }

    async fn say(&mut self, text: String) -> Outcome {
        if let Err(e) = self.manager.append_user(text).await {
            return Outcome::Reply(format!("error: {e}"));
        }
        let reply = self.manager.generate_response().await;
        info!(
            turns = self.manager.len(),
            total_tokens = self.manager.total_tokens(),
            "exchange complete"
        );
        if self.amnesic {
            self.manager.reset();
            if let Err(e) = self.start().await {
                return Outcome::Reply(format!("error: {e}"));
            }
        }
        if reply.is_empty() {
            Outcome::Reply("(no response, see log output for details)".to_string())
        } else {
            Outcome::Reply(reply)
        }
    }
}

fn render(turns: Vec<&Turn>) -> String {
    turns
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
