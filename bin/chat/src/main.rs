//! Interactive terminal chat.
//!
//! Reads lines from stdin, sends them to the configured OpenAI-compatible
//! service through a token-budgeted conversation, and prints the replies.
//! Ctrl-C aborts any in-flight request and ends the session.

mod command;
mod config;
mod shell;

use colloquy_ai::OpenAiClient;
use colloquy_conversation::ConversationManager;
use config::ChatConfig;
use shell::{Outcome, Shell};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROMPT: &str = ":: ";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match ChatConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        model = %config.conversation.model,
        max_tokens = config.conversation.max_tokens,
        "loaded configuration"
    );

    let client = match OpenAiClient::new(config.openai.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to create service client");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let manager =
        match ConversationManager::builder(config.conversation.clone(), client.clone(), client)
            .cancellation_token(cancel.clone())
            .build()
        {
            Ok(manager) => manager,
            Err(e) => {
                tracing::error!(error = %e, "failed to create conversation");
                return ExitCode::FAILURE;
            }
        };

    let mut shell =
        Shell::new(manager, config.system_prompt, config.log_path).with_amnesia(config.amnesic);
    if let Err(e) = shell.start().await {
        tracing::error!(error = %e, "failed to pin system prompt");
        return ExitCode::FAILURE;
    }

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling pending requests");
            interrupt.cancel();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{PROMPT}");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read input");
                return ExitCode::FAILURE;
            }
        };

        let command = match command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match shell.handle(command).await {
            Outcome::Reply(text) => println!("{text}"),
            Outcome::Silent => {}
            Outcome::Quit => break,
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    tracing::info!(
        conversation = %shell.manager().id(),
        turns = shell.manager().len(),
        "session ended"
    );
    ExitCode::SUCCESS
}
