//! Terminal chat client.
//!
//! Plain lines are sent to the counterpart. Commands: `/login <id>`,
//! `/logout`, `/reopen` and `/quit`.

mod config;
mod error;
mod render;

use crate::config::CliConfig;
use crate::error::CliError;
use crate::render::Transcript;
use parley_conversation::{
    ChatClosed, ChatHandle, ChatState, ChatViewModel, ConversationChannel, InMemoryMessageStore,
    MessageStore, NatsMessageStore,
};
use parley_core::PrincipalId;
use parley_session::{LocalIdentityProvider, SessionManager};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> parley_core::Result<(), CliError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CliConfig::from_env().map_err(|e| CliError::Config {
        details: e.to_string(),
    })?;
    tracing::info!(counterpart = %config.channel.counterpart_id(), "loaded configuration");

    let store: Arc<dyn MessageStore> = match config.nats.clone() {
        Some(nats) => {
            tracing::info!(url = %nats.url, "connecting to NATS");
            let store = NatsMessageStore::connect(nats)
                .await
                .map_err(|report| CliError::Store {
                    details: report.to_string(),
                })?;
            Arc::new(store)
        }
        None => {
            tracing::info!("no NATS url configured, keeping messages in memory");
            Arc::new(InMemoryMessageStore::new())
        }
    };

    let provider = match config.principal_id.clone() {
        Some(principal) => LocalIdentityProvider::signed_in(principal),
        None => LocalIdentityProvider::new(),
    };
    let session = SessionManager::start(&provider);
    if config.principal_id.is_some() {
        // The view model binds to whichever principal is held when it starts.
        if let Err(report) = session.wait_for_principal().await {
            tracing::warn!(error = %report, "identity provider closed before sign-in");
        }
    }
    let channel = ConversationChannel::new(store, config.channel.clone());
    let handle = ChatViewModel::new(&session, channel).spawn();

    let printer = tokio::spawn(print_updates(
        handle.state(),
        Transcript::new(config.counterpart_label.clone()),
    ));

    let result = read_commands(&provider, &handle).await;

    handle.shutdown().await;
    session.shutdown();
    printer.abort();
    result
}

async fn read_commands(
    provider: &LocalIdentityProvider,
    handle: &ChatHandle,
) -> parley_core::Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = lines.next_line().await.map_err(|e| CliError::Input {
            details: e.to_string(),
        })?;
        let Some(line) = line else {
            break;
        };
        match run_line(provider, handle, line.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(ChatClosed) => {
                tracing::warn!("chat stopped unexpectedly");
                break;
            }
        }
    }
    Ok(())
}

/// Applies one input line. Returns false when the client should exit.
async fn run_line(
    provider: &LocalIdentityProvider,
    handle: &ChatHandle,
    line: &str,
) -> Result<bool, ChatClosed> {
    match line.split_once(' ').unwrap_or((line, "")) {
        ("/quit", _) => return Ok(false),
        ("/logout", _) => provider.sign_out(),
        ("/reopen", _) => handle.reopen().await?,
        ("/login", id) => {
            let id = id.trim();
            if id.is_empty() {
                println!("usage: /login <id>");
            } else {
                provider.sign_in(PrincipalId::new(id));
            }
        }
        _ => {
            handle.set_draft(line).await?;
            handle.send().await?;
        }
    }
    Ok(true)
}

async fn print_updates(mut state: watch::Receiver<ChatState>, mut transcript: Transcript) {
    loop {
        let lines = transcript.update(&state.borrow_and_update());
        for line in lines {
            println!("{line}");
        }
        if state.changed().await.is_err() {
            break;
        }
    }
}
