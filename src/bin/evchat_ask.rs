// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// evchat-ask: terminal chat client for a running evchat relay.
//
// Usage:
//   evchat-ask "推荐一款续航长的车"
//   evchat-ask --relay http://127.0.0.1:9810 --state ~/.evchat/state.json
//   evchat-ask --clear
//
// Without a question, questions are read from stdin one per line.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use evchat::chat::{ChatController, RelayClient, TurnOutcome, OPENING_STATEMENT_ID};
use evchat::config::{self, Config};
use evchat::render::EntryView;
use evchat::store::FileStore;

#[derive(Parser)]
#[command(name = "evchat-ask", about = "Ask the EV recommendation agent from the terminal.")]
struct Cli {
    /// Path to the evchat.yaml config file. Defaults apply when it is missing.
    #[arg(long, default_value = "evchat.yaml", env = "EVCHAT_CONFIG")]
    config: String,

    /// Relay base URL (overrides client.relay_url).
    #[arg(long, value_name = "URL")]
    relay: Option<String>,

    /// State file (overrides storage.path).
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,

    /// Forget the transcript and conversation before asking.
    #[arg(long)]
    clear: bool,

    /// Question to ask. Reads stdin when omitted.
    question: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = load_config(&cli.config);
    let relay_url = cli.relay.clone().unwrap_or_else(|| config.client.relay_url.clone());
    let state_path = cli.state.clone().unwrap_or_else(|| config.storage.path.clone());

    let store = match FileStore::open(&state_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("failed to open state: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(relay = %relay_url, state = %state_path.display(), "starting session");

    let transport = Arc::new(RelayClient::new(reqwest::Client::new(), relay_url));
    let controller = Arc::new(ChatController::new(transport, store, &config));

    if cli.clear {
        controller.clear();
    }
    controller.restore().await;
    print_opening_statement(&controller);

    let mut failed = false;
    if cli.question.is_empty() {
        let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("failed to read stdin: {e}");
                    std::process::exit(1);
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            failed |= !ask(&controller, &line, &config).await;
        }
    } else {
        failed = !ask(&controller, &cli.question.join(" "), &config).await;
    }

    if failed {
        std::process::exit(1);
    }
}

fn load_config(path: &str) -> Config {
    let source = config::FileSource {
        path: PathBuf::from(path),
    };
    if !source.exists() {
        tracing::debug!(path, "no config file, using defaults");
        return Config::default();
    }
    match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path, "failed to load config: {e}");
            std::process::exit(1);
        }
    }
}

fn print_opening_statement(controller: &ChatController) {
    let snapshot = controller.snapshot();
    if let Some(entry) = snapshot.iter().find(|e| e.id == OPENING_STATEMENT_ID) {
        if snapshot.len() == 1 {
            println!("{}\n", entry.content);
        }
    }
}

/// Run one turn, echoing the answer as it is revealed. Returns false when
/// the turn failed.
async fn ask(controller: &Arc<ChatController>, question: &str, config: &Config) -> bool {
    let mut turn = {
        let controller = Arc::clone(controller);
        let question = question.to_string();
        tokio::spawn(async move { controller.submit(&question).await })
    };

    let mut printed = String::new();
    let mut ticks = tokio::time::interval(config.typewriter.interval);
    let outcome = loop {
        tokio::select! {
            joined = &mut turn => break joined,
            _ = ticks.tick() => echo_progress(controller, &mut printed),
        }
    };
    echo_progress(controller, &mut printed);
    println!();

    if let Some(entry) = controller.snapshot().last() {
        for block in EntryView::of(entry).reasoning {
            println!("  [思考] {}", block.replace('\n', "\n         "));
        }
    }

    match outcome {
        Ok(TurnOutcome::Completed) | Ok(TurnOutcome::Cancelled) => true,
        Ok(TurnOutcome::Rejected(reason)) => {
            tracing::warn!(?reason, "question rejected");
            true
        }
        Ok(TurnOutcome::Failed(_)) => {
            if let Some(banner) = controller.banner() {
                eprintln!("错误：{banner}");
            }
            false
        }
        Err(e) => {
            tracing::error!("turn task failed: {e}");
            false
        }
    }
}

/// Print whatever visible answer text appeared since the last call.
fn echo_progress(controller: &ChatController, printed: &mut String) {
    let Some(entry) = controller.snapshot().pop() else {
        return;
    };
    let visible = EntryView::of(&entry).visible;
    // A half-received think marker can show briefly and then vanish; only
    // print text that extends what is already on screen.
    if let Some(fresh) = visible.strip_prefix(printed.as_str()) {
        if !fresh.is_empty() {
            print!("{fresh}");
            let _ = std::io::stdout().flush();
            *printed = visible.clone();
        }
    }
}
