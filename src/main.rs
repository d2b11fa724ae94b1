// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use evchat::config;
use evchat::relay;
use evchat::upstream::{AgentUpstream, DifyUpstream};

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "evchat", about = "Agent relay for the EV recommendation chat")]
struct Cli {
    /// Path to the evchat.yaml config file
    #[arg(long, default_value = "evchat.yaml", env = "EVCHAT_CONFIG")]
    config: String,

    /// Port to listen on (overrides relay.port)
    #[arg(long, env = "EVCHAT_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource {
        path: std::path::PathBuf::from(&cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %cli.config, "failed to load config: {e}");
            std::process::exit(1);
        }
    };
    let agent = match config.require_agent() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        agent = %agent.base_url,
        config_hash = %config.config_hash,
        "config loaded"
    );

    let upstream: Arc<dyn AgentUpstream> =
        Arc::new(DifyUpstream::new(reqwest::Client::new(), agent));
    let port = cli.port.unwrap_or(config.relay.port);
    let app = relay::build_router(upstream, config.relay.clone());

    let addr = SocketAddr::from((relay::BIND_HOST, port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "evchat relay listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
