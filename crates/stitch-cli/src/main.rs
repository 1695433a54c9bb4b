//! Stitch binary: watches GitHub repositories and mirrors every open issue
//! and pull request into a Discord thread until the item closes.

mod bootstrap_helpers;
mod cli_args;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use stitch_bridge::{run_mirror_bridge, MirrorBridgeRuntimeConfig};
use stitch_discord::{ChatGateway, DiscordClient};
use stitch_github::{GithubClient, RepoName, TrackerGateway};

use bootstrap_helpers::init_tracing;
use cli_args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}

async fn run_cli(cli: Cli) -> Result<()> {
    let repos = cli
        .repos
        .iter()
        .map(|raw| RepoName::parse(raw))
        .collect::<Result<Vec<_>>>()?;

    let tracker: Arc<dyn TrackerGateway> = Arc::new(GithubClient::new(
        cli.github_api_base.clone(),
        cli.github_token.clone(),
        cli.request_timeout_ms,
        cli.retry_max_attempts,
        cli.retry_base_delay_ms,
    )?);
    let chat_client = DiscordClient::new(
        cli.discord_api_base.clone(),
        cli.discord_bot_token.clone(),
        cli.request_timeout_ms,
        cli.retry_max_attempts,
        cli.retry_base_delay_ms,
    )?;

    // Login check up front: bad chat credentials should stop the process
    // before the poll loop starts.
    let identity = chat_client
        .resolve_bot_identity()
        .await
        .context("discord login check failed")?;
    println!("Logged in as {} (ID: {})", identity.username, identity.id);

    let chat: Arc<dyn ChatGateway> = Arc::new(chat_client);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listeners(shutdown_tx);

    run_mirror_bridge(
        MirrorBridgeRuntimeConfig {
            tracker,
            chat,
            repos,
            channel_id: cli.discord_channel_id.clone(),
            state_dir: cli.state_dir.clone(),
            poll_interval: Duration::from_secs(cli.poll_interval_seconds),
            poll_once: cli.poll_once,
        },
        shutdown_rx,
    )
    .await
}

/// Requests shutdown on Ctrl-C or an `exit` / `quit` line on stdin.
fn spawn_shutdown_listeners(shutdown_tx: watch::Sender<bool>) {
    let stdin_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = line.trim().to_ascii_lowercase();
            if command == "exit" || command == "quit" {
                let _ = stdin_tx.send(true);
                return;
            }
        }
    });
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });
}
