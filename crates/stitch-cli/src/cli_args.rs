use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "stitch",
    about = "Mirrors open GitHub issues and pull requests into Discord threads",
    version
)]
/// Public struct `Cli` used across Stitch components.
pub struct Cli {
    #[arg(
        long = "repo",
        env = "STITCH_REPOS",
        value_delimiter = ',',
        required = true,
        help = "GitHub repository to watch in owner/repo format; repeat the flag or comma-separate for more"
    )]
    pub repos: Vec<String>,

    #[arg(
        long = "discord-channel-id",
        env = "STITCH_DISCORD_CHANNEL_ID",
        help = "Discord channel that receives one mirror thread per tracked item"
    )]
    pub discord_channel_id: String,

    #[arg(
        long = "discord-bot-token",
        env = "DISCORD_BOT_TOKEN",
        hide_env_values = true,
        help = "Discord bot token used for thread management"
    )]
    pub discord_bot_token: String,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "Optional GitHub token; unauthenticated access works with lower rate limits"
    )]
    pub github_token: Option<String>,

    #[arg(
        long = "poll-interval-seconds",
        env = "STITCH_POLL_INTERVAL_SECONDS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Polling interval in seconds between reconciliation cycles"
    )]
    pub poll_interval_seconds: u64,

    #[arg(
        long = "state-dir",
        env = "STITCH_STATE_DIR",
        default_value = ".stitch",
        help = "Directory for mirror state and event logs"
    )]
    pub state_dir: PathBuf,

    #[arg(
        long = "github-api-base",
        env = "STITCH_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub API base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long = "discord-api-base",
        env = "STITCH_DISCORD_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Discord API base URL"
    )]
    pub discord_api_base: String,

    #[arg(
        long = "request-timeout-ms",
        env = "STITCH_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request HTTP timeout in milliseconds for both gateways"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "STITCH_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        help = "Maximum attempts for retryable gateway failures"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "STITCH_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        help = "Base backoff delay in milliseconds for gateway retries (0 disables delay)"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "poll-once",
        env = "STITCH_POLL_ONCE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Run one reconciliation cycle and exit"
    )]
    pub poll_once: bool,
}
