//! Lesson request bot
//!
//! Batch job: lists unacknowledged teaching requests in each tier's list
//! channel and writes acknowledgers of handled requests back to the request
//! spreadsheet, then exits.

mod config;
mod discord;
mod engine;
mod errors;
mod mention;
#[cfg(test)]
mod mocks;
mod platform;
mod reconciler;
mod sheets;
mod store;
mod summary;

use anyhow::{Context, Result};
use clap::Parser;
use lesson_types::MentionMap;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, SystemEnv};
use crate::discord::DiscordPlatform;
use crate::engine::Engine;
use crate::mention::load_mention_map;
use crate::sheets::SheetsClient;

/// Lesson request bot CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/lesson-bot.toml")]
    config: String,

    /// Discord bot token (overrides config file)
    #[arg(long, env = "DISCORD_BOT_TOKEN")]
    bot_token: Option<String>,

    /// Service-account key file for Google Sheets (overrides config file)
    #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
    credentials_file: Option<String>,

    /// Build summaries and resolve names without writing to Discord or Sheets
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lesson_bot=debug,lesson_types=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lesson request bot");

    let args = Args::parse();

    let mut config = if std::path::Path::new(&args.config).exists() {
        info!("Loading config from file: {}", args.config);
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, loading from environment");
        Config::from_env(&SystemEnv)?
    };
    if let Some(bot_token) = args.bot_token {
        config.discord.bot_token = bot_token;
    }
    if let Some(credentials_file) = args.credentials_file {
        config.sheets.credentials_file = Some(credentials_file);
    }

    for w in config.warnings() {
        warn!("Config: {}", w);
    }
    if args.dry_run {
        info!("Dry run: no messages or cells will be written");
    }

    let platform = DiscordPlatform::connect(&config.discord.bot_token)
        .await
        .context("Failed to authenticate to Discord")?;

    let sheets = match config.credentials_blob() {
        Ok(Some(blob)) => match SheetsClient::from_credentials(&blob) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Sheets disabled: {}", e);
                None
            }
        },
        Ok(None) => {
            info!("No Sheets credentials configured, reaction sync disabled");
            None
        }
        Err(e) => {
            warn!("Sheets disabled: {:#}", e);
            None
        }
    };

    let mentions = match (&sheets, &config.mention_table) {
        (Some(client), Some(table)) => load_mention_map(client, table).await,
        _ => MentionMap::new(),
    };

    let report = Engine::new(&platform, sheets.as_ref(), &config, &mentions)?
        .dry_run(args.dry_run)
        .run()
        .await;
    report.log();

    let failures = report.failures();
    if failures > 0 {
        warn!("Pass finished with {} failure(s)", failures);
    } else {
        info!("Pass finished");
    }
    Ok(())
}
