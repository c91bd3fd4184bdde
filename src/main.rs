// SPDX-License-Identifier: MPL-2.0

mod armory;
mod cache;
mod commands;
mod config;
mod filter;
mod leaderboard;
mod notify;
mod render;
mod scheduler;
mod state;

use anyhow::{Context, Result, bail};
use armory::ArmoryClient;
use cache::{CacheDb, SubscriptionStore};
use clap::{Parser, Subcommand};
use commands::FilterEdit;
use notify::DiscordDelivery;
use render::{ChromeDriver, RenderOptions, RenderQueue, TooltipRenderer};
use scheduler::Poller;
use state::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll until interrupted
    Run,
    /// Run a single poll cycle
    Tick,
    Subscribe {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        realm: u32,
        #[arg(long)]
        external_guild: String,
        /// Treat kills already in the feed as announced
        #[arg(long)]
        skip_backlog: bool,
    },
    Unsubscribe {
        #[arg(long)]
        guild: String,
    },
    Filter {
        #[arg(long)]
        guild: String,
        #[command(subcommand)]
        action: FilterAction,
    },
    /// Drop cached tooltip markup and realm stylesheets
    ClearCache {
        #[arg(long)]
        realm: Option<u32>,
    },
}

#[derive(Subcommand)]
enum FilterAction {
    Show,
    Toggle { dungeon: u32, encounter: u32 },
    /// Replace a dungeon's encounters; none means the whole dungeon
    Set { dungeon: u32, encounters: Vec<u32> },
    Clear {
        #[arg(long)]
        dungeon: Option<u32>,
    },
}

fn setup_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn open_store(settings: &Settings) -> Result<CacheDb> {
    let path = match &settings.database_path {
        Some(path) => path.clone(),
        None => CacheDb::default_path()?,
    };
    CacheDb::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    let db = open_store(&settings)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let (poller, renders) = build_poller(&settings, db)?;
            poller
                .run(settings.poll_interval(), async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "failed to listen for ctrl-c");
                        std::future::pending::<()>().await;
                    }
                })
                .await;
            renders.shutdown().await;
        }
        Commands::Tick => {
            let (poller, renders) = build_poller(&settings, db)?;
            let report = poller.tick().await;
            renders.shutdown().await;
            let report = report?;
            info!(
                delivered = report.delivered,
                failed = report.failed,
                unbound = report.unbound,
                "tick finished"
            );
        }
        Commands::Subscribe {
            guild,
            channel,
            realm,
            external_guild,
            skip_backlog,
        } => {
            let subscription = commands::subscribe(&db, &guild, &channel, realm, &external_guild)?;
            if skip_backlog {
                let source = ArmoryClient::new(&settings.api_base_url)?;
                let skipped = commands::skip_backlog(&db, &source, &subscription).await?;
                println!("Skipped {skipped} existing kills");
            }
            println!("Subscribed {guild} to {external_guild} (realm {realm}) in channel {channel}");
        }
        Commands::Unsubscribe { guild } => {
            if commands::unsubscribe(&db, &guild)? {
                println!("Unsubscribed {guild}");
            } else {
                println!("{guild} was not subscribed");
            }
        }
        Commands::Filter { guild, action } => {
            let filter = match action {
                FilterAction::Show => SubscriptionStore::new(&db).filter(&guild)?,
                FilterAction::Toggle { dungeon, encounter } => commands::edit_filter(
                    &db,
                    &guild,
                    FilterEdit::Toggle {
                        dungeon_id: dungeon,
                        encounter_id: encounter,
                    },
                )?,
                FilterAction::Set {
                    dungeon,
                    encounters,
                } => commands::edit_filter(
                    &db,
                    &guild,
                    FilterEdit::Set {
                        dungeon_id: dungeon,
                        encounters,
                    },
                )?,
                FilterAction::Clear { dungeon } => commands::edit_filter(
                    &db,
                    &guild,
                    FilterEdit::Clear {
                        dungeon_id: dungeon,
                    },
                )?,
            };
            println!("{guild}: {filter}");
        }
        Commands::ClearCache { realm } => {
            let cleared = commands::clear_cache(&db, realm)?;
            println!(
                "Removed {} cached tooltips and {} stylesheet sets",
                cleared.tooltips, cleared.stylesheets
            );
        }
    }

    Ok(())
}

/// Wire the armory, chat and browser into a poller. The render worker is
/// started here and must be shut down by the caller.
fn build_poller(settings: &Settings, db: CacheDb) -> Result<(Poller, RenderQueue)> {
    let Some(token) = settings.discord_token.as_deref() else {
        bail!(
            "no bot token configured; set {} or discord_token in the settings file",
            config::DISCORD_TOKEN_ENV
        );
    };

    let source = Arc::new(ArmoryClient::new(&settings.api_base_url)?);
    let delivery = Arc::new(DiscordDelivery::new(&settings.discord_api_url, token)?);

    let driver = ChromeDriver::new(
        settings.chrome_executable.clone(),
        &settings.tooltip_selector,
        settings.viewport_margin,
    );
    let renderer = TooltipRenderer::new(driver, db.clone(), RenderOptions::from_settings(settings));
    let (renders, _worker) = RenderQueue::spawn(renderer);

    info!(app = config::APP_NAME, "pipeline ready");
    Ok((Poller::new(source, delivery, renders.clone(), db), renders))
}
