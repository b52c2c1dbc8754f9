use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lcrm_adapters::login::{login_and_save, Credentials};
use lcrm_adapters::{capture_session_cookies, FileDashboardSource};
use lcrm_notify::{run_bot, BotHandler, TelegramClient, WorkerNotifier};
use lcrm_payroll::PayrollEngine;
use lcrm_storage::{CrmStore, PgStore};
use lcrm_sync::{
    NoopEventSink, OrderEventSink, RecordUpdater, SyncConfig, SyncDriver, SyncRunSummary,
    SyncSupervisor,
};
use lcrm_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "lcrm-cli")]
#[command(about = "Furniture workshop CRM: dashboard sync, payroll and Telegram bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one dashboard sync pass.
    Sync {
        #[arg(long)]
        dry_run: bool,
        /// Parse a saved dashboard page instead of fetching it.
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Sync on the configured interval until interrupted.
    Watch {
        #[arg(long)]
        dry_run: bool,
    },
    /// Log in with credentials and save the session cookies.
    Login {
        #[arg(long, env = "LCRM_USERNAME")]
        username: String,
        #[arg(long, env = "LCRM_PASSWORD", hide_env_values = true)]
        password: String,
        /// One-time code, when the dashboard asks for one.
        #[arg(long)]
        otp: Option<String>,
    },
    /// Open a browser for a manual login and save its cookies.
    Capture,
    /// Recompute payments and print the payroll summary.
    Payroll,
    /// Run the Telegram bot.
    Bot,
    /// Serve the JSON API, with the sync loop alongside unless disabled.
    Serve {
        #[arg(long)]
        no_sync: bool,
    },
    /// Apply database migrations.
    Migrate,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LCRM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn open_store(config: &SyncConfig) -> Result<Arc<PgStore>> {
    let store = PgStore::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    Ok(Arc::new(store))
}

fn telegram_token() -> Option<String> {
    std::env::var("TELEGRAM_BOT_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
}

/// Worker notifications when a bot token is configured, otherwise nothing.
fn event_sink(store: Arc<dyn CrmStore>) -> Result<Arc<dyn OrderEventSink>> {
    match telegram_token() {
        Some(token) => {
            let client = TelegramClient::new(token)?;
            Ok(Arc::new(WorkerNotifier::new(store, Arc::new(client))))
        }
        None => {
            info!("TELEGRAM_BOT_TOKEN not set; worker notifications disabled");
            Ok(Arc::new(NoopEventSink))
        }
    }
}

fn print_summary(summary: &SyncRunSummary) {
    println!(
        "sync complete: run_id={} source={} fetched={} updated={} unchanged={} misses={} failed={}{}",
        summary.run_id,
        summary.source,
        summary.fetched,
        summary.updated,
        summary.unchanged,
        summary.misses,
        summary.failed,
        if summary.dry_run { " (dry run)" } else { "" }
    );
    if !summary.missed_indexes.is_empty() {
        println!("no local order for: {}", summary.missed_indexes.join(", "));
    }
}

async fn build_driver(config: &SyncConfig, store: Arc<dyn CrmStore>) -> Result<Option<SyncDriver>> {
    let events = event_sink(store.clone())?;
    SyncDriver::from_config(config, store, events).await
}

async fn start_supervisor(config: &SyncConfig, store: Arc<dyn CrmStore>) -> Result<Option<SyncSupervisor>> {
    let Some(driver) = build_driver(config, store).await? else {
        info!("sync mode is off");
        return Ok(None);
    };
    let supervisor = SyncSupervisor::start(Arc::new(driver), config.interval).await?;
    Ok(Some(supervisor))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let mut config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync {
        dry_run: false,
        html: None,
    }) {
        Commands::Sync { dry_run, html } => {
            config.dry_run |= dry_run;
            let store = open_store(&config).await?;
            let driver = match html {
                Some(path) => {
                    let mapper = config.status_mapper()?;
                    let updater = RecordUpdater::new(store.clone(), mapper, config.index_field)
                        .dry_run(config.dry_run)
                        .with_events(event_sink(store)?);
                    SyncDriver::new(
                        Box::new(FileDashboardSource::new(path, config.dashboard_url.clone())),
                        updater,
                    )
                }
                None => match build_driver(&config, store).await? {
                    Some(driver) => driver,
                    None => bail!("LCRM_SYNC_MODE is off; nothing to sync"),
                },
            };
            let summary = driver.run_once().await?;
            print_summary(&summary);
        }
        Commands::Watch { dry_run } => {
            config.dry_run |= dry_run;
            let store = open_store(&config).await?;
            let Some(supervisor) = start_supervisor(&config, store).await? else {
                bail!("LCRM_SYNC_MODE is off; nothing to watch");
            };
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            info!("interrupt received; stopping");
            supervisor.shutdown().await?;
        }
        Commands::Login {
            username,
            password,
            otp,
        } => {
            let credentials = Credentials {
                username,
                password,
                otp,
            };
            let cookies = login_and_save(
                config.http_client_config(),
                &config.login_url,
                &credentials,
                &config.cookies_path,
            )
            .await?;
            println!(
                "saved {} cookies to {}",
                cookies.0.len(),
                config.cookies_path.display()
            );
        }
        Commands::Capture => {
            let cookies = capture_session_cookies(&config.browser_config(), &config.login_url).await?;
            if cookies.is_empty() {
                bail!("browser returned no cookies; was the login completed?");
            }
            cookies
                .save(&config.cookies_path)
                .await
                .context("saving captured cookies")?;
            println!(
                "saved {} cookies to {}",
                cookies.0.len(),
                config.cookies_path.display()
            );
        }
        Commands::Payroll => {
            let store = open_store(&config).await?;
            let engine = PayrollEngine::new(store);
            let pass = engine.run_pass().await?;
            let summary = engine.summary().await?;
            println!(
                "payroll pass: orders={} created={} updated={} unchanged={} cleared={}",
                pass.orders, pass.created, pass.updated, pass.unchanged, pass.cleared
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Bot => {
            let Some(token) = telegram_token() else {
                bail!("TELEGRAM_BOT_TOKEN is not set");
            };
            let store = open_store(&config).await?;
            let client = TelegramClient::new(token)?;
            let me = client.get_me().await.context("checking bot token")?;
            info!(bot = me.username.as_deref().unwrap_or("unknown"), "telegram bot connected");
            tokio::select! {
                _ = run_bot(client, BotHandler::new(store)) => {}
                signal = tokio::signal::ctrl_c() => {
                    signal.context("waiting for ctrl-c")?;
                    info!("interrupt received; stopping bot");
                }
            }
        }
        Commands::Serve { no_sync } => {
            let store = open_store(&config).await?;
            let supervisor = if no_sync {
                None
            } else {
                start_supervisor(&config, store.clone()).await?
            };
            let state = AppState::new(store.clone()).with_events(event_sink(store)?);
            let served = tokio::select! {
                served = lcrm_web::serve_from_env(state) => served,
                signal = tokio::signal::ctrl_c() => signal.context("waiting for ctrl-c"),
            };
            if let Some(supervisor) = supervisor {
                if let Err(err) = supervisor.shutdown().await {
                    warn!(error = %format!("{err:#}"), "sync supervisor did not stop cleanly");
                }
            }
            served?;
        }
        Commands::Migrate => {
            let store = open_store(&config).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
