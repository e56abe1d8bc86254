use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nm_core::{AppConfig, ArticleStore, Category, Subscriber};
use nm_ingest::scheduler::DIGEST_INTERVAL;
use nm_ingest::{
    create_mailer, default_providers, init_logging, spawn_digest_task, DigestService, IngestionOrchestrator,
    OrchestratorConfig, ScheduledTrigger,
};
use nm_storage::StorageKind;
use nm_web::AppState;
use tracing::info;

const STORAGE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let overflow = || "Duration is too large".to_string();
        let mut total_seconds = 0u64;
        let mut current_number = String::new();
        let mut has_unit = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_number.push(c);
            } else if !current_number.is_empty() {
                let num = current_number.parse::<u64>().map_err(|_| overflow())?;
                let unit = match c {
                    's' => 1,
                    'm' => 60,
                    'h' => 3600,
                    'd' => 86400,
                    _ => return Err(format!("Invalid duration unit: {}", c)),
                };
                total_seconds = num
                    .checked_mul(unit)
                    .and_then(|secs| total_seconds.checked_add(secs))
                    .ok_or_else(overflow)?;
                current_number.clear();
                has_unit = true;
            } else if !c.is_whitespace() {
                return Err(format!("Invalid character in duration: {}", c));
            }
        }

        // Trailing bare number is seconds
        if !current_number.is_empty() {
            let num = current_number.parse::<u64>().map_err(|_| overflow())?;
            total_seconds = total_seconds.checked_add(num).ok_or_else(overflow)?;
            has_unit = true;
        }

        if !has_unit {
            return Err("Duration must include a number".to_string());
        }
        if total_seconds == 0 {
            return Err("Duration must be positive".to_string());
        }

        Ok(HumanDuration(Duration::from_secs(total_seconds)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Sentiment-tagged news aggregator", long_about = None)]
pub struct Cli {
    /// Storage backend: sqlite (default) or memory
    #[arg(long, default_value = "sqlite")]
    storage: StorageKind,
    /// SQLite database file; overrides DATABASE_PATH
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run one ingestion cycle and exit
    Fetch {
        #[arg(long)]
        category: Option<String>,
    },
    /// Serve the HTTP API with scheduled ingestion and daily digests
    Serve {
        /// Address to bind; overrides BIND_ADDR
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Ingestion interval (e.g. 6h, 30m, 1h15m); overrides FETCH_INTERVAL_HOURS
        #[arg(long)]
        interval: Option<HumanDuration>,
        #[arg(long)]
        no_schedule: bool,
    },
    /// Run scheduled ingestion without the HTTP API
    Schedule {
        #[arg(long)]
        interval: Option<HumanDuration>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Send the daily digest to every subscriber now
    Digest,
    /// List supported categories
    Categories,
    /// Add or update a digest subscriber
    Subscribe {
        email: String,
        #[arg(long, default_value = "")]
        name: String,
        /// Comma-separated categories, e.g. technology,science
        #[arg(long, value_delimiter = ',')]
        categories: Vec<Category>,
        #[arg(long)]
        disable: bool,
    },
}

async fn open_storage(kind: StorageKind, location: &str) -> anyhow::Result<Arc<dyn ArticleStore>> {
    let mut last_error = None;
    for attempt in 1..=STORAGE_RETRIES {
        let result = match nm_storage::create_storage(kind, location).await {
            Ok(store) => store.ping().await.map(|_| store),
            Err(e) => Err(e),
        };
        match result {
            Ok(store) => {
                info!("🏦 Storage backend initialized successfully (using {})", kind);
                return Ok(store);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < STORAGE_RETRIES {
                    info!("Storage initialization failed, retrying {}/{}...", attempt, STORAGE_RETRIES);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }
    let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
    anyhow::bail!("{}: {}", kind.error_message(), reason)
}

fn build_orchestrator(config: &AppConfig, store: Arc<dyn ArticleStore>) -> anyhow::Result<IngestionOrchestrator> {
    let keys = &config.providers;
    if [&keys.newsapi, &keys.newsdata, &keys.gnews, &keys.currents].iter().all(|k| k.is_none()) {
        tracing::warn!("No provider API keys configured; ingestion cycles will fetch nothing");
    }
    let providers = default_providers(config)?;
    let names: Vec<_> = providers.iter().map(|p| p.metadata().name).collect();
    info!("🦗 Providers initialized: {}", names.join(", "));

    let text = nm_inference::models::create_text_classifier(config.text_model_url.as_deref(), config.http_timeout)?;
    let image = nm_inference::models::create_image_classifier(config.image_model_url.as_deref(), config.http_timeout)?;
    info!("🧠 Classifiers initialized (text: {}, image: {})", text.name(), image.name());

    Ok(IngestionOrchestrator::new(providers, text, image, store).with_config(OrchestratorConfig {
        provider_timeout: config.http_timeout,
        ..Default::default()
    }))
}

fn digest_service(config: &AppConfig, store: Arc<dyn ArticleStore>) -> anyhow::Result<DigestService> {
    let mailer = create_mailer(&config.email, config.http_timeout)?;
    Ok(DigestService::new(store, mailer, config.email.public_url.clone()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = init_logging(cli.verbose);

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(path) = cli.db_path {
        config.database_path = path;
    }

    if let Commands::Categories = cli.command {
        for category in Category::ALL {
            println!("{:<14} {}", category.as_str(), category.label());
        }
        return Ok(());
    }

    logger.info("💾 Checking storage connection...");
    let store = open_storage(cli.storage, &config.database_path.to_string_lossy()).await?;

    match cli.command {
        Commands::Fetch { category } => {
            let orchestrator = build_orchestrator(&config, store)?;
            let report = orchestrator.run_cycle(category.as_deref()).await?;
            println!("{}", summarize(&report));
        }
        Commands::Serve {
            bind,
            interval,
            no_schedule,
        } => {
            let addr = match bind {
                Some(addr) => addr,
                None => config
                    .bind_addr
                    .parse()
                    .with_context(|| format!("Invalid BIND_ADDR: {}", config.bind_addr))?,
            };
            let orchestrator = Arc::new(build_orchestrator(&config, store.clone())?);
            let mut state = AppState::new(orchestrator.clone());

            if !no_schedule {
                let every = interval.map(|i| i.0).unwrap_or(config.fetch_interval);
                let trigger = Arc::new(ScheduledTrigger::new(orchestrator, every));
                trigger.clone().spawn();
                spawn_digest_task(Arc::new(digest_service(&config, store)?), DIGEST_INTERVAL);
                state = state.with_scheduler(trigger);
            }

            nm_web::serve(addr, state).await?;
        }
        Commands::Schedule { interval, category } => {
            let every = interval.map(|i| i.0).unwrap_or(config.fetch_interval);
            let orchestrator = Arc::new(build_orchestrator(&config, store)?);
            let mut trigger = ScheduledTrigger::new(orchestrator, every);
            if let Some(category) = category {
                trigger = trigger.with_category(category);
            }
            Arc::new(trigger).spawn().await?;
        }
        Commands::Digest => {
            let sent = digest_service(&config, store)?.send_digests().await?;
            println!("Sent {} digest emails", sent);
        }
        Commands::Subscribe {
            email,
            name,
            categories,
            disable,
        } => {
            store
                .upsert_subscriber(&Subscriber {
                    email: email.clone(),
                    name,
                    categories,
                    enabled: !disable,
                })
                .await?;
            println!("Subscriber {} saved", email);
        }
        Commands::Categories => {}
    }

    Ok(())
}

fn summarize(report: &nm_ingest::CycleReport) -> String {
    format!(
        "Fetched {} articles, saved {} new ({} already stored, {} without url, {} failed providers)",
        report.fetched,
        report.saved,
        report.skipped_existing + report.duplicates,
        report.skipped_without_url,
        report.failed_providers.len(),
    )
}
