use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simya::config::Config;
use simya::models::Chain;
use simya::poster::PosterUpdater;
use simya::registry::VenueRegistry;
use simya::runner::{run_all, RunConfig};
use simya::sources;
use simya::storage::ScreeningStore;

#[derive(Parser)]
#[command(
    name = "simya",
    version,
    about = "Korean arthouse cinema showtime crawler",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used when unset
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl showtimes into the database
    Crawl {
        /// Chains to crawl (default: every supported chain)
        #[arg(short = 'n', long = "chain")]
        chains: Vec<String>,

        /// First date to crawl, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        start_date: Option<String>,

        /// Maximum number of distinct dates per chain
        #[arg(short, long, default_value = "14")]
        max_days: u32,

        /// Crawl and report without writing to the database
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Manage the venue registry
    Venues {
        #[command(subcommand)]
        action: VenueAction,
    },

    /// Fill in missing movie posters from TMDB
    Posters,
}

#[derive(Subcommand)]
enum VenueAction {
    /// Import venues from a JSON snapshot into the database
    Import {
        /// JSON file with an array of cinema records
        file: PathBuf,
    },

    /// List registered venues
    List {
        /// Restrict to one chain
        #[arg(short = 'n', long)]
        chain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    match cli.command {
        Commands::Crawl {
            chains,
            start_date,
            max_days,
            dry_run,
        } => {
            crawl(&config, chains, start_date, max_days, dry_run).await?;
        }

        Commands::Venues { action } => match action {
            VenueAction::Import { file } => {
                let store = ScreeningStore::new(&config.database.sqlite_path)?;
                let registry = VenueRegistry::from_json_file(&file)?;
                let imported = store.insert_cinemas(registry.venues())?;
                println!("imported {imported} venues from {}", file.display());
            }
            VenueAction::List { chain } => {
                let store = ScreeningStore::new(&config.database.sqlite_path)?;
                let chain = chain
                    .as_deref()
                    .map(Chain::from_str)
                    .transpose()
                    .context("unknown chain")?;
                for cinema in store.fetch_cinemas(chain)? {
                    println!(
                        "{:<12} {:<8} {}",
                        cinema.chain, cinema.cinema_code, cinema.name
                    );
                }
            }
        },

        Commands::Posters => {
            let token = config
                .tmdb
                .api_token
                .clone()
                .context("TMDB_API_TOKEN not set")?;
            let store = ScreeningStore::new(&config.database.sqlite_path)?;
            let updater = PosterUpdater::new(token)?;
            let updated = updater.update_missing(&store).await?;
            println!("updated {updated} posters");
        }
    }

    Ok(())
}

async fn crawl(
    config: &Config,
    chains: Vec<String>,
    start_date: Option<String>,
    max_days: u32,
    dry_run: bool,
) -> Result<()> {
    let chains: Vec<Chain> = if chains.is_empty() {
        sources::supported().to_vec()
    } else {
        chains
            .iter()
            .map(|s| Chain::from_str(s))
            .collect::<std::result::Result<_, _>>()
            .context("unknown chain")?
    };

    let start_date = start_date
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("start date must be YYYY-MM-DD")?;

    let store = ScreeningStore::new(&config.database.sqlite_path)?;

    let registry = match &config.registry.snapshot_path {
        Some(path) => VenueRegistry::from_json_file(path)?,
        None => VenueRegistry::from_store(&store)?,
    };
    tracing::info!(venues = registry.len(), chains = chains.len(), "crawl starting");

    let run = RunConfig {
        chains,
        start_date,
        max_days: Some(max_days),
        dry_run,
    };

    let report = run_all(config, &run, &registry, &store).await?;
    println!("{report}");

    if report.all_failed() {
        anyhow::bail!("every chain failed");
    }
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("simya=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("simya=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
