//! Weibo search crawler CLI

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use weibo_search::{
    config,
    error::{AppError, Result},
    models::{Config, RegionCatalog},
    pipeline,
    services::{CommentHarvester, HarvestSettings},
    storage::JsonlStorage,
    utils::http::HttpFetcher,
};

/// Weibo keyword search crawler
#[derive(Parser, Debug)]
#[command(
    name = "weibo-search",
    version,
    about = "Enumerates Weibo search results past the result window cap"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Region catalog to use instead of the built-in one
    #[arg(long)]
    regions: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl search results for every configured keyword
    Search {
        /// Skip comment harvesting
        #[arg(long)]
        no_comments: bool,

        /// Output directory (overrides output.dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration, region catalog and cookie file
    Validate,

    /// List the region catalog
    Regions,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_catalog(path: Option<&PathBuf>) -> Result<RegionCatalog> {
    match path {
        Some(path) => RegionCatalog::from_toml(&std::fs::read_to_string(path)?),
        None => RegionCatalog::builtin(),
    }
}

#[cfg(feature = "browser")]
fn build_harvester(config: &Config) -> Result<Option<CommentHarvester>> {
    use weibo_search::services::ChromeSessionFactory;

    let cookies = config::load_cookies(std::path::Path::new(&config.comments.cookies_file))?;
    let factory = Arc::new(ChromeSessionFactory::new(&config.comments));
    let settings = HarvestSettings::from(&config.comments);
    Ok(Some(CommentHarvester::new(factory, Arc::new(cookies), settings)?))
}

#[cfg(not(feature = "browser"))]
fn build_harvester(_config: &Config) -> Result<Option<CommentHarvester>> {
    log::warn!("Built without the `browser` feature; comments will not be harvested");
    Ok(None)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);

    // The logger needs the configured level, so loading is reported here.
    if cli.config.exists() {
        log::info!("Loaded configuration from {}", cli.config.display());
    } else {
        log::warn!("Config file {} not found, using defaults", cli.config.display());
    }
    if let Some(file) = &config.search.keyword_file {
        log::info!("Loaded {} keywords from {}", config.search.keywords.len(), file);
    }

    match cli.command {
        Command::Search {
            no_comments,
            output,
        } => {
            config.validate()?;
            let catalog = Arc::new(load_catalog(cli.regions.as_ref())?);
            let output_dir = output.unwrap_or_else(|| PathBuf::from(&config.output.dir));
            let storage = JsonlStorage::new(&output_dir);
            let fetcher = Arc::new(HttpFetcher::from_config(&config.crawler)?);

            let harvester = if no_comments || !config.comments.enabled {
                None
            } else {
                build_harvester(&config)?
            };

            let outcome = pipeline::run_search(
                Arc::new(config),
                catalog,
                fetcher,
                harvester.as_ref(),
                &storage,
            )
            .await?;

            log::info!(
                "Wrote {} posts, {} retweets and {} comments to {}",
                outcome.posts,
                outcome.retweets,
                outcome.comments,
                output_dir.display()
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({} keywords)", config.search.keywords.len());

            let catalog = load_catalog(cli.regions.as_ref())?;
            let selected = if config.search.is_nationwide() {
                catalog.regions().len()
            } else {
                catalog.select(&config.search.regions)?.len()
            };
            log::info!(
                "✓ Region catalog OK ({} regions, {} selected)",
                catalog.regions().len(),
                selected
            );

            if config.crawler.cookie.trim().is_empty() {
                return Err(AppError::validation(
                    "crawler.cookie is empty; search pages require a logged-in session",
                ));
            }
            let cookies = config::load_cookies(std::path::Path::new(&config.comments.cookies_file))?;
            log::info!("✓ Cookie file OK ({} cookies)", cookies.len());

            log::info!("All validations passed!");
        }

        Command::Regions => {
            let catalog = load_catalog(cli.regions.as_ref())?;
            for region in catalog.regions() {
                println!("{}\t{}\t{} cities", region.code, region.name, region.cities.len());
            }
        }
    }

    Ok(())
}
