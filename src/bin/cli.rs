//! Blog notifier CLI
//!
//! Manages the watchlist and runs sync cycles against a local store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use blog_notifier::{
    error::{AppError, Result},
    models::{Config, CrawlOutcome, CrawlerConfig},
    pipeline::{CrawlSupervisor, Orchestrator},
    services::{HtmlLinkExtractor, transport_from_config},
    storage::{LocalStorage, Repository},
    utils::dedup_preserving_order,
};
use clap::{Parser, Subcommand};

/// blog-notifier - watch blogs and get notified about new posts
#[derive(Parser, Debug)]
#[command(name = "blog-notifier", version, about = "Watch blogs for new posts")]
struct Cli {
    /// Path to the store file
    #[arg(short, long, global = true, default_value = "blogs.json")]
    store: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store file
    Migrate,

    /// Add a site to the watchlist
    #[command(alias = "explore")]
    Add { site: String },

    /// Remove a site and its known posts from the watchlist
    Remove { site: String },

    /// List watched sites with their last seen link
    List,

    /// List known posts of a site
    #[command(alias = "list-posts")]
    Posts {
        #[arg(long)]
        site: String,
    },

    /// Set the last seen link of a site
    UpdateLastLink {
        #[arg(long)]
        site: String,
        #[arg(long)]
        post: String,
    },

    /// Crawl a single URL and print the distinct links found
    CrawlSite {
        url: String,
        /// Crawler settings (defaults if omitted)
        #[arg(long)]
        conf: Option<PathBuf>,
    },

    /// Crawl all watched sites and record posts without notifying
    Crawl {
        /// Crawler settings (defaults if omitted)
        #[arg(long)]
        conf: Option<PathBuf>,
    },

    /// Crawl all watched sites, record new posts and send notifications
    Sync {
        #[arg(long)]
        conf: PathBuf,
    },

    /// Parse, validate and print a configuration file
    Config {
        #[arg(long)]
        conf: PathBuf,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Validated crawler settings from an optional config file.
fn crawler_config(conf: Option<&Path>) -> Result<CrawlerConfig> {
    match conf {
        Some(path) => CrawlerConfig::load(path),
        None => Ok(CrawlerConfig::default()),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let storage = Arc::new(LocalStorage::open(&cli.store).await?);

    match cli.command {
        Command::Migrate => {
            if storage.init().await? {
                log::info!("Created store at {}", cli.store.display());
            } else {
                log::info!("Store already exists at {}", cli.store.display());
            }
        }

        Command::Add { site } => {
            url::Url::parse(&site)?;
            storage.add_site(&site).await?;
            log::info!("Watching {}", site);
        }

        Command::Remove { site } => {
            if !storage.remove_site(&site).await? {
                return Err(AppError::not_found(format!("site {site}")));
            }
            log::info!("Removed {}", site);
        }

        Command::List => {
            for site in storage.list_sites().await? {
                println!("{} {}", site.site, site.last_seen_link);
            }
        }

        Command::Posts { site } => {
            if !storage.site_exists(&site).await? {
                return Err(AppError::not_found(format!("site {site}")));
            }
            for post in storage.posts_for_site(&site).await? {
                println!("{}", post.link);
            }
        }

        Command::UpdateLastLink { site, post } => {
            storage.update_last_seen_link(&site, &post).await?;
            log::info!("Last seen link of {} is now {}", site, post);
        }

        Command::CrawlSite { url, conf } => {
            let config = crawler_config(conf.as_deref())?;
            let extractor = Arc::new(HtmlLinkExtractor::new(&config)?);
            let supervisor = CrawlSupervisor::new(extractor, &config);

            match supervisor.crawl(&url).await {
                CrawlOutcome::Success { links, .. } => {
                    for link in dedup_preserving_order(links) {
                        println!("{link}");
                    }
                }
                CrawlOutcome::Failure { error, .. } => return Err(error),
            }
        }

        Command::Crawl { conf } => {
            let config = crawler_config(conf.as_deref())?;
            let extractor = Arc::new(HtmlLinkExtractor::new(&config)?);
            let orchestrator = Orchestrator::recorder(&config, storage, extractor);

            let report = orchestrator.crawl_only().await?;
            report.log_summary("Crawl Results");
        }

        Command::Sync { conf } => {
            let config = Config::load_validated(&conf)?;
            log::info!("Loaded configuration from {}", conf.display());

            let extractor = Arc::new(HtmlLinkExtractor::new(&config.crawler)?);
            let transport = transport_from_config(&config)?;
            let orchestrator = Orchestrator::new(&config, storage, extractor, transport);

            let report = orchestrator.sync_cycle().await?;
            report.log_summary("Sync Results");
        }

        Command::Config { conf } => {
            let config = Config::load(&conf)?;
            config.validate()?;
            println!("{config}");
        }
    }

    Ok(())
}
