use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use feedmill::config::Config;
use feedmill::feed::{publish, Fetcher};
use feedmill::ingest::{export_opml, import_opml, PollOutcome, Poller, Scheduler};
use feedmill::storage::{Database, StoreError};
use feedmill::util::write_atomic;

/// Get the config directory path (~/.config/feedmill/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedmill"))
}

#[derive(Parser, Debug)]
#[command(name = "feedmill", version, about = "RSS/Atom feed ingestion engine")]
struct Args {
    /// Config file (default: ~/.config/feedmill/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll all subscriptions on the configured interval until Ctrl-C
    Serve,
    /// Fetch and parse a feed without subscribing
    Preview {
        url: String,
        /// Print the parsed feed as JSON
        #[arg(long)]
        json: bool,
    },
    /// Subscribe to a feed URL and fetch its items
    Subscribe { url: String },
    /// List subscriptions
    List,
    /// Import subscriptions from an OPML file
    Import { file: PathBuf },
    /// Export subscriptions as OPML
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Poll now: one feed, or every subscription
    Refresh {
        #[arg(long, value_name = "ID")]
        feed: Option<i64>,
    },
    /// Print the newest items as a feed document
    Publish {
        #[arg(long, value_enum, default_value_t = PublishFormat::Rss)]
        format: PublishFormat,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value = "feedmill")]
        title: String,
        /// Site link written into the document
        #[arg(long, default_value = "")]
        link: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PublishFormat {
    Rss,
    Atom,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;

    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => {
            let path = config.database_path_in(&config_dir);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create '{}'", parent.display()))?;
            }
            path
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StoreError::InstanceLocked) => {
            eprintln!("Error: {}", StoreError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let fetcher = Fetcher::new(&config.fetch).context("Failed to build HTTP client")?;
    let poller = Arc::new(Poller::new(db, fetcher, config.poll.concurrency));

    run(args.command, &config, poller).await
}

async fn run(command: Command, config: &Config, poller: Arc<Poller<Database>>) -> Result<()> {
    let db = poller.store();
    match command {
        Command::Serve => {
            let period = Duration::from_secs(config.poll.interval_secs.max(1));
            tracing::info!(interval_secs = period.as_secs(), "Starting scheduler");
            // First poll right away; the scheduler takes over after one period
            log_outcome(poller.poll_all().await?);
            let handle = Scheduler::spawn(poller.clone(), period, None);
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            handle.shutdown().await;
        }
        Command::Preview { url, json } => {
            let feed = poller.fetch_and_parse(&url).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&feed)?);
            } else {
                println!("{} ({}) {}", feed.title, feed.format, feed.link);
                for item in &feed.items {
                    println!(
                        "  {}  {}",
                        item.published_at.format("%Y-%m-%d %H:%M"),
                        item.title
                    );
                }
            }
        }
        Command::Subscribe { url } => {
            config
                .fetch
                .url_policy()
                .validate(&url)
                .with_context(|| format!("Refusing to subscribe to '{url}'"))?;
            let feed = poller.fetch_and_parse(&url).await?;
            let id = db
                .create_feed(feed.format, &feed.title, &feed.link, &url)
                .await?;
            let refresh = poller.refresh_feed(id).await?;
            println!(
                "Subscribed to {} (id {}), {} items stored",
                feed.title, id, refresh.inserted
            );
        }
        Command::List => {
            for feed in db.list_feeds().await? {
                let status = match (&feed.last_error, feed.last_polled) {
                    (Some(err), _) => format!("error: {err}"),
                    (None, Some(at)) => format!("polled {}", at.format("%Y-%m-%d %H:%M")),
                    (None, None) => "never polled".to_string(),
                };
                println!(
                    "{:>4}  {:<4}  {}  [{}]",
                    feed.id,
                    feed.format.as_str(),
                    feed.feed_link,
                    status
                );
            }
        }
        Command::Import { file } => {
            // SEC-008: resolve symlinks and insist on a regular file
            let canonical = file
                .canonicalize()
                .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
            if !std::fs::metadata(&canonical)?.is_file() {
                anyhow::bail!("Import path must be a regular file");
            }
            let bytes = std::fs::read(&canonical)
                .with_context(|| format!("Failed to read import file: {}", canonical.display()))?;
            let report = import_opml(db, &bytes, &config.fetch.url_policy()).await?;
            println!(
                "Imported {} feeds ({} skipped)",
                report.imported, report.skipped
            );
        }
        Command::Export { output } => {
            let bytes = export_opml(db, &config.export_title, Utc::now()).await?;
            match output {
                Some(path) => {
                    write_atomic(&path, &bytes)?;
                    println!("Exported subscriptions to: {}", path.display());
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
        Command::Refresh { feed: Some(id) } => {
            let refresh = poller.refresh_feed(id).await?;
            println!(
                "Feed {}: {} new, {} already stored",
                id, refresh.inserted, refresh.duplicates
            );
        }
        Command::Refresh { feed: None } => log_outcome(poller.poll_all().await?),
        Command::Publish {
            format,
            limit,
            title,
            link,
        } => {
            let items = db.recent_items(limit).await?;
            let bytes = match format {
                PublishFormat::Rss => {
                    publish::rss_document(&title, &link, &items, Utc::now()).to_xml()?
                }
                PublishFormat::Atom => {
                    publish::atom_document(&title, &link, &items, Utc::now()).to_xml()?
                }
            };
            std::io::stdout().write_all(&bytes)?;
        }
    }
    Ok(())
}

fn log_outcome(outcome: PollOutcome) {
    match outcome {
        PollOutcome::Completed(report) => {
            for feed in report.feeds.iter().filter(|f| f.result.is_err()) {
                if let Err(e) = &feed.result {
                    eprintln!("{}: {}", feed.feed_link, e);
                }
            }
            println!(
                "Polled {} feeds: {} failed, {} new items",
                report.feeds.len(),
                report.failed(),
                report.inserted()
            );
        }
        PollOutcome::Skipped => println!("A poll is already running"),
    }
}
