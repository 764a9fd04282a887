//! BypassMap CLI
//!
//! Fetches the CSP bypass dataset, captures a live page's policy and lists
//! the gadgets that bypass it.

mod http;
mod store;

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};

use bm_core::capture::{NavigationCompletedEvent, ResponseHeader, ResponseHeadersEvent};
use bm_core::{
    normalize_directive, parse_dataset_with_stats, Background, BadgeIndicator, Clock, Config, DatasetRecord,
    LookupError, RequestType, SystemClock, TabId,
};

use crate::http::HttpFetcher;
use crate::store::FileStore;

/// The CLI acts as a single browser tab.
const CLI_TAB: TabId = 1;

type CliBackground = Background<FileStore, HttpFetcher, HttpFetcher, ConsoleBadge, SystemClock>;

#[derive(Parser)]
#[command(name = "bm-cli")]
#[command(about = "CSP bypass lookup: capture a page's policy and search the bypass dataset")]
struct Cli {
    /// JSON file holding the cached dataset and captured policies
    #[arg(long, env = "BYPASSMAP_STORE", default_value = "bypassmap-store.json", global = true)]
    store: PathBuf,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the dataset URL
    #[arg(long, env = "BYPASSMAP_DATASET_URL", global = true)]
    dataset_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure the cached dataset is present and fresh
    Fetch {
        /// Wipe the store first, as a background restart does
        #[arg(long)]
        reset: bool,

        /// Fetch even if the cached copy is fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Search the cached dataset
    Search {
        /// Domain, snippet, or a full CSP (`script-src ...`)
        query: String,

        /// Match the domain column only
        #[arg(long)]
        domain_only: bool,
    },

    /// Show the normalized host tokens of a directive value
    Normalize {
        value: String,
    },

    /// Capture a page's CSP (header and meta) and list matching bypasses
    Capture {
        url: String,

        /// Print the bypass code, not only the domains
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show cache and store state
    Info,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match load_config(cli.config.as_deref(), cli.dataset_url.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Fetch { reset, force } => cmd_fetch(&cli.store, config, reset, force).await,
            Commands::Search { query, domain_only } => cmd_search(&cli.store, config, &query, domain_only).await,
            Commands::Normalize { value } => cmd_normalize(&value),
            Commands::Capture { url, verbose } => cmd_capture(&cli.store, config, &url, verbose).await,
            Commands::Info => cmd_info(&cli.store, config).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>, dataset_url: Option<&str>) -> Result<Config, String> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            Config::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path.display(), e))?
        }
        None => Config::default(),
    };

    if let Some(url) = dataset_url {
        config.cache.dataset_url = url.to_string();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn open_background(store_path: &Path, config: Config) -> Result<CliBackground, String> {
    let store = FileStore::open(store_path).map_err(|e| e.to_string())?;
    let source = HttpFetcher::new(config.cache.dataset_url.as_str()).map_err(|e| e.to_string())?;
    let documents = HttpFetcher::new(config.cache.dataset_url.as_str()).map_err(|e| e.to_string())?;
    Ok(Background::new(store, source, documents, ConsoleBadge::default(), SystemClock, config))
}

async fn cmd_fetch(store_path: &Path, config: Config, reset: bool, force: bool) -> Result<(), String> {
    let background = open_background(store_path, config)?;
    let start = Instant::now();

    let text = if reset {
        background.start().await
    } else if force {
        background.cache().refresh().await.map_err(|e| e.to_string()).map(Some)?
    } else {
        background.cache().ensure_fresh().await
    };
    let text = text.ok_or_else(|| "Failed to fetch CSP data (see log for details)".to_string())?;

    let (_, stats) = parse_dataset_with_stats(&text);
    println!("Dataset from '{}'", background.cache().source().dataset_url());
    println!("  Size:     {} bytes ({:.1} KB)", text.len(), text.len() as f64 / 1024.0);
    println!("  Records:  {} ({} lines, {} dropped)", stats.records, stats.lines, stats.dropped);
    println!("  Store:    {}", background.store().path().display());
    println!("  Time:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

async fn cmd_search(store_path: &Path, config: Config, query: &str, domain_only: bool) -> Result<(), String> {
    let background = open_background(store_path, config)?;
    let session = background.open_popup(None).await;
    if session.records().is_empty() {
        return Err("CSP data is not available. Run `bm-cli fetch` first.".to_string());
    }

    let results = if domain_only {
        session.search_box(query)
    } else {
        session.search(query)
    };

    print_records(&results, true);
    println!("{} of {} records matched", results.len(), session.records().len());
    Ok(())
}

fn cmd_normalize(value: &str) -> Result<(), String> {
    for token in normalize_directive(value) {
        println!("{}", token);
    }
    Ok(())
}

async fn cmd_capture(store_path: &Path, config: Config, url: &str, verbose: bool) -> Result<(), String> {
    let background = open_background(store_path, config)?;
    if background.cache().ensure_fresh().await.is_none() {
        log::warn!("Dataset unavailable, capture results will not be matched");
    }

    let headers = background
        .capture()
        .documents()
        .response_headers(url)
        .await
        .map_err(|e| e.to_string())?;
    let header_views: Vec<ResponseHeader<'_>> = headers
        .iter()
        .map(|(name, value)| ResponseHeader { name, value })
        .collect();

    background
        .on_response_headers(&ResponseHeadersEvent {
            tab_id: CLI_TAB,
            url,
            headers: &header_views,
        })
        .await;
    background
        .on_navigation_completed(&NavigationCompletedEvent {
            tab_id: CLI_TAB,
            url,
            request_type: RequestType::MAIN_FRAME,
        })
        .await;

    let session = background.open_popup(Some(url)).await;
    let policy = match session.active_policy() {
        Ok(policy) => policy,
        Err(LookupError::NoPolicy(domain)) => {
            println!("No CSP found for {}", if domain.is_empty() { url } else { domain.as_str() });
            return Ok(());
        }
        Err(e) => return Err(e.to_string()),
    };

    println!("Domain:   {}", policy.domain);
    println!("Source:   {:?}", policy.source);
    println!("Badge:    {}", background.capture().badge().last().unwrap_or_default());
    println!("Policy:   {}", policy.value);
    println!();

    let results = session.seeded_results();
    println!("Bypasses: {}", results.len());
    print_records(&results, verbose);

    Ok(())
}

async fn cmd_info(store_path: &Path, config: Config) -> Result<(), String> {
    let background = open_background(store_path, config)?;
    let cache_config = background.config().cache.clone();

    println!("Store: {}", background.store().path().display());
    println!("  Dataset URL: {}", cache_config.dataset_url);
    println!("  TTL:         {}s", cache_config.ttl_secs);
    println!();

    match background.cache().load().await.map_err(|e| e.to_string())? {
        Some(entry) => {
            let now = background.cache().clock().now_millis();
            let (_, stats) = parse_dataset_with_stats(&entry.raw_text);
            println!("Dataset:");
            println!("  Size:        {} bytes", entry.raw_text.len());
            println!("  Age:         {}s", entry.age(now).as_secs());
            println!("  Fresh:       {}", entry.is_fresh(now, cache_config.ttl()));
            println!("  Records:     {} ({} lines, {} dropped)", stats.records, stats.lines, stats.dropped);
        }
        None => println!("Dataset: not cached"),
    }
    println!();

    let captured: Vec<String> = background
        .store()
        .keys()
        .into_iter()
        .filter(|key| *key != cache_config.payload_key && *key != cache_config.timestamp_key)
        .collect();
    println!("Captured policies: {}", captured.len());
    for domain in captured {
        println!("  {}", domain);
    }

    Ok(())
}

fn print_records(records: &[&DatasetRecord], with_code: bool) {
    for record in records {
        if with_code {
            println!("{}\t{}", record.domain, record.code);
        } else {
            println!("  {}", record.domain);
        }
    }
}

/// Badge sink for a terminal: logs and remembers the last text.
#[derive(Default)]
struct ConsoleBadge {
    last: RefCell<Option<String>>,
}

impl ConsoleBadge {
    fn last(&self) -> Option<String> {
        self.last.borrow().clone()
    }
}

impl BadgeIndicator for ConsoleBadge {
    fn set_badge_text(&self, tab_id: TabId, text: &str) {
        log::info!("Badge for tab {}: {:?}", tab_id, text);
        *self.last.borrow_mut() = Some(text.to_string());
    }

    fn set_badge_background_color(&self, tab_id: TabId, color: [u8; 4]) {
        log::debug!("Badge color for tab {}: {:?}", tab_id, color);
    }
}
