//! WoT Explorer CLI
//!
//! Explore the web of trust around an identity from the terminal.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wot_core::{short_key, GraphEdge, GraphFilters, GraphNode};
use wot_explorer::{Cache, FileStorage, HttpProviderConfig, HttpTrustProvider, SharedStorage};
use wot_relay::WebSocketConnector;
use wot_runtime::{Session, SessionConfig, SessionStats};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "wot-explorer")]
#[command(author, version, about = "Web-of-trust graph explorer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trust provider base URL (or set WOT_PROVIDER_URL env var)
    #[arg(long, env = "WOT_PROVIDER_URL")]
    provider_url: Option<String>,

    /// Comma-separated relay URLs (or set WOT_RELAYS env var)
    #[arg(long, env = "WOT_RELAYS", value_delimiter = ',')]
    relays: Vec<String>,

    /// Cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore the graph around an identity
    Explore {
        /// Root identity key (defaults to the provider's identity)
        #[arg(short, long)]
        root: Option<String>,

        /// Levels to expand breadth-first
        #[arg(short, long, default_value = "1")]
        depth: u32,

        /// Hide nodes below this trust score
        #[arg(long, default_value = "0")]
        min_trust: f64,

        /// Hide nodes beyond this distance
        #[arg(long, default_value = "3")]
        max_distance: u32,

        /// Only show nodes whose label or key contains this
        #[arg(short, long)]
        search: Option<String>,

        /// Only show mutual follows of the root
        #[arg(long)]
        mutuals_only: bool,

        /// Hide mute edges
        #[arg(long)]
        no_mutes: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Page through an identity's notes
    Feed {
        /// Author identity key
        #[arg(short, long)]
        author: String,

        /// Pages to fetch
        #[arg(short, long, default_value = "1")]
        pages: usize,
    },

    /// Inspect or clear the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache contents
    Stats,
    /// Remove all cached profiles and trust facts
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.provider_url.is_some() {
        config.provider_url = cli.provider_url.clone();
    }
    if !cli.relays.is_empty() {
        config.relay.relays = cli.relays.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }

    match cli.command {
        Commands::Explore {
            root,
            depth,
            min_trust,
            max_distance,
            search,
            mutuals_only,
            no_mutes,
            json,
        } => {
            let filters = GraphFilters {
                min_trust_score: min_trust,
                max_distance,
                show_follows: true,
                show_mutes: !no_mutes,
                show_mutuals_only: mutuals_only,
                search_query: search.unwrap_or_default(),
            };
            run_explore(&config, root.as_deref(), depth, filters, json).await?;
        }
        Commands::Feed { author, pages } => {
            run_feed(&config, &author, pages).await?;
        }
        Commands::Cache { action } => {
            run_cache(&config, action)?;
        }
    }

    Ok(())
}

fn open_storage(config: &Config) -> Result<SharedStorage> {
    let storage = FileStorage::open(&config.cache_dir)
        .with_context(|| format!("Cannot open cache directory {}", config.cache_dir.display()))?;
    Ok(Arc::new(storage))
}

fn session_config(config: &Config) -> Result<SessionConfig> {
    let provider = match &config.provider_url {
        Some(url) => Some(HttpTrustProvider::shared(
            HttpProviderConfig::new(url).with_timeout(config.explorer.provider_timeout()),
        )?),
        None => None,
    };

    Ok(SessionConfig {
        explorer: config.explorer.clone(),
        relay: config.relay.clone(),
        provider,
        connector: Some(WebSocketConnector::shared(config.relay.connect_timeout())),
        storage: open_storage(config)?,
    })
}

#[derive(Serialize)]
struct ExploreOutput<'a> {
    error: Option<String>,
    stats: &'a SessionStats,
    nodes: &'a [GraphNode],
    links: &'a [GraphEdge],
}

async fn run_explore(
    config: &Config,
    root: Option<&str>,
    depth: u32,
    filters: GraphFilters,
    json: bool,
) -> Result<()> {
    let session = Session::start(session_config(config)?, root).await?;
    if depth > 1 {
        if let Err(e) = session.expand_to_depth(depth).await {
            info!("Stopped expanding: {}", e);
        }
    }
    session.settle().await;
    session.set_filters(filters);

    let stats = session.stats();
    let mut visible = session.visible();
    visible
        .nodes
        .sort_by(|a, b| b.trust_score().total_cmp(&a.trust_score()).then(a.distance.cmp(&b.distance)));

    if json {
        let output = ExploreOutput {
            error: session.error(),
            stats: &stats,
            nodes: &visible.nodes,
            links: &visible.links,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if let Some(error) = session.error() {
        println!("⚠️  {}\n", error);
    }

    println!(
        "📊 {} nodes, {} links ({} follows, {} mutes), {} mutuals, {} expanded",
        stats.graph.nodes,
        stats.graph.links,
        stats.graph.follows,
        stats.graph.mutes,
        stats.graph.mutuals,
        stats.graph.expanded
    );
    println!(
        "   Average trust: {:.2} | Cache hit rate: {:.0}%\n",
        stats.graph.avg_trust,
        stats.cache.hit_rate * 100.0
    );

    println!("{:>4}  {:>5}  {:>5}  {:<14}  {}", "HOP", "TRUST", "PATHS", "KEY", "LABEL");
    for node in &visible.nodes {
        let marker = if node.is_root {
            " (root)"
        } else if node.is_mutual {
            " ⇄"
        } else {
            ""
        };
        println!(
            "{:>4}  {:>5.2}  {:>5}  {:<14}  {}{}",
            node.distance,
            node.trust_score(),
            node.path_count(),
            short_key(&node.id),
            node.label,
            marker
        );
    }
    println!("\n{} of {} nodes shown", visible.nodes.len(), stats.graph.nodes);

    Ok(())
}

async fn run_feed(config: &Config, author: &str, pages: usize) -> Result<()> {
    let session = Session::new(session_config(config)?)?;
    let mut feed = session.feed(author)?;

    for page in 1..=pages.max(1) {
        let result = feed.next_page().await;
        info!("Page {}: {} notes", page, result.items.len());

        for note in &result.items {
            let when = Utc
                .timestamp_opt(note.created_at as i64, 0)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| note.created_at.to_string());
            let first_line = note.content.lines().next().unwrap_or_default();
            let preview: String = first_line.chars().take(100).collect();
            println!("[{}] {}", when, preview);
        }

        if !result.has_more {
            println!("\n(end of feed)");
            break;
        }
    }

    Ok(())
}

fn run_cache(config: &Config, action: CacheAction) -> Result<()> {
    let cache = Cache::open(open_storage(config)?, &config.explorer);

    match action {
        CacheAction::Stats => {
            let pruned = cache.prune();
            let stats = cache.stats();
            println!("📦 Cache at {}", config.cache_dir.display());
            println!("   Profiles: {}", stats.profiles);
            println!("   Trust facts: {}", stats.trust_facts);
            if pruned > 0 {
                println!("   Expired entries removed: {}", pruned);
            }
        }
        CacheAction::Purge => {
            cache.purge();
            println!("🧹 Cache purged");
        }
    }

    Ok(())
}
