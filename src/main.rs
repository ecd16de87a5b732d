//! RingCache - Transactional Object Cache with Ring Leader Election
//!
//! Runs a cache node: the election ring, the cache server and its HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ringcache::api::HttpServer;
use ringcache::cache::{CacheServer, HttpDataStore};
use ringcache::cluster::{Membership, StaticMembership};
use ringcache::config::RingCacheConfig;
use ringcache::coordinator::LocalCoordinator;
use ringcache::election::{ElectionConfig, ElectionDriver, LeaderElection, RingElection, TokioTimers};
use ringcache::error::{Error, Result};
use ringcache::network::{NetworkClient, NetworkServer};

/// RingCache - Transactional Object Cache with Ring Leader Election
#[derive(Parser)]
#[command(name = "ringcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ringcache.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the cache node
    Start,

    /// Check node status
    Status {
        /// Node API address to query
        #[arg(short, long, default_value = "localhost:8080")]
        address: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "ringcache.toml")]
        output: PathBuf,

        /// Election identifier of the node
        #[arg(long, default_value = "1")]
        node_id: String,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = RingCacheConfig::from_file(&cli.config)?;
            let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
            init_logging(level, &config.logging.format);
            run_start(config).await
        }
        Commands::Status { address } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "pretty");
            run_status(address).await
        }
        Commands::Init { output, node_id } => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_init(output, node_id)
        }
        Commands::Validate => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "pretty");
            run_validate(cli.config)
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start the cache node
async fn run_start(config: RingCacheConfig) -> Result<()> {
    tracing::info!("Starting RingCache node {}...", config.node.id);

    // Cluster membership
    let membership = Arc::new(StaticMembership::from_config(&config));
    let local = membership.local().clone();
    tracing::info!(
        "Ring of {} nodes: {:?}",
        membership.size().await,
        membership
            .known_nodes()
            .await
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
    );

    // Election
    let (events_tx, events_rx) = mpsc::channel(config.election.event_queue_size);
    let transport = Arc::new(NetworkClient::new(
        config.connect_timeout(),
        config.ack_timeout(),
    ));
    let timers = Arc::new(TokioTimers::new(events_tx.clone()));
    let election = Arc::new(RingElection::new(
        local,
        membership,
        transport,
        timers,
        ElectionConfig {
            ack_timeout_ms: config.election.ack_timeout_ms,
        },
        events_tx.clone(),
    ));
    let driver_handle = ElectionDriver::new(Arc::clone(&election), events_rx).spawn();

    // Election traffic
    let network_server = Arc::new(NetworkServer::new(
        config.node.bind_address.clone(),
        events_tx,
    ));
    let network_handle = {
        let server = Arc::clone(&network_server);
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                tracing::error!("Network server error: {}", e);
            }
        })
    };

    // Cache
    let store = Arc::new(HttpDataStore::new(
        config.cache.data_server.clone(),
        config.request_timeout(),
    )?);
    let cache = CacheServer::new(
        store,
        election.clone(),
        Arc::new(LocalCoordinator::new(election.clone())),
    )
    .await;

    // HTTP API
    let http_server = HttpServer::new(
        config.api.clone(),
        config.node.id.clone(),
        Arc::clone(&election),
        cache,
    );
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    // Initial election
    {
        let election = Arc::clone(&election);
        tokio::spawn(async move {
            match election.elect_leader().await {
                Ok(leader) => tracing::info!("Initial election resolved, leader is {}", leader),
                Err(e) => tracing::warn!("Initial election did not complete: {}", e),
            }
        });
    }

    tracing::info!("Node {} running; press Ctrl+C to stop", config.node.id);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    network_server.stop();
    http_handle.abort();
    driver_handle.abort();
    let _ = network_handle.await;

    tracing::info!("RingCache node stopped");
    Ok(())
}

/// Check node status
async fn run_status(address: String) -> Result<()> {
    let url = format!("http://{}/status", address);

    let response = reqwest::get(&url).await.map_err(|e| Error::ConnectionFailed {
        address: address.clone(),
        reason: e.to_string(),
    })?;
    let status: serde_json::Value = response
        .json()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;
    let rendered = serde_json::to_string_pretty(&status)
        .map_err(|e| Error::Internal(e.to_string()))?;

    println!("{}", rendered);
    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: String) -> Result<()> {
    std::fs::write(&output, RingCacheConfig::sample(&node_id))?;
    println!("Configuration written to {:?}", output);
    println!("Edit the file to list the ring peers and the data server.");
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match RingCacheConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Bind Address: {}", config.node.bind_address);
            println!("  Advertise: {}", config.advertise_address());
            println!("  Peers: {}", config.cluster.peers.len());
            println!("  Data Server: {}", config.cache.data_server);
            println!("  Ack Timeout: {} ms", config.election.ack_timeout_ms);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
