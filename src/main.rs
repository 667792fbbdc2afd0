// src/main.rs

//! A small command-line front end: resolves each given path to its cell,
//! connects through the cache, and reports the outcome.

use anyhow::Result;
use cellcache::config::CacheConfig;
use cellcache::connection::tcp::{TcpDialer, TcpFailoverDialer};
use cellcache::core::{ConnCache, StaticResolver};
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--version") {
        println!("cellcache version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("cellcache.toml");

    let mut config = match CacheConfig::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };
    if args.iter().any(|arg| arg == "--failover") {
        config.use_failover = true;
    }

    // Everything that is neither a flag nor a flag's value is a path to probe.
    let paths: Vec<&str> = args
        .iter()
        .enumerate()
        .filter(|(i, arg)| {
            !arg.starts_with("--") && (*i == 0 || args[*i - 1] != "--config")
        })
        .map(|(_, arg)| arg.as_str())
        .collect();
    if paths.is_empty() {
        eprintln!("Usage: cellcache --config /path/to/cellcache.toml [--failover] <path>...");
        std::process::exit(1);
    }

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    info!(
        "Starting cellcache with {} cell(s), connect timeout {:?}, failover mode {}.",
        config.cells.len(),
        config.connect_timeout,
        config.use_failover
    );

    let cache = ConnCache::from_config(
        &config,
        Arc::new(StaticResolver::from_config(&config)),
        Arc::new(TcpDialer),
        Arc::new(TcpFailoverDialer::new(config.connect_timeout)),
    );

    let mut failures = 0usize;
    for path in paths {
        match cache.connection_for(path).await {
            Ok(_) => info!("{}: connected", path),
            Err(e) => {
                error!("{}: {}", path, e);
                failures += 1;
            }
        }
    }
    info!("Cached cells: {:?}", cache.cached_cells().await);
    cache.close().await?;

    if failures > 0 {
        std::process::exit(2);
    }
    Ok(())
}
