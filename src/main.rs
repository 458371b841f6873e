//! Main entry point for the Match Arena matchmaking server
//!
//! Loads configuration (config.ini, environment, CLI flags), initializes
//! logging, starts the matchmaking engine and serves the TCP protocol
//! until a shutdown signal arrives.

use anyhow::Result;
use clap::Parser;
use match_arena::config::{app::validate_config, AppConfig};
use match_arena::net::MatchServer;
use match_arena::MatchManager;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Match Arena - skill-based matchmaking server
#[derive(Parser)]
#[command(
    name = "match-arena",
    version,
    about = "A skill-based matchmaking server with a line-oriented TCP protocol"
)]
struct Args {
    /// Configuration file path (key = value format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override TCP bind address
    #[arg(long, value_name = "ADDR")]
    address: Option<String>,

    /// Override TCP bind port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Override players per room
    #[arg(long, value_name = "N")]
    players_per_room: Option<usize>,

    /// Override the default strategy's rating threshold
    #[arg(long, value_name = "DIFF")]
    max_rating_diff: Option<i32>,

    /// Disable the force-match-on-timeout fallback
    #[arg(long)]
    no_force_match: bool,

    /// Override the head-waiter deadline for the fallback, in milliseconds
    #[arg(long, value_name = "MS")]
    match_timeout_ms: Option<u64>,

    /// Override log file (empty = stdout)
    #[arg(long, value_name = "FILE")]
    log_file: Option<String>,

    /// Override log level (trace, debug, info, warn, error or 0-4)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit without starting the server
    #[arg(long)]
    dry_run: bool,
}

/// Load and merge configuration from file, environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(path) = &args.config {
        AppConfig::from_file(path)?
    } else if Path::new("config.ini").exists() {
        AppConfig::from_file("config.ini")?
    } else {
        AppConfig::default()
    };

    config.merge_env()?;

    if let Some(address) = &args.address {
        config.server.address = address.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(players_per_room) = args.players_per_room {
        config.matchmaking.players_per_room = players_per_room;
    }
    if let Some(max_rating_diff) = args.max_rating_diff {
        config.matchmaking.max_rating_diff = max_rating_diff;
    }
    if args.no_force_match {
        config.matchmaking.force_match_on_timeout = false;
    }
    if let Some(match_timeout_ms) = args.match_timeout_ms {
        config.matchmaking.match_timeout_ms = match_timeout_ms;
    }
    if let Some(log_file) = &args.log_file {
        config.logging.log_file = log_file.clone();
    }
    if let Some(log_level) = &args.log_level {
        config.logging.log_level = log_level.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

/// Initialize structured logging with the configured level and sink
fn init_logging(config: &AppConfig) -> Result<()> {
    let level = config.log_level_name()?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if config.logging.log_file.is_empty() {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.log_file)?;
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

fn display_startup_banner(config: &AppConfig) {
    info!("Match Arena v{}", match_arena::VERSION);
    info!("   Bind: {}:{}", config.server.address, config.server.port);
    info!(
        "   Players per room: {}",
        config.matchmaking.players_per_room
    );
    info!(
        "   Max rating difference: {}",
        config.matchmaking.max_rating_diff
    );
    info!(
        "   Force match on timeout: {} ({}ms)",
        config.matchmaking.force_match_on_timeout, config.matchmaking.match_timeout_ms
    );
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful, exiting (dry run)");
        return Ok(());
    }

    let manager = MatchManager::new(config.matchmaking.players_per_room);
    manager.set_max_rating_difference(config.matchmaking.max_rating_diff);
    manager.set_force_match_on_timeout(config.matchmaking.force_match_on_timeout);
    manager.set_match_timeout_ms(config.matchmaking.match_timeout_ms);
    manager.init();

    let server = match MatchServer::bind(
        &config.server.address,
        config.server.port,
        Arc::clone(&manager),
    )
    .await
    {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            manager.shutdown();
            std::process::exit(1);
        }
    };

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    info!("Match Arena is running, press Ctrl+C to stop");
    wait_for_shutdown_signal().await;

    info!("Shutting down...");
    server_task.abort();
    manager.shutdown();
    info!("Match Arena stopped");
    Ok(())
}
