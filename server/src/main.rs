use clap::Parser;
use log::{error, info};
use server::catalog::ItemCatalog;
use server::config::{seconds, ServerConfig};
use server::network::Server;
use std::path::PathBuf;

/// Authoritative survival game server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "7777")]
    port: u16,
    /// Seconds between survival stat updates
    #[clap(long, default_value = "1.0")]
    stats_update_rate: f64,
    /// Seconds between stat syncs to clients
    #[clap(long, default_value = "2.0")]
    stats_sync_rate: f64,
    /// Seconds without a heartbeat before a player is dropped
    #[clap(long, default_value = "10.0")]
    heartbeat_timeout: f64,
    /// Seconds between timeout sweeps
    #[clap(long, default_value = "5.0")]
    monitor_interval: f64,
    /// Maximum number of concurrent players
    #[clap(short, long, default_value = "64")]
    max_players: usize,
    /// Players spawn within this distance of the spawn point
    #[clap(long, default_value = "5.0")]
    spawn_radius: f32,
    /// JSON file with item definitions (built-in table if omitted)
    #[clap(long)]
    items: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        stats_update_rate: seconds("stats update rate", args.stats_update_rate)?,
        stats_sync_rate: seconds("stats sync rate", args.stats_sync_rate)?,
        heartbeat_timeout: seconds("heartbeat timeout", args.heartbeat_timeout)?,
        monitor_interval: seconds("monitor interval", args.monitor_interval)?,
        max_players: args.max_players,
        spawn_radius: args.spawn_radius,
        ..ServerConfig::default()
    };

    let catalog = match &args.items {
        Some(path) => {
            info!("Loading items from {}", path.display());
            ItemCatalog::load(path)?
        }
        None => ItemCatalog::default(),
    };

    let server = match Server::bind(config, catalog).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
