//! # votehub
//!
//! Vote broadcast hub binary: runs the HTTP/WebSocket server, or publishes
//! votes to a running hub.

#![deny(unsafe_code)]

mod publish;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::Level;
use votehub_core::Vote;
use votehub_server::{HubServer, ServerConfig};
use votehub_settings::{load_settings, load_settings_from_path, HubSettings};
use votehub_telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};

use crate::publish::Publisher;

const DEFAULT_HUB_URL: &str = "http://127.0.0.1:3000";

/// Real-time vote broadcast hub.
#[derive(Parser, Debug)]
#[command(name = "votehub", about = "Real-time vote broadcast hub", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the hub server (default).
    Serve(ServeArgs),
    /// Publish one vote.
    Send(SendArgs),
    /// Publish a series of random votes.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Settings file (default `~/.votehub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Hub base URL.
    #[arg(long, default_value = DEFAULT_HUB_URL)]
    url: String,

    /// Voter phone number.
    #[arg(long)]
    phone: String,

    /// Table number.
    #[arg(long)]
    table: u32,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Hub base URL.
    #[arg(long, default_value = DEFAULT_HUB_URL)]
    url: String,

    /// Number of votes to publish.
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Pause between votes in milliseconds.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Tables to pick from, comma-separated.
    #[arg(long, value_delimiter = ',', default_values_t = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10])]
    tables: Vec<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        None => serve(ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(args).await,
        Some(Command::Send(args)) => send(args).await,
        Some(Command::Simulate(args)) => simulate(args).await,
    }
}

fn load(args: &ServeArgs) -> Result<HubSettings> {
    match &args.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => load_settings().context("Failed to load settings"),
    }
}

fn server_config(settings: &HubSettings, args: ServeArgs) -> ServerConfig {
    let mut config = ServerConfig::from(settings);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config
}

async fn serve(args: ServeArgs) -> Result<()> {
    let settings = load(&args)?;
    let log_level: Level = settings
        .logging
        .level
        .parse()
        .context("Invalid log level")?;
    let telemetry = init_telemetry(&TelemetryConfig {
        log_level,
        json: settings.logging.json,
        ..TelemetryConfig::default()
    })
    .context("Failed to initialize telemetry")?;

    let config = server_config(&settings, args);
    let shutdown_timeout = config.shutdown_timeout;
    let server = HubServer::new(config, telemetry.prometheus());

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!("votehub listening on http://{addr} (streaming at ws://{addr}/api/ws)");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(shutdown_timeout))
        .await;
    tracing::info!(drained, "Shutdown complete");
    Ok(())
}

fn client_telemetry() -> Result<TelemetryGuard> {
    init_telemetry(&TelemetryConfig {
        log_level: Level::WARN,
        metrics_enabled: false,
        ..TelemetryConfig::default()
    })
    .context("Failed to initialize telemetry")
}

async fn send(args: SendArgs) -> Result<()> {
    let _telemetry = client_telemetry()?;
    let publisher = Publisher::new(&args.url);
    let vote = Vote::new(args.phone, args.table);
    let ack = publisher.publish(&vote).await?;
    println!("{}", serde_json::to_string_pretty(&ack)?);
    Ok(())
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let _telemetry = client_telemetry()?;
    let publisher = Publisher::new(&args.url);
    let mut rng = StdRng::from_os_rng();
    let sent = publish::simulate(
        &publisher,
        &mut rng,
        args.count,
        Duration::from_millis(args.interval_ms),
        &args.tables,
    )
    .await?;
    println!("published {sent} votes to {}", publisher.endpoint());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["votehub"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn serve_overrides() {
        let cli = Cli::parse_from(["votehub", "serve", "--host", "0.0.0.0", "--port", "8080"]);
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(8080));
        assert!(args.config.is_none());
    }

    #[test]
    fn serve_config_path() {
        let cli = Cli::parse_from(["votehub", "serve", "--config", "/tmp/votehub.json"]);
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.config, Some(PathBuf::from("/tmp/votehub.json")));
    }

    #[test]
    fn cli_flags_override_settings() {
        let settings = HubSettings::default();
        let args = ServeArgs {
            host: Some("127.0.0.1".into()),
            port: Some(0),
            ..ServeArgs::default()
        };
        let config = server_config(&settings, args);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 0);
        assert_eq!(config.session.keepalive_interval, Duration::from_secs(29));
    }

    #[test]
    fn settings_used_without_flags() {
        let settings = HubSettings::default();
        let config = server_config(&settings, ServeArgs::default());
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn send_args() {
        let cli = Cli::parse_from(["votehub", "send", "--phone", "+15551234567", "--table", "4"]);
        let Some(Command::Send(args)) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.url, DEFAULT_HUB_URL);
        assert_eq!(args.phone, "+15551234567");
        assert_eq!(args.table, 4);
    }

    #[test]
    fn send_requires_phone_and_table() {
        assert!(Cli::try_parse_from(["votehub", "send", "--table", "4"]).is_err());
        assert!(Cli::try_parse_from(["votehub", "send", "--phone", "1"]).is_err());
    }

    #[test]
    fn simulate_defaults() {
        let cli = Cli::parse_from(["votehub", "simulate"]);
        let Some(Command::Simulate(args)) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.count, 10);
        assert_eq!(args.interval_ms, 1000);
        assert_eq!(args.tables, (1..=10).collect::<Vec<u32>>());
    }

    #[test]
    fn simulate_table_list() {
        let cli = Cli::parse_from(["votehub", "simulate", "--tables", "2,5,7", "--count", "3"]);
        let Some(Command::Simulate(args)) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.tables, vec![2, 5, 7]);
        assert_eq!(args.count, 3);
    }
}
