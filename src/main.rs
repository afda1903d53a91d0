//! Console Backend - Main Application
//!
//! Serves the network flows console plugin API.

use console_backend::{config::AppConfig, server::start_server};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Console Backend - Network Flows Console Plugin Server
#[derive(Parser)]
#[command(name = "console-backend")]
#[command(about = "Backend for the network flows console plugin")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Server host
    #[arg(long, env = "CONSOLE_BACKEND_SERVER_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(short, long, env = "CONSOLE_BACKEND_SERVER_PORT")]
    port: Option<u16>,

    /// Frontend configuration YAML file
    #[arg(long, env = "CONSOLE_BACKEND_FRONTEND_CONFIG")]
    frontend_config: Option<String>,

    /// Loki base URL
    #[arg(long, env = "CONSOLE_BACKEND_LOKI_URL")]
    loki_url: Option<String>,

    /// Skip TLS verification towards Loki
    #[arg(long)]
    loki_skip_tls: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Server,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("console_backend={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = if std::path::Path::new(&cli.config).exists() {
        AppConfig::load_from_file(&cli.config).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config file, using defaults");
            AppConfig::default()
        })
    } else {
        AppConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        })
    };

    // Override with CLI args
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(frontend_config) = cli.frontend_config {
        config.server.frontend_config = frontend_config;
    }
    if let Some(loki_url) = cli.loki_url {
        config.loki.url = Some(loki_url);
    }
    if cli.loki_skip_tls {
        config.loki.skip_tls = true;
    }

    match cli.command {
        Some(Commands::Server) | None => {
            tracing::info!(
                host = %config.server.host,
                port = %config.server.port,
                "Starting console backend"
            );
            start_server(config).await?;
        }
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
