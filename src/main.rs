//! Charge settlement service
//!
//! ```sh
//! # Run with default config (~/.config/charge-settlement/config.toml)
//! charge-settlement
//!
//! # Local development: in-memory store, sandbox payments
//! charge-settlement --memory --sandbox
//!
//! # Validate config without starting
//! charge-settlement --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use charge_settlement::config::{default_config_path, AppConfig, MEMORY_DATABASE_URL};
use charge_settlement::server::{init_tracing, ServerHandle, ServerOptions};

/// EV charging session and settlement service.
#[derive(Parser, Debug)]
#[command(
    name = "charge-settlement",
    version,
    about = "Charging-session lifecycle, wallet ledger and payment settlement"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "SETTLEMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Use the in-memory store regardless of `database.url`.
    #[arg(long)]
    memory: bool,

    /// Use the sandbox payment gateway instead of the remote provider.
    #[arg(long)]
    sandbox: bool,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let loaded = AppConfig::load(&config_path);

    let mut config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => AppConfig::default(),
    };
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config);

    match loaded {
        Ok(_) => info!("Configuration loaded from {}", config_path.display()),
        Err(e) => {
            error!("Failed to load config from {}: {}", config_path.display(), e);
            if cli.check {
                return Err(e.into());
            }
            error!("Using default configuration.");
        }
    }

    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }
    if cli.memory {
        info!("CLI override: in-memory store");
        config.database.url = MEMORY_DATABASE_URL.to_string();
    }
    if cli.sandbox {
        info!("CLI override: sandbox payment gateway");
        config.gateway.sandbox = true;
    }

    if cli.check {
        config.validate()?;
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   HTTP address: {}", config.server.address());
        println!("   Database    : {}", config.database.url);
        println!(
            "   Gateway     : {}",
            if config.gateway.sandbox { "sandbox" } else { config.gateway.base_url.as_str() }
        );
        println!("   Stations    : {}", config.rates.stations.len());
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: cli.no_migrate.then_some(false),
    })
    .await?;

    handle.install_signal_handler();
    info!("Press Ctrl+C to shutdown gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
