use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use optrade_broker::{PaperBroker, UpstoxClient};
use optrade_core::config::TradingMode;
use optrade_core::traits::Broker;
use optrade_core::ConfigLoader;
use optrade_engine::TradingEngine;
use optrade_store::Database;
use optrade_web_api::ApiServer;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "optrade")]
#[command(about = "Automated NIFTY options trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading engine with the admin API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the effective configuration and exit
    ShowConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run { config } => run(&config).await?,
        Commands::ShowConfig { config } => show_config(&config)?,
    }

    Ok(())
}

async fn run(config_path: &str) -> Result<()> {
    let cfg = ConfigLoader::load_from(config_path)?;
    info!(
        symbol = %cfg.engine.symbol,
        mode = ?cfg.engine.trading_mode,
        "configuration loaded"
    );

    let store = Arc::new(Database::connect(&cfg.database.url).await?);
    let upstox = Arc::new(UpstoxClient::new(&cfg.upstox)?);
    let broker: Arc<dyn Broker> = match cfg.engine.trading_mode {
        TradingMode::Paper => {
            info!("paper mode: orders are simulated locally");
            Arc::new(PaperBroker::new(upstox))
        }
        TradingMode::Live => {
            warn!("live mode: orders will reach the exchange");
            upstox
        }
    };

    let risk_cfg = cfg.risk.clone();
    let server_addr = format!("{}:{}", cfg.server.host, cfg.server.port);

    let (mut engine, handle) = TradingEngine::new(cfg, broker, store.clone());
    let engine_task = tokio::spawn(async move { engine.run().await });

    let api = ApiServer::new(handle.clone(), store, risk_cfg);
    tokio::select! {
        result = api.serve(&server_addr) => result?,
        result = engine_task => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            handle.shutdown().await?;
        }
    }
    Ok(())
}

fn show_config(config_path: &str) -> Result<()> {
    let cfg = ConfigLoader::load_from(config_path)?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}
