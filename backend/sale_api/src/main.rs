//! Crowdsale Service
//!
//! Standalone service that:
//! 1. Restores (or initializes) the phased sale from SQLite
//! 2. Serializes purchases through a single sale desk
//! 3. Exposes the sale over a REST API

mod api;
mod config;
mod db;
mod errors;
mod service;
mod settlement;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crowdsale::{SystemClock, TokenBook};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::ApiState;
use crate::config::{Config, SettlementMode};
use crate::service::SaleService;
use crate::settlement::{RpcSettlement, Settler};

/// Accounts used by the in-process token book.
const SALE_ACCOUNT: &str = "crowdsale";
const TREASURY_ACCOUNT: &str = "treasury";

#[derive(Parser, Debug)]
#[command(name = "sale-api")]
#[command(about = "Crowdsale service - phased token sale over HTTP", long_about = None)]
struct Cli {
    /// Override BIND_ADDR
    #[arg(long)]
    bind: Option<String>,

    /// Print the resolved sale configuration as JSON and exit
    #[arg(long, default_value_t = false)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    config.validate()?;

    let sale_config = config.load_sale_config()?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&sale_config)?);
        return Ok(());
    }

    info!(
        "Crowdsale service starting - {} phases, settlement {:?}",
        sale_config.phases.len(),
        config.settlement_mode
    );

    let pool = db::init_pool(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let settler = match config.settlement_mode {
        SettlementMode::Ledger => {
            warn!("LEDGER MODE - balances are held in memory and lost on restart");
            Settler::Book(TokenBook::new(SALE_ACCOUNT, TREASURY_ACCOUNT))
        }
        SettlementMode::Rpc => {
            let url = config
                .settlement_rpc_url
                .clone()
                .context("SETTLEMENT_RPC_URL is not set")?;
            Settler::Rpc(RpcSettlement::new(url, config.timeout_secs)?)
        }
    };

    let service = SaleService::open(pool, sale_config, Arc::new(SystemClock), settler).await?;
    service.fund_treasury().await?;

    let state = Arc::new(ApiState {
        service: Arc::new(service),
        admin_key: config.admin_key.clone(),
    });
    if state.admin_key.is_none() {
        warn!("ADMIN_KEY not set - admin routes are unauthenticated");
    }

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Crowdsale service stopped");
    Ok(())
}
