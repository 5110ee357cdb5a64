//! Configuration management for the sale service.
//!
//! Loads service settings from environment variables and the sale terms from
//! an optional JSON file.

use std::path::PathBuf;

use crowdsale::SaleConfig;

use crate::errors::{ApiError, Result};

/// How purchases are settled against the payment and sale tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    /// In-process token book; balances live only as long as the process.
    Ledger,
    /// Remote JSON-RPC settlement endpoint.
    Rpc,
}

impl SettlementMode {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "ledger" => Ok(Self::Ledger),
            "rpc" => Ok(Self::Rpc),
            other => Err(ApiError::Config(format!(
                "SETTLEMENT_MODE must be 'ledger' or 'rpc', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL (e.g., sqlite:crowdsale.db)
    pub database_url: String,

    /// Socket address the HTTP server binds to
    pub bind_addr: String,

    /// Optional path to a JSON-encoded sale configuration
    pub sale_config_path: Option<PathBuf>,

    pub settlement_mode: SettlementMode,

    /// JSON-RPC settlement endpoint, required in `rpc` mode
    pub settlement_rpc_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Shared secret expected in `x-admin-key` on admin routes
    pub admin_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional variables (with defaults):
    /// - `DATABASE_URL`: SQLite URL (defaults to `sqlite:crowdsale.db`)
    /// - `BIND_ADDR`: listen address (defaults to `0.0.0.0:8080`)
    /// - `SALE_CONFIG`: path to a JSON sale configuration (defaults to built-in terms)
    /// - `SETTLEMENT_MODE`: `ledger` or `rpc` (defaults to `ledger`)
    /// - `SETTLEMENT_RPC_URL`: settlement endpoint for `rpc` mode
    /// - `TIMEOUT_SECS`: settlement request timeout (defaults to 30)
    /// - `ADMIN_KEY`: admin route secret (admin routes are open when unset)
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:crowdsale.db".to_string()),

            bind_addr: env_var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),

            sale_config_path: env_var("SALE_CONFIG").ok().map(PathBuf::from),

            settlement_mode: SettlementMode::parse(
                &env_var("SETTLEMENT_MODE").unwrap_or_else(|_| "ledger".to_string()),
            )?,

            settlement_rpc_url: env_var("SETTLEMENT_RPC_URL").ok(),

            timeout_secs: env_var("TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid TIMEOUT_SECS".to_string()))?,

            admin_key: env_var("ADMIN_KEY").ok().filter(|k| !k.is_empty()),
        })
    }

    /// Validate that the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if !self.database_url.starts_with("sqlite:") {
            return Err(ApiError::Config(
                "DATABASE_URL must be a sqlite: URL".to_string(),
            ));
        }

        if self.settlement_mode == SettlementMode::Rpc {
            match &self.settlement_rpc_url {
                None => {
                    return Err(ApiError::Config(
                        "SETTLEMENT_RPC_URL is required when SETTLEMENT_MODE=rpc".to_string(),
                    ))
                }
                Some(url) if !url.starts_with("http") => {
                    return Err(ApiError::Config(
                        "SETTLEMENT_RPC_URL must be a valid HTTP(S) URL".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }

        if self.timeout_secs == 0 {
            return Err(ApiError::Config("TIMEOUT_SECS must be positive".to_string()));
        }

        Ok(())
    }

    /// Read the sale terms from `SALE_CONFIG`, or fall back to the built-in ones.
    pub fn load_sale_config(&self) -> Result<SaleConfig> {
        let sale = match &self.sale_config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str::<SaleConfig>(&raw).map_err(|e| {
                    ApiError::Config(format!("Invalid sale config {}: {e}", path.display()))
                })?
            }
            None => SaleConfig::default(),
        };
        sale.validate()?;
        Ok(sale)
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| ApiError::Config(format!("Missing required environment variable: {key}")))
}
