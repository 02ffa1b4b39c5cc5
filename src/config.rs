//! Environment-based configuration for the BLUB bot.
//!
//! All signing keys MUST come from environment variables, never from
//! hardcoded values.
//!
//! # Environment Variables
//!
//! ## Network Configuration
//! - `NETWORK` - "mainnet" or "testnet" (default: "mainnet")
//! - `SOROBAN_RPC_URL` - Soroban JSON-RPC endpoint (required)
//! - `HORIZON_URL` - Horizon REST endpoint (required)
//! - `NETWORK_PASSPHRASE` - passphrase transactions are signed for (required)
//!
//! ## Contracts and Keys
//! - `STAKING_CONTRACT_ID` - staking contract to watch and stake into (required)
//! - `BLUB_TOKEN_ADDRESS` - BLUB token contract (required)
//! - `ADMIN_SECRET_KEY` - admin signing seed for stake invocations (required)
//! - `BLUB_DEPLOYER_SECRET_KEY` - distributor seed for mint transfers (required)
//!
//! ## Bot Behavior
//! - `POLL_INTERVAL` - seconds between poll cycles (default: 5)
//! - `START_LEDGER` - first ledger to scan, 0 means current (default: 0)
//! - `BATCH_SIZE` - max events per getEvents page (default: 100)
//! - `BLUB_MINT_PERCENTAGE` - mint ratio, e.g. 1.1 for 110% (default: 1.1)
//! - `MAX_RETRIES` - attempts per remote phase (default: 3)
//! - `RETRY_DELAY` - seconds between attempts (default: 2)
//! - `SETTLE_DELAY` - seconds between mint and stake (default: 2)
//! - `DATABASE_PATH` - SQLite file (default: bot_events.db)
//!
//! ## Logging
//! - `LOG_LEVEL` - trace/debug/info/warn/error (default: info)
//! - `LOG_JSON` - emit JSON log lines when "true" (default: false)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Network environment. Informational tag; the signing domain always comes
/// from `NETWORK_PASSPHRASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "public" | "pubnet" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            other => Err(ConfigError::InvalidValue(
                "NETWORK".to_string(),
                format!("unknown network: {}", other),
            )),
        }
    }
}

impl Network {
    /// Canonical passphrase for this network.
    pub fn default_passphrase(&self) -> &'static str {
        match self {
            Network::Mainnet => "Public Global Stellar Network ; September 2015",
            Network::Testnet => "Test SDF Network ; September 2015",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    /// Network environment
    pub network: Network,

    /// Soroban JSON-RPC endpoint
    pub soroban_rpc_url: String,

    /// Horizon REST endpoint
    pub horizon_url: String,

    /// Passphrase transactions are signed for
    pub network_passphrase: String,

    /// Staking contract to watch and stake into
    pub staking_contract_id: String,

    /// BLUB token contract
    pub blub_token_address: String,

    /// Admin signing seed for stake invocations
    pub admin_secret_key: String,

    /// Distributor signing seed for mint transfers
    pub blub_distributor_secret_key: String,

    /// Pause between poll cycles
    pub poll_interval: Duration,

    /// Pause between attempts within a phase
    pub retry_delay: Duration,

    /// Pause between a confirmed mint and the dependent stake call
    pub settle_delay: Duration,

    /// First ledger to scan; zero anchors at the current height
    pub start_ledger: u32,

    /// Max events per getEvents page
    pub batch_size: u32,

    /// Attempts per remote phase
    pub max_retries: u32,

    /// Mint ratio in basis points; `BLUB_MINT_PERCENTAGE=1.1` becomes 11000
    pub mint_percent_bps: u32,

    /// SQLite event store path
    pub database_path: String,

    /// Log level
    pub log_level: String,

    /// Emit JSON log lines
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables. Every missing
    /// required variable is reported in one error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing: Vec<String> = Vec::new();
        let mut required = |name: &str| -> String {
            match env::var(name) {
                Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let soroban_rpc_url = required("SOROBAN_RPC_URL");
        let horizon_url = required("HORIZON_URL");
        let network_passphrase = required("NETWORK_PASSPHRASE");
        let staking_contract_id = required("STAKING_CONTRACT_ID");
        let blub_token_address = required("BLUB_TOKEN_ADDRESS");
        let admin_secret_key = required("ADMIN_SECRET_KEY");
        let blub_distributor_secret_key = required("BLUB_DEPLOYER_SECRET_KEY");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let network: Network = env::var("NETWORK")
            .unwrap_or_else(|_| "mainnet".to_string())
            .parse()?;

        Ok(Self {
            network,
            soroban_rpc_url,
            horizon_url,
            network_passphrase,
            staking_contract_id,
            blub_token_address,
            admin_secret_key,
            blub_distributor_secret_key,
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL", 5)?),
            retry_delay: Duration::from_secs(env_u64("RETRY_DELAY", 2)?),
            settle_delay: Duration::from_secs(env_u64("SETTLE_DELAY", 2)?),
            start_ledger: env_u64("START_LEDGER", 0)? as u32,
            batch_size: env_u64("BATCH_SIZE", 100)? as u32,
            max_retries: env_u64("MAX_RETRIES", 3)? as u32,
            mint_percent_bps: mint_percent_bps(env::var("BLUB_MINT_PERCENTAGE").ok().as_deref())?,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "bot_events.db".to_string()),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .to_lowercase(),
            log_json: env_flag("LOG_JSON"),
        })
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== BLUB Bot Configuration ===");
        println!("Network: {}", self.network);
        println!("Soroban RPC: {}", self.soroban_rpc_url);
        println!("Horizon: {}", self.horizon_url);
        println!("Staking Contract: {}", self.staking_contract_id);
        println!("BLUB Token: {}", self.blub_token_address);
        println!(
            "Start Ledger: {}",
            if self.start_ledger == 0 {
                "current".to_string()
            } else {
                self.start_ledger.to_string()
            }
        );
        println!("Poll Interval: {}s", self.poll_interval.as_secs());
        println!("Batch Size: {}", self.batch_size);
        println!("Mint Ratio: {} bps", self.mint_percent_bps);
        println!(
            "Retries: {} per phase, {}s apart",
            self.max_retries,
            self.retry_delay.as_secs()
        );
        println!("Database: {}", self.database_path);
        println!("Log Level: {}", self.log_level);
        println!("==============================");
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        env::var(name).unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Parse the mint ratio into basis points. Accepts a plain ratio such as
/// "1.1"; absent or empty means 110%.
fn mint_percent_bps(raw: Option<&str>) -> Result<u32, ConfigError> {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw.trim(),
        _ => return Ok(11_000),
    };
    let ratio: f64 = raw.parse().map_err(|_| {
        ConfigError::InvalidValue("BLUB_MINT_PERCENTAGE".to_string(), raw.to_string())
    })?;
    if !(0.0..=1000.0).contains(&ratio) {
        return Err(ConfigError::InvalidValue(
            "BLUB_MINT_PERCENTAGE".to_string(),
            raw.to_string(),
        ));
    }
    Ok((ratio * 10_000.0).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("public".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("TESTNET".parse::<Network>(), Ok(Network::Testnet)));
        assert!("goerli".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_passphrases() {
        assert!(Network::Mainnet
            .default_passphrase()
            .starts_with("Public Global Stellar Network"));
        assert!(Network::Testnet
            .default_passphrase()
            .starts_with("Test SDF Network"));
    }

    #[test]
    fn test_mint_ratio_to_basis_points() {
        assert_eq!(mint_percent_bps(None).unwrap(), 11_000);
        assert_eq!(mint_percent_bps(Some("")).unwrap(), 11_000);
        assert_eq!(mint_percent_bps(Some("1.1")).unwrap(), 11_000);
        assert_eq!(mint_percent_bps(Some("1")).unwrap(), 10_000);
        assert_eq!(mint_percent_bps(Some("0.5")).unwrap(), 5_000);
        assert_eq!(mint_percent_bps(Some("2.25")).unwrap(), 22_500);
        assert!(mint_percent_bps(Some("lots")).is_err());
        assert!(mint_percent_bps(Some("-1")).is_err());
    }

    #[test]
    fn test_missing_error_lists_every_name() {
        let err = ConfigError::Missing(vec![
            "SOROBAN_RPC_URL".to_string(),
            "ADMIN_SECRET_KEY".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("SOROBAN_RPC_URL"));
        assert!(text.contains("ADMIN_SECRET_KEY"));
    }
}
