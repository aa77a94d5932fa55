use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::networks::parse_chain_id;
use crate::price_feed::FeedConfig;
use crate::price_source::tracked_ids;

#[derive(Debug, Clone)]
pub struct Config {
    // Endpoints
    pub price_api_url: String,
    pub explorer_api_url: String,
    pub explorer_api_key: Option<String>,

    // Wallet
    pub rpc_url: Option<String>,
    pub private_key: Option<String>,
    pub wallet_address: Option<String>,
    pub chain_id: u64,

    // Price feed
    pub price_refresh_secs: u64,
    pub price_tick_ms: u64,
    pub jitter: Decimal,

    // Balances
    pub balance_poll_secs: u64,
    pub history_poll_secs: u64,
    pub demo_balances: HashMap<String, Decimal>,

    // Mode
    pub simulate_swaps: bool,
    pub data_dir: PathBuf,
    pub log_level: String,
}

fn var_or<T: FromStr>(name: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid {}: {:?}", name, raw))
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `SYMBOL:amount` pairs separated by commas, e.g. `USDT:10000,BTC:0.5`
pub fn parse_balances(raw: &str) -> Result<HashMap<String, Decimal>> {
    let mut balances = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (symbol, amount) = pair
            .split_once(':')
            .with_context(|| format!("Expected SYMBOL:amount, got {:?}", pair))?;
        let amount: Decimal = amount
            .trim()
            .parse()
            .with_context(|| format!("Invalid amount in {:?}", pair))?;
        if amount < Decimal::ZERO {
            bail!("Negative balance in {:?}", pair);
        }
        balances.insert(symbol.trim().to_uppercase(), amount);
    }
    Ok(balances)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            // Endpoints
            price_api_url: env::var("PRICE_API_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            explorer_api_url: env::var("EXPLORER_API_URL")
                .unwrap_or_else(|_| "https://api.etherscan.io/api".to_string()),
            explorer_api_key: non_empty("EXPLORER_API_KEY"),

            // Wallet
            rpc_url: non_empty("RPC_URL"),
            private_key: non_empty("PRIVATE_KEY"),
            wallet_address: non_empty("WALLET_ADDRESS"),
            chain_id: {
                let raw = env::var("CHAIN_ID").unwrap_or_else(|_| "1".to_string());
                parse_chain_id(&raw).with_context(|| format!("Invalid CHAIN_ID: {:?}", raw))?
            },

            // Price feed
            price_refresh_secs: var_or("PRICE_REFRESH_SECS", "60")?,
            price_tick_ms: var_or("PRICE_TICK_MS", "1000")?,
            jitter: var_or("JITTER", "0.0005")?,

            // Balances
            balance_poll_secs: var_or("BALANCE_POLL_SECS", "10")?,
            history_poll_secs: var_or("HISTORY_POLL_SECS", "60")?,
            demo_balances: parse_balances(
                &env::var("DEMO_BALANCES").unwrap_or_else(|_| "USDT:10000,BTC:0.5,SOL:50".to_string()),
            )
            .context("Invalid DEMO_BALANCES")?,

            // Mode
            simulate_swaps: env::var("SIMULATE_SWAPS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string())),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.price_refresh_secs == 0 || self.price_tick_ms == 0 {
            bail!("Price intervals must be greater than zero");
        }
        if self.balance_poll_secs == 0 || self.history_poll_secs == 0 {
            bail!("Balance poll intervals must be greater than zero");
        }
        if self.jitter < Decimal::ZERO || self.jitter >= Decimal::ONE {
            bail!("JITTER must be in [0, 1), got {}", self.jitter);
        }
        Ok(())
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            asset_ids: tracked_ids(),
            refresh_interval: Duration::from_secs(self.price_refresh_secs),
            tick_interval: Duration::from_millis(self.price_tick_ms),
            jitter: self.jitter,
        }
    }

    pub fn balance_poll_interval(&self) -> Duration {
        Duration::from_secs(self.balance_poll_secs)
    }

    pub fn history_poll_interval(&self) -> Duration {
        Duration::from_secs(self.history_poll_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_balances() {
        let parsed = parse_balances("usdt:10000, BTC:0.5,,SOL : 50").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["USDT"], dec!(10000));
        assert_eq!(parsed["BTC"], dec!(0.5));
        assert_eq!(parsed["SOL"], dec!(50));

        assert!(parse_balances("").unwrap().is_empty());
        assert!(parse_balances("USDT").is_err());
        assert!(parse_balances("USDT:lots").is_err());
        assert!(parse_balances("USDT:-1").is_err());
    }
}
