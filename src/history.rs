//! Transaction history from an Etherscan-style explorer API.
//!
//! Native transfers (`action=txlist`) become `Send`/`Receive` in the chain's
//! native symbol, token transfers (`action=tokentx`) become `TokenTransfer`.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::types::{Direction, Transaction, TxKind, TxStatus};

const TIMEOUT_SECS: u64 = 15;
const DEFAULT_DECIMALS: u32 = 18;

/// Source of externally recorded transactions for a wallet
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch(&self, address: &str, native_symbol: &str) -> Result<Vec<Transaction>, FeedError>;
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTx {
    hash: String,
    from: String,
    to: String,
    value: String,
    time_stamp: String,
    #[serde(default)]
    is_error: Option<String>,
    #[serde(default, rename = "txreceipt_status")]
    receipt_status: Option<String>,
    #[serde(default)]
    token_symbol: Option<String>,
    #[serde(default)]
    token_decimal: Option<String>,
    #[serde(default)]
    log_index: Option<String>,
}

impl ExplorerTx {
    fn failed(&self) -> bool {
        self.is_error.as_deref() == Some("1") || self.receipt_status.as_deref() == Some("0")
    }

    fn is_self_transfer(&self, address: &str) -> bool {
        self.from.eq_ignore_ascii_case(address) && self.to.eq_ignore_ascii_case(address)
    }

    /// Outgoing wins when both ends are the wallet
    fn direction(&self, address: &str) -> Option<Direction> {
        if self.from.eq_ignore_ascii_case(address) {
            Some(Direction::Out)
        } else if self.to.eq_ignore_ascii_case(address) {
            Some(Direction::In)
        } else {
            None
        }
    }
}

/// Scale an integer amount in the smallest unit down by `decimals`.
/// Anything unparseable counts as zero.
pub fn scale_units(raw: &str, decimals: u32) -> Decimal {
    let parsed = raw
        .trim()
        .parse::<i128>()
        .map_err(|e| e.to_string())
        .and_then(|units| {
            Decimal::try_from_i128_with_scale(units, decimals).map_err(|e| e.to_string())
        });

    match parsed {
        Ok(amount) => amount.normalize(),
        Err(e) => {
            warn!("Unparseable explorer value {:?} ({} decimals): {}", raw, decimals, e);
            Decimal::ZERO
        }
    }
}

/// Explorer client (Etherscan, Polygonscan, BscScan share the API)
pub struct ExplorerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, action: &str, address: &str) -> String {
        let mut url = format!(
            "{}?module=account&action={}&address={}&startblock=0&endblock=99999999&sort=asc",
            self.base_url, action, address
        );
        if let Some(key) = &self.api_key {
            url.push_str("&apikey=");
            url.push_str(key);
        }
        url
    }

    async fn fetch_list(&self, action: &str, address: &str) -> Result<Vec<ExplorerTx>, FeedError> {
        let response = self.client.get(self.url(action, address)).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status {
                source_name: "explorer",
                status: response.status().as_u16(),
            });
        }

        let body: ExplorerResponse = response.json().await?;
        parse_explorer_response(body)
    }
}

fn parse_explorer_response(body: ExplorerResponse) -> Result<Vec<ExplorerTx>, FeedError> {
    if body.status == "1" {
        return serde_json::from_value(body.result).map_err(|e| FeedError::Parse(e.to_string()));
    }
    if body.message.starts_with("No transactions found") {
        return Ok(vec![]);
    }
    Err(FeedError::Parse(format!("explorer error: {} ({})", body.message, body.result)))
}

#[async_trait]
impl HistorySource for ExplorerClient {
    async fn fetch(&self, address: &str, native_symbol: &str) -> Result<Vec<Transaction>, FeedError> {
        let (native, tokens) = tokio::try_join!(
            self.fetch_list("txlist", address),
            self.fetch_list("tokentx", address),
        )?;
        debug!(
            "Explorer returned {} native and {} token transfers for {}",
            native.len(),
            tokens.len(),
            address
        );

        let mut transactions = native_transactions(&native, address, native_symbol);
        transactions.extend(token_transactions(&tokens, address));
        // Stable: same-second records keep explorer order
        transactions.sort_by_key(|tx| tx.timestamp);
        Ok(transactions)
    }
}

fn timestamp_of(record: &ExplorerTx) -> chrono::DateTime<Utc> {
    record
        .time_stamp
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}

fn status_of(record: &ExplorerTx) -> TxStatus {
    if record.failed() {
        TxStatus::Failed
    } else {
        TxStatus::Completed
    }
}

fn native_transactions(records: &[ExplorerTx], address: &str, native_symbol: &str) -> Vec<Transaction> {
    records
        .iter()
        .filter_map(|record| {
            let direction = record.direction(address)?;
            let amount = scale_units(&record.value, DEFAULT_DECIMALS).to_string();
            let symbol = native_symbol.to_string();
            let kind = match direction {
                Direction::In => TxKind::Receive { symbol, amount },
                Direction::Out => TxKind::Send { symbol, amount },
            };

            Some(Transaction {
                id: record.hash.clone(),
                kind,
                hash: Some(record.hash.clone()),
                timestamp: timestamp_of(record),
                status: status_of(record),
            })
        })
        .collect()
}

fn token_transactions(records: &[ExplorerTx], address: &str) -> Vec<Transaction> {
    records
        .iter()
        .enumerate()
        .filter_map(|(position, record)| {
            // Tokens sent to oneself never leave the wallet
            if record.is_self_transfer(address) {
                debug!("Skipping token self-transfer {}", record.hash);
                return None;
            }
            let direction = record.direction(address)?;
            let decimals = record
                .token_decimal
                .as_deref()
                .and_then(|d| d.parse().ok())
                .unwrap_or(DEFAULT_DECIMALS);
            let symbol = record
                .token_symbol
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string());
            let log_position = record
                .log_index
                .clone()
                .unwrap_or_else(|| position.to_string());

            Some(Transaction {
                id: format!("{}:{}", record.hash, log_position),
                kind: TxKind::TokenTransfer {
                    symbol,
                    amount: scale_units(&record.value, decimals).to_string(),
                    direction,
                },
                hash: Some(record.hash.clone()),
                timestamp: timestamp_of(record),
                status: status_of(record),
            })
        })
        .collect()
}
