use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Transaction status. Only `Completed` entries move balances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxStatus {
    Completed,
    Pending,
    Failed,
}

/// Direction of a transfer relative to the tracked wallet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// What a transaction did. Amounts are kept as the strings they were
/// created with and parsed at replay time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Swap {
        from_symbol: String,
        to_symbol: String,
        from_amount: String,
        to_amount: String,
    },
    Send {
        symbol: String,
        amount: String,
    },
    Receive {
        symbol: String,
        amount: String,
    },
    TokenTransfer {
        symbol: String,
        amount: String,
        direction: Direction,
    },
}

impl TxKind {
    /// Transfer view of a non-swap kind: (symbol, amount, direction)
    pub fn as_transfer(&self) -> Option<(&str, &str, Direction)> {
        match self {
            TxKind::Swap { .. } => None,
            TxKind::Send { symbol, amount } => {
                Some((symbol.as_str(), amount.as_str(), Direction::Out))
            }
            TxKind::Receive { symbol, amount } => {
                Some((symbol.as_str(), amount.as_str(), Direction::In))
            }
            TxKind::TokenTransfer { symbol, amount, direction } => {
                Some((symbol.as_str(), amount.as_str(), *direction))
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TxKind::Swap { .. } => "SWAP",
            TxKind::Send { .. } => "SEND",
            TxKind::Receive { .. } => "RECEIVE",
            TxKind::TokenTransfer { .. } => "TOKEN_TRANSFER",
        }
    }
}

/// Immutable transaction log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: String,
    pub kind: TxKind,
    pub hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
}

impl Transaction {
    /// New completed swap with a fresh id
    pub fn swap(
        from_symbol: &str,
        to_symbol: &str,
        from_amount: &str,
        to_amount: &str,
        hash: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: TxKind::Swap {
                from_symbol: from_symbol.to_string(),
                to_symbol: to_symbol.to_string(),
                from_amount: from_amount.to_string(),
                to_amount: to_amount.to_string(),
            },
            hash,
            timestamp: Utc::now(),
            status: TxStatus::Completed,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TxStatus::Completed
    }

    /// One-line description for logs and the CLI
    pub fn describe(&self) -> String {
        match &self.kind {
            TxKind::Swap { from_symbol, to_symbol, from_amount, to_amount } => format!(
                "Swap {} {} for {} {}",
                from_amount, from_symbol, to_amount, to_symbol
            ),
            other => match other.as_transfer() {
                Some((symbol, amount, Direction::In)) => format!("Received {} {}", amount, symbol),
                Some((symbol, amount, Direction::Out)) => format!("Sent {} {}", amount, symbol),
                None => other.label().to_string(),
            },
        }
    }
}

/// Parse a stored amount. Unparseable or negative input counts as zero.
pub fn parse_amount(raw: &str, tx_id: &str) -> Decimal {
    match raw.trim().parse::<Decimal>() {
        Ok(v) if v >= Decimal::ZERO => v,
        Ok(v) => {
            warn!("Negative amount {} in tx {}, treating as 0", v, tx_id);
            Decimal::ZERO
        }
        Err(e) => {
            warn!("Unparseable amount {:?} in tx {}: {}, treating as 0", raw, tx_id, e);
            Decimal::ZERO
        }
    }
}

/// Authoritative price for one asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSnapshot {
    pub asset_id: String,
    pub symbol: String,
    pub price: Decimal,
    pub change_percent_24h: Decimal,
}

/// Prices keyed by upper-case symbol
pub type PriceMap = HashMap<String, PriceSnapshot>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount_tolerates_garbage() {
        assert_eq!(parse_amount("1.25", "t"), dec!(1.25));
        assert_eq!(parse_amount(" 3 ", "t"), dec!(3));
        assert_eq!(parse_amount("abc", "t"), Decimal::ZERO);
        assert_eq!(parse_amount("", "t"), Decimal::ZERO);
        assert_eq!(parse_amount("-4", "t"), Decimal::ZERO);
    }

    #[test]
    fn test_transfer_view() {
        let send = TxKind::Send { symbol: "ETH".into(), amount: "1".into() };
        assert_eq!(send.as_transfer(), Some(("ETH", "1", Direction::Out)));

        let swap = Transaction::swap("ETH", "USDT", "1", "500", None);
        assert!(swap.kind.as_transfer().is_none());
        assert!(swap.is_completed());
        assert_eq!(swap.describe(), "Swap 1 ETH for 500 USDT");
    }

    #[test]
    fn test_serde_shape() {
        let tx = Transaction {
            id: "abc".into(),
            kind: TxKind::TokenTransfer {
                symbol: "USDT".into(),
                amount: "100".into(),
                direction: Direction::In,
            },
            hash: None,
            timestamp: Utc::now(),
            status: TxStatus::Pending,
        };
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"type\":\"TOKEN_TRANSFER\""));
        assert!(json.contains("\"direction\":\"in\""));
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }
}
