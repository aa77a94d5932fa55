use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::FeedError;
use crate::types::PriceSnapshot;

const TIMEOUT_SECS: u64 = 10;

/// External asset ids and the symbols we show them as
pub const TRACKED_ASSETS: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("solana", "SOL"),
    ("tether", "USDT"),
    ("binancecoin", "BNB"),
    ("matic-network", "MATIC"),
];

pub fn tracked_ids() -> Vec<String> {
    TRACKED_ASSETS.iter().map(|(id, _)| id.to_string()).collect()
}

pub fn symbol_for(asset_id: &str) -> Option<&'static str> {
    TRACKED_ASSETS
        .iter()
        .find(|(id, _)| *id == asset_id)
        .map(|(_, symbol)| *symbol)
}

/// Source of authoritative prices
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// One batched fetch. Ids the source does not know are left out.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<PriceSnapshot>, FeedError>;
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
}

/// CoinGecko `simple/price` client
pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, ids: &[String]) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true",
            self.base_url,
            ids.join(",")
        )
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn fetch(&self, ids: &[String]) -> Result<Vec<PriceSnapshot>, FeedError> {
        let url = self.url(ids);
        debug!("Fetching prices: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status {
                source_name: "coingecko",
                status: response.status().as_u16(),
            });
        }

        let body: HashMap<String, SimplePrice> = response.json().await?;
        parse_simple_prices(body)
    }
}

fn parse_simple_prices(body: HashMap<String, SimplePrice>) -> Result<Vec<PriceSnapshot>, FeedError> {
    let mut snapshots = Vec::with_capacity(body.len());

    for (asset_id, quote) in body {
        let Some(symbol) = symbol_for(&asset_id) else {
            debug!("Ignoring untracked asset {}", asset_id);
            continue;
        };
        let price = quote
            .usd
            .and_then(Decimal::from_f64)
            .ok_or_else(|| FeedError::Parse(format!("missing usd price for {}", asset_id)))?;
        let change = quote
            .usd_24h_change
            .and_then(Decimal::from_f64)
            .unwrap_or(Decimal::ZERO);

        snapshots.push(PriceSnapshot {
            asset_id,
            symbol: symbol.to_string(),
            price: price.round_dp(8),
            change_percent_24h: change.round_dp(4),
        });
    }

    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_url_is_batched() {
        let source = CoinGeckoSource::new("https://api.coingecko.com/api/v3/");
        let url = source.url(&["bitcoin".to_string(), "ethereum".to_string()]);
        assert_eq!(
            url,
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin,ethereum&vs_currencies=usd&include_24hr_change=true"
        );
    }

    #[test]
    fn test_parse_response() {
        let body: HashMap<String, SimplePrice> = serde_json::from_str(
            r#"{
                "bitcoin": {"usd": 64250.5, "usd_24h_change": -1.25},
                "tether": {"usd": 1.0},
                "dogecoin": {"usd": 0.1, "usd_24h_change": 3.0}
            }"#,
        )
        .unwrap();

        let mut snapshots = parse_simple_prices(body).unwrap();
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].symbol, "BTC");
        assert_eq!(snapshots[0].price, dec!(64250.5));
        assert_eq!(snapshots[0].change_percent_24h, dec!(-1.25));
        assert_eq!(snapshots[1].symbol, "USDT");
        assert_eq!(snapshots[1].change_percent_24h, Decimal::ZERO);
    }

    #[test]
    fn test_missing_price_is_parse_error() {
        let body: HashMap<String, SimplePrice> =
            serde_json::from_str(r#"{"solana": {"usd_24h_change": 2.0}}"#).unwrap();
        assert!(matches!(parse_simple_prices(body), Err(FeedError::Parse(_))));
    }
}
