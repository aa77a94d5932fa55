use rust_decimal::Decimal;
use std::fmt;
use tracing::{info, warn};

use crate::reconcile::{Balances, DUST_THRESHOLD};
use crate::types::PriceMap;

/// One holding valued in USD
#[derive(Debug, Clone, PartialEq)]
pub struct AssetValue {
    pub symbol: String,
    pub balance: Decimal,
    pub price: Decimal,
    pub value: Decimal,
    pub change_percent_24h: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioReport {
    /// Native asset first, then by USD value descending
    pub assets: Vec<AssetValue>,
    pub net_worth: Decimal,
}

impl PortfolioReport {
    pub fn get(&self, symbol: &str) -> Option<&AssetValue> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }

    pub fn print_summary(&self) {
        info!("=== Portfolio ===");
        for asset in &self.assets {
            info!(
                "{:6} {:>18} @ ${:<12} = ${} ({:+}%)",
                asset.symbol,
                asset.balance.round_dp(6),
                asset.price.round_dp(4),
                asset.value.round_dp(2),
                asset.change_percent_24h.round_dp(2)
            );
        }
        info!("Net worth: ${}", self.net_worth.round_dp(2));
        info!("=================");
    }
}

impl fmt::Display for PortfolioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} across {} assets", self.net_worth.round_dp(2), self.assets.len())
    }
}

/// Value reconciled balances with the displayed prices.
///
/// The native asset uses its own price if present, then the ETH price, then
/// zero. Other assets without a price are valued at zero. Non-native dust is
/// left out.
pub fn valuate(balances: &Balances, prices: &PriceMap, native_symbol: &str) -> PortfolioReport {
    let mut assets: Vec<AssetValue> = balances
        .iter()
        .filter(|(symbol, balance)| symbol.as_str() == native_symbol || **balance >= DUST_THRESHOLD)
        .map(|(symbol, balance)| {
            let snapshot = if symbol == native_symbol {
                prices.get(symbol).or_else(|| prices.get("ETH"))
            } else {
                prices.get(symbol)
            };
            let (price, change) = snapshot
                .map(|s| (s.price, s.change_percent_24h))
                .unwrap_or((Decimal::ZERO, Decimal::ZERO));

            AssetValue {
                symbol: symbol.clone(),
                balance: *balance,
                price,
                value: balance.checked_mul(price).unwrap_or_else(|| {
                    warn!("{} value overflows, capping", symbol);
                    Decimal::MAX
                }),
                change_percent_24h: change,
            }
        })
        .collect();

    assets.sort_by(|a, b| {
        let a_native = a.symbol == native_symbol;
        let b_native = b.symbol == native_symbol;
        b_native
            .cmp(&a_native)
            .then_with(|| b.value.cmp(&a.value))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let net_worth = assets
        .iter()
        .fold(Decimal::ZERO, |total, a| total.checked_add(a.value).unwrap_or(Decimal::MAX));
    PortfolioReport { assets, net_worth }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;
    use crate::types::PriceSnapshot;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, HashSet};

    fn prices(entries: &[(&str, Decimal)]) -> PriceMap {
        entries
            .iter()
            .map(|(symbol, price)| {
                (
                    symbol.to_string(),
                    PriceSnapshot {
                        asset_id: symbol.to_lowercase(),
                        symbol: symbol.to_string(),
                        price: *price,
                        change_percent_24h: dec!(1.5),
                    },
                )
            })
            .collect()
    }

    fn balances(entries: &[(&str, Decimal)]) -> Balances {
        let baseline: HashMap<String, Decimal> =
            entries.iter().map(|(s, b)| (s.to_string(), *b)).collect();
        reconcile(&baseline, &[], &HashSet::new(), "ETH")
    }

    #[test]
    fn test_net_worth_and_ordering() {
        let b = balances(&[("ETH", dec!(2)), ("USDT", dec!(10000)), ("SOL", dec!(50))]);
        let p = prices(&[("ETH", dec!(3200)), ("USDT", dec!(1)), ("SOL", dec!(145))]);

        let report = valuate(&b, &p, "ETH");
        let order: Vec<&str> = report.assets.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(order, vec!["ETH", "USDT", "SOL"]);
        assert_eq!(report.net_worth, dec!(23650));
        assert_eq!(report.get("SOL").unwrap().value, dec!(7250));
    }

    #[test]
    fn test_native_falls_back_to_eth_price() {
        let b = balances(&[("SEP", dec!(1.5)), ("USDT", dec!(10))]);
        let p = prices(&[("ETH", dec!(3000)), ("USDT", dec!(1))]);

        let report = valuate(&b, &p, "SEP");
        assert_eq!(report.assets[0].symbol, "SEP");
        assert_eq!(report.assets[0].value, dec!(4500));
    }

    #[test]
    fn test_unpriced_asset_is_worth_zero() {
        let b = balances(&[("ETH", dec!(0)), ("XYZ", dec!(40))]);
        let report = valuate(&b, &prices(&[]), "ETH");
        assert_eq!(report.net_worth, Decimal::ZERO);
        assert_eq!(report.assets.len(), 2);
        assert_eq!(report.to_string(), "$0 across 2 assets");
    }

    #[test]
    fn test_huge_balance_value_is_capped() {
        let huge = crate::history::scale_units("50000000000000000000000000000", 0);
        let b = balances(&[("ETH", dec!(1)), ("SPAM", huge)]);
        let p = prices(&[("ETH", dec!(3200)), ("SPAM", dec!(2.5))]);

        let report = valuate(&b, &p, "ETH");
        assert_eq!(report.get("SPAM").unwrap().value, Decimal::MAX);
        assert_eq!(report.net_worth, Decimal::MAX);
    }

    #[test]
    fn test_non_native_dust_is_hidden() {
        let b = balances(&[("ETH", dec!(0)), ("USDT", dec!(0.0000001))]);
        let report = valuate(&b, &prices(&[("USDT", dec!(1))]), "ETH");
        assert!(report.get("USDT").is_none());
        assert!(report.get("ETH").is_some());
    }
}
