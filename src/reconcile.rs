use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::types::{parse_amount, Direction, Transaction, TxKind};

/// Derived holdings smaller than this are treated as empty
pub const DUST_THRESHOLD: Decimal = dec!(0.000001);

/// Reconciled holdings, symbol -> amount
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Balances {
    holdings: HashMap<String, Decimal>,
}

impl Balances {
    /// Holding for a symbol, zero when absent
    pub fn get(&self, symbol: &str) -> Decimal {
        self.holdings.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.holdings.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.holdings.iter()
    }

    /// Symbols sorted alphabetically, for stable output
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.holdings.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn into_inner(self) -> HashMap<String, Decimal> {
        self.holdings
    }
}

/// Fold completed transactions into per-symbol deltas, in list order.
///
/// Swaps credit the target symbol and debit the source unless the source is
/// in `exclusion`. Transfers in `native_symbol` are skipped. The result is
/// not clamped.
pub fn derive_deltas(
    transactions: &[Transaction],
    exclusion: &HashSet<String>,
    native_symbol: &str,
) -> HashMap<String, Decimal> {
    let mut deltas: HashMap<String, Decimal> = HashMap::new();

    for tx in transactions.iter().filter(|tx| tx.is_completed()) {
        match &tx.kind {
            TxKind::Swap { from_symbol, to_symbol, from_amount, to_amount } => {
                apply(&mut deltas, to_symbol, parse_amount(to_amount, &tx.id), Direction::In, &tx.id);

                if !exclusion.contains(from_symbol) {
                    apply(&mut deltas, from_symbol, parse_amount(from_amount, &tx.id), Direction::Out, &tx.id);
                }
            }
            kind => {
                let Some((symbol, amount, direction)) = kind.as_transfer() else {
                    continue;
                };
                if symbol == native_symbol {
                    debug!("Skipping native transfer {} ({})", tx.id, symbol);
                    continue;
                }

                apply(&mut deltas, symbol, parse_amount(amount, &tx.id), direction, &tx.id);
            }
        }
    }

    deltas
}

/// Credit or debit one symbol. An amount that would overflow the running
/// delta is skipped, like an unparseable one.
fn apply(
    deltas: &mut HashMap<String, Decimal>,
    symbol: &str,
    amount: Decimal,
    direction: Direction,
    tx_id: &str,
) {
    let entry = deltas.entry(symbol.to_string()).or_insert(Decimal::ZERO);
    let next = match direction {
        Direction::In => entry.checked_add(amount),
        Direction::Out => entry.checked_sub(amount),
    };
    match next {
        Some(value) => *entry = value,
        None => warn!("Amount {} {} in tx {} overflows, treating as 0", amount, symbol, tx_id),
    }
}

/// Merge baseline balances with the replayed log.
///
/// Baseline-only symbols pass through untouched. Symbols touched by the log
/// start from their baseline (or zero), are clamped at zero, and are dropped
/// when below [`DUST_THRESHOLD`].
pub fn reconcile(
    baseline: &HashMap<String, Decimal>,
    transactions: &[Transaction],
    exclusion: &HashSet<String>,
    native_symbol: &str,
) -> Balances {
    let deltas = derive_deltas(transactions, exclusion, native_symbol);
    let mut holdings = baseline.clone();

    for (symbol, delta) in deltas {
        let start = baseline.get(&symbol).copied().unwrap_or(Decimal::ZERO);
        let value = start
            .checked_add(delta)
            .unwrap_or_else(|| {
                warn!("{} balance overflows, capping", symbol);
                if delta.is_sign_positive() { Decimal::MAX } else { Decimal::ZERO }
            })
            .max(Decimal::ZERO);

        if value < DUST_THRESHOLD {
            holdings.remove(&symbol);
        } else {
            holdings.insert(symbol, value);
        }
    }

    Balances { holdings }
}

/// Reconciler with its baseline and exclusion set held between runs
#[derive(Debug, Clone)]
pub struct Reconciler {
    seed: HashMap<String, Decimal>,
    native_symbol: String,
    native_balance: Decimal,
    exclusion: HashSet<String>,
}

impl Reconciler {
    /// `seed` are fixed starting holdings for non-native assets
    pub fn new(seed: HashMap<String, Decimal>, native_symbol: &str, exclusion: HashSet<String>) -> Self {
        Self {
            seed,
            native_symbol: native_symbol.to_string(),
            native_balance: Decimal::ZERO,
            exclusion,
        }
    }

    /// Record the wallet-reported native balance
    pub fn set_native_balance(&mut self, balance: Decimal) {
        self.native_balance = balance;
    }

    /// Chain switched: the native symbol changes and the old balance is void
    pub fn set_native_symbol(&mut self, symbol: &str) {
        if self.native_symbol != symbol {
            debug!("Native symbol {} -> {}", self.native_symbol, symbol);
            self.native_symbol = symbol.to_string();
            self.native_balance = Decimal::ZERO;
        }
    }

    pub fn native_symbol(&self) -> &str {
        &self.native_symbol
    }

    /// Seed holdings plus the authoritative native balance
    pub fn baseline(&self) -> HashMap<String, Decimal> {
        let mut baseline = self.seed.clone();
        baseline.insert(self.native_symbol.clone(), self.native_balance);
        baseline
    }

    pub fn reconcile(&self, transactions: &[Transaction]) -> Balances {
        reconcile(&self.baseline(), transactions, &self.exclusion, &self.native_symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxStatus;
    use chrono::Utc;

    fn transfer(symbol: &str, amount: &str, direction: Direction) -> Transaction {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            kind: TxKind::TokenTransfer {
                symbol: symbol.to_string(),
                amount: amount.to_string(),
                direction,
            },
            hash: None,
            timestamp: Utc::now(),
            status: TxStatus::Completed,
        }
    }

    fn exclusion() -> HashSet<String> {
        ["ETH".to_string()].into_iter().collect()
    }

    #[test]
    fn test_pending_and_failed_are_ignored() {
        let mut pending = Transaction::swap("USDT", "BTC", "100", "0.002", None);
        pending.status = TxStatus::Pending;
        let mut failed = transfer("USDT", "50", Direction::In);
        failed.status = TxStatus::Failed;

        let deltas = derive_deltas(&[pending, failed], &exclusion(), "ETH");
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_native_transfers_skipped() {
        let log = vec![
            transfer("ETH", "5", Direction::In),
            Transaction {
                id: "recv".into(),
                kind: TxKind::Receive { symbol: "ETH".into(), amount: "1".into() },
                hash: None,
                timestamp: Utc::now(),
                status: TxStatus::Completed,
            },
        ];
        let balances = reconcile(&HashMap::new(), &log, &exclusion(), "ETH");
        assert!(balances.is_empty());
    }

    #[test]
    fn test_non_excluded_swap_source_is_debited() {
        let baseline: HashMap<String, Decimal> = [("USDT".to_string(), dec!(1000))].into();
        let log = vec![Transaction::swap("USDT", "SOL", "400", "2.5", None)];

        let balances = reconcile(&baseline, &log, &exclusion(), "ETH");
        assert_eq!(balances.get("USDT"), dec!(600));
        assert_eq!(balances.get("SOL"), dec!(2.5));
    }

    #[test]
    fn test_unparseable_amount_contributes_zero() {
        let log = vec![
            transfer("USDT", "100", Direction::In),
            transfer("USDT", "not-a-number", Direction::Out),
        ];
        let balances = reconcile(&HashMap::new(), &log, &exclusion(), "ETH");
        assert_eq!(balances.get("USDT"), dec!(100));
    }

    #[test]
    fn test_dust_is_dropped() {
        let log = vec![
            transfer("BPK", "1.0000005", Direction::In),
            transfer("BPK", "1", Direction::Out),
        ];
        let balances = reconcile(&HashMap::new(), &log, &exclusion(), "ETH");
        assert!(!balances.contains("BPK"));
        assert_eq!(balances.get("BPK"), Decimal::ZERO);
    }

    #[test]
    fn test_baseline_only_passes_through() {
        let baseline: HashMap<String, Decimal> =
            [("ETH".to_string(), Decimal::ZERO), ("BTC".to_string(), dec!(0.5))].into();
        let balances = reconcile(&baseline, &[], &exclusion(), "ETH");
        assert_eq!(balances.len(), 2);
        assert!(balances.contains("ETH"));
        assert_eq!(balances.symbols(), vec!["BTC", "ETH"]);
    }

    #[test]
    fn test_overflowing_amounts_are_skipped() {
        let huge = crate::history::scale_units("50000000000000000000000000000", 0);
        let log = vec![
            transfer("SPAM", &huge.to_string(), Direction::In),
            transfer("SPAM", &huge.to_string(), Direction::In),
            transfer("USDT", "5", Direction::In),
        ];

        let balances = reconcile(&HashMap::new(), &log, &exclusion(), "ETH");
        assert_eq!(balances.get("SPAM"), huge);
        assert_eq!(balances.get("USDT"), dec!(5));
    }

    #[test]
    fn test_baseline_plus_delta_overflow_caps() {
        let baseline: HashMap<String, Decimal> = [("SPAM".to_string(), Decimal::MAX)].into();
        let log = vec![transfer("SPAM", "1000", Direction::In)];
        let balances = reconcile(&baseline, &log, &exclusion(), "ETH");
        assert_eq!(balances.get("SPAM"), Decimal::MAX);
    }

    #[test]
    fn test_reconciler_chain_switch_resets_native() {
        let seed: HashMap<String, Decimal> = [("USDT".to_string(), dec!(10000))].into();
        let mut reconciler = Reconciler::new(seed, "ETH", exclusion());
        reconciler.set_native_balance(dec!(2));
        assert_eq!(reconciler.reconcile(&[]).get("ETH"), dec!(2));

        reconciler.set_native_symbol("MATIC");
        let balances = reconciler.reconcile(&[]);
        assert_eq!(balances.get("MATIC"), Decimal::ZERO);
        assert!(!balances.contains("ETH"));
        assert_eq!(balances.get("USDT"), dec!(10000));
    }
}
