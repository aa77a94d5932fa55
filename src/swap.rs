use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{SwapError, WalletError};
use crate::tx_log::TransactionLog;
use crate::types::{PriceMap, Transaction};
use crate::wallet::Wallet;

/// Gas units assumed for a DEX swap when estimating network cost
pub const SWAP_GAS_UNITS: u64 = 150_000;

/// How a swap is "executed". Neither mode settles anything on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Short delay, no wallet interaction
    Simulated,
    /// Ask the wallet for a zero-value self-transaction as confirmation
    SelfTransaction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub from_symbol: String,
    pub to_symbol: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    /// Units of `to` per unit of `from`
    pub rate: Decimal,
    pub value_usd: Decimal,
}

#[derive(Debug, Clone)]
pub enum SwapOutcome {
    Completed(Transaction),
    /// User dismissed the wallet prompt; nothing was logged
    Cancelled,
}

fn usd_price(prices: &PriceMap, symbol: &str) -> Result<Decimal, SwapError> {
    prices
        .get(symbol)
        .map(|s| s.price)
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| SwapError::MissingPrice(symbol.to_string()))
}

/// Price a swap through USD: `to = amount * from_price / to_price`
pub fn quote(
    from_symbol: &str,
    to_symbol: &str,
    amount: &str,
    prices: &PriceMap,
) -> Result<SwapQuote, SwapError> {
    if from_symbol == to_symbol {
        return Err(SwapError::SameAsset(from_symbol.to_string()));
    }
    let from_amount: Decimal = amount
        .trim()
        .parse()
        .map_err(|_| SwapError::InvalidAmount(amount.to_string()))?;
    if from_amount <= Decimal::ZERO {
        return Err(SwapError::InvalidAmount(amount.to_string()));
    }

    let from_price = usd_price(prices, from_symbol)?;
    let to_price = usd_price(prices, to_symbol)?;
    let too_large = || SwapError::InvalidAmount(amount.to_string());
    let value_usd = from_amount.checked_mul(from_price).ok_or_else(too_large)?;
    let to_amount = value_usd.checked_div(to_price).ok_or_else(too_large)?;
    let rate = from_price.checked_div(to_price).ok_or_else(too_large)?;

    Ok(SwapQuote {
        from_symbol: from_symbol.to_string(),
        to_symbol: to_symbol.to_string(),
        from_amount,
        to_amount: to_amount.round_dp(6),
        rate: rate.round_dp(6),
        value_usd: value_usd.round_dp(2),
    })
}

/// Estimated USD cost of a swap at `gas_price_gwei`
pub fn estimate_network_cost_usd(gas_price_gwei: Decimal, native_price: Decimal) -> Decimal {
    let native_cost = gas_price_gwei * Decimal::from(SWAP_GAS_UNITS) / dec!(1_000_000_000);
    (native_cost * native_price).round_dp(2)
}

pub struct SwapService {
    wallet: Arc<dyn Wallet>,
    log: Arc<TransactionLog>,
    mode: ExecutionMode,
    simulated_delay: Duration,
}

impl SwapService {
    pub fn new(wallet: Arc<dyn Wallet>, log: Arc<TransactionLog>, mode: ExecutionMode) -> Self {
        Self {
            wallet,
            log,
            mode,
            simulated_delay: Duration::from_secs(2),
        }
    }

    pub fn with_simulated_delay(mut self, delay: Duration) -> Self {
        self.simulated_delay = delay;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Network cost in USD, `None` when the wallet can't report gas
    pub async fn network_cost_usd(&self, native_price: Decimal) -> Option<Decimal> {
        match self.wallet.gas_price_gwei().await {
            Ok(gwei) => Some(estimate_network_cost_usd(gwei, native_price)),
            Err(e) => {
                warn!("Gas price unavailable: {}", e);
                None
            }
        }
    }

    /// Run the confirmation step and append a completed swap to the log
    pub async fn execute(&self, quote: &SwapQuote) -> Result<SwapOutcome, SwapError> {
        let hash = match self.mode {
            ExecutionMode::Simulated => {
                tokio::time::sleep(self.simulated_delay).await;
                None
            }
            ExecutionMode::SelfTransaction => match self.wallet.send_self_transaction().await {
                Ok(hash) => Some(hash),
                Err(WalletError::UserRejected) => {
                    info!(
                        "Swap {} {} -> {} cancelled by user",
                        quote.from_amount, quote.from_symbol, quote.to_symbol
                    );
                    return Ok(SwapOutcome::Cancelled);
                }
                Err(e) => return Err(e.into()),
            },
        };

        let tx = Transaction::swap(
            &quote.from_symbol,
            &quote.to_symbol,
            &quote.from_amount.to_string(),
            &quote.to_amount.to_string(),
            hash,
        );
        self.log.append(tx.clone())?;

        info!(
            "Swapped {} {} for {} {} (simulated, ~${})",
            quote.from_amount, quote.from_symbol, quote.to_amount, quote.to_symbol, quote.value_usd
        );
        Ok(SwapOutcome::Completed(tx))
    }
}
