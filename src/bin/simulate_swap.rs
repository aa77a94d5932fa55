//! One-shot swap against the local transaction log.
//!
//! Usage: simulate_swap FROM TO AMOUNT
//!
//! Refreshes prices once, quotes the swap, runs the confirmation step and
//! prints the reconciled balances afterwards.

use anyhow::{bail, Result};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bluepeak_portfolio::config::Config;
use bluepeak_portfolio::networks::{native_symbols, network_for};
use bluepeak_portfolio::portfolio::valuate;
use bluepeak_portfolio::price_feed::PriceFeed;
use bluepeak_portfolio::price_source::CoinGeckoSource;
use bluepeak_portfolio::reconcile::Reconciler;
use bluepeak_portfolio::swap::{quote, ExecutionMode, SwapOutcome, SwapService};
use bluepeak_portfolio::tracker::BalanceTracker;
use bluepeak_portfolio::tx_log::TransactionLog;
use bluepeak_portfolio::wallet::{RpcWallet, SimulatedWallet, Wallet};

const DEMO_ADDRESS: &str = "0x000000000000000000000000000000000000b1ee";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("Usage: {} FROM TO AMOUNT", args.first().map(String::as_str).unwrap_or("simulate_swap"));
    }
    let from = args[1].to_uppercase();
    let to = args[2].to_uppercase();
    let amount = &args[3];

    let config = Config::from_env()?;
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(if config.log_level == "debug" { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .compact()
        .init();

    let log = Arc::new(TransactionLog::open(&config.data_dir)?);
    let wallet: Arc<dyn Wallet> = match &config.rpc_url {
        Some(rpc_url) => Arc::new(RpcWallet::new(
            rpc_url,
            config.chain_id,
            config.private_key.as_deref(),
            config.wallet_address.as_deref(),
        )?),
        None => Arc::new(SimulatedWallet::new(
            config.wallet_address.as_deref().unwrap_or(DEMO_ADDRESS),
            config.chain_id,
            dec!(1.25),
        )),
    };
    if let Err(e) = wallet.connect().await {
        warn!("Wallet not connected: {}", e);
    }

    let feed = PriceFeed::new(
        Arc::new(CoinGeckoSource::new(&config.price_api_url)),
        config.feed_config(),
    );
    let status = feed.refresh().await;
    info!("Prices: {:?}", status);
    let prices = feed.authoritative();

    let q = quote(&from, &to, amount, &prices)?;
    info!(
        "Quote: {} {} -> {} {} (rate {}, ~${})",
        q.from_amount, q.from_symbol, q.to_amount, q.to_symbol, q.rate, q.value_usd
    );

    let mode = if config.simulate_swaps {
        ExecutionMode::Simulated
    } else {
        ExecutionMode::SelfTransaction
    };
    let service = SwapService::new(wallet.clone(), log.clone(), mode);

    let native_symbol = network_for(config.chain_id).native_symbol();
    if let Some(cost) = service.network_cost_usd(feed.price(native_symbol).unwrap_or_default()).await {
        info!("Estimated network cost: ${}", cost);
    }

    match service.execute(&q).await? {
        SwapOutcome::Completed(tx) => info!("Recorded {} ({})", tx.describe(), tx.id),
        SwapOutcome::Cancelled => {
            info!("Swap cancelled, nothing recorded");
            return Ok(());
        }
    }

    let reconciler = Reconciler::new(config.demo_balances.clone(), native_symbol, native_symbols());
    let tracker = BalanceTracker::new(wallet, log, reconciler);
    let balances = tracker.refresh_native().await;
    valuate(&balances, &prices, native_symbol).print_summary();

    Ok(())
}
