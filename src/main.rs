use anyhow::{Context, Result};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bluepeak_portfolio::config::Config;
use bluepeak_portfolio::history::ExplorerClient;
use bluepeak_portfolio::networks::{native_symbols, network_for};
use bluepeak_portfolio::portfolio::valuate;
use bluepeak_portfolio::price_feed::PriceFeed;
use bluepeak_portfolio::price_source::CoinGeckoSource;
use bluepeak_portfolio::reconcile::Reconciler;
use bluepeak_portfolio::tracker::BalanceTracker;
use bluepeak_portfolio::tx_log::TransactionLog;
use bluepeak_portfolio::wallet::{RpcWallet, SimulatedWallet, Wallet};

/// Address used by the simulated wallet when none is configured
const DEMO_ADDRESS: &str = "0x000000000000000000000000000000000000b1ee";

/// Log a valuation every Nth displayed price update
const VALUATION_EVERY: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(match config.log_level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let network = network_for(config.chain_id);

    info!("╔═══════════════════════════════════════╗");
    info!("║     BluePeak Portfolio Service        ║");
    info!("╠═══════════════════════════════════════╣");
    info!("║ Network: {:28} ║", network.chain_name);
    info!("║ Wallet: {:29} ║", if config.rpc_url.is_some() { "RPC" } else { "SIMULATED" });
    info!("║ Swaps: {:30} ║", if config.simulate_swaps { "SIMULATED" } else { "SELF-TX CONFIRM" });
    info!("║ Price refresh: {:20}s ║", config.price_refresh_secs);
    info!("╚═══════════════════════════════════════╝");

    let log = Arc::new(TransactionLog::open(&config.data_dir)?);
    info!("Transaction log: {} ({} entries)", log.path().display(), log.len());

    let wallet = build_wallet(&config)?;
    match wallet.connect().await {
        Ok(address) => info!("Wallet connected: {}", address),
        Err(e) => warn!("Wallet not connected: {}", e),
    }

    // Price feed
    let feed = Arc::new(PriceFeed::new(
        Arc::new(CoinGeckoSource::new(&config.price_api_url)),
        config.feed_config(),
    ));
    let feed_tasks = feed.spawn();

    // Balances
    let reconciler = Reconciler::new(
        config.demo_balances.clone(),
        network.native_symbol(),
        native_symbols(),
    );
    let mut tracker = BalanceTracker::new(wallet.clone(), log.clone(), reconciler)
        .with_intervals(config.balance_poll_interval(), config.history_poll_interval());
    if config.rpc_url.is_some() {
        tracker = tracker.with_history(Arc::new(ExplorerClient::new(
            &config.explorer_api_url,
            config.explorer_api_key.clone(),
        )));
    } else {
        info!("No RPC configured, explorer history disabled");
    }
    let tracker = Arc::new(tracker);
    let tracker_tasks = tracker.spawn();

    let mut prices = feed.subscribe();
    let mut updates: u64 = 0;

    loop {
        tokio::select! {
            changed = prices.changed() => {
                if changed.is_err() {
                    error!("Price feed closed");
                    break;
                }
                updates += 1;
                if updates % VALUATION_EVERY != 0 {
                    continue;
                }

                let displayed = prices.borrow_and_update().clone();
                let report = valuate(&tracker.balances(), &displayed, &tracker.native_symbol());
                info!("Portfolio: {} (feed {:?})", report, feed.status());
                report.print_summary();
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutting down...");
                break;
            }
        }
    }

    feed_tasks.dispose();
    tracker_tasks.dispose();
    wallet.disconnect();
    Ok(())
}

fn build_wallet(config: &Config) -> Result<Arc<dyn Wallet>> {
    if let Some(rpc_url) = &config.rpc_url {
        let wallet = RpcWallet::new(
            rpc_url,
            config.chain_id,
            config.private_key.as_deref(),
            config.wallet_address.as_deref(),
        )?;
        return Ok(Arc::new(wallet));
    }

    let address = config.wallet_address.as_deref().unwrap_or(DEMO_ADDRESS);
    Ok(Arc::new(SimulatedWallet::new(address, config.chain_id, dec!(1.25))))
}
