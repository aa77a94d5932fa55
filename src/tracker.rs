//! Keeps reconciled balances current.
//!
//! Polls the wallet for the native balance, pulls explorer history into the
//! transaction log, and republishes balances whenever either changes or the
//! wallet reports an account or chain switch.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::history::HistorySource;
use crate::networks::network_for;
use crate::reconcile::{Balances, Reconciler};
use crate::task::TaskGroup;
use crate::tx_log::TransactionLog;
use crate::wallet::{Wallet, WalletEvent};

pub struct BalanceTracker {
    wallet: Arc<dyn Wallet>,
    log: Arc<TransactionLog>,
    history: Option<Arc<dyn HistorySource>>,
    reconciler: RwLock<Reconciler>,
    balances: watch::Sender<Arc<Balances>>,
    poll_interval: Duration,
    history_interval: Duration,
}

impl BalanceTracker {
    pub fn new(wallet: Arc<dyn Wallet>, log: Arc<TransactionLog>, reconciler: Reconciler) -> Self {
        let initial = reconciler.reconcile(&log.all());
        let (balances, _) = watch::channel(Arc::new(initial));
        Self {
            wallet,
            log,
            history: None,
            reconciler: RwLock::new(reconciler),
            balances,
            poll_interval: Duration::from_secs(10),
            history_interval: Duration::from_secs(60),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySource>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_intervals(mut self, poll: Duration, history: Duration) -> Self {
        self.poll_interval = poll;
        self.history_interval = history;
        self
    }

    /// Latest reconciled balances
    pub fn balances(&self) -> Arc<Balances> {
        self.balances.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Balances>> {
        self.balances.subscribe()
    }

    pub fn native_symbol(&self) -> String {
        self.reconciler.read().native_symbol().to_string()
    }

    /// Replay the log over the current baseline and publish the result
    pub fn recompute(&self) -> Arc<Balances> {
        let transactions = self.log.all();
        let balances = Arc::new(self.reconciler.read().reconcile(&transactions));
        self.balances.send_replace(balances.clone());
        balances
    }

    /// Fetch the native balance. Without an account it is zero; on a
    /// provider error the previous value is kept. A result that lands after
    /// a chain switch belongs to the old chain and is dropped.
    pub async fn refresh_native(&self) -> Arc<Balances> {
        let symbol = self.native_symbol();
        match self.wallet.account() {
            None => self.reconciler.write().set_native_balance(Decimal::ZERO),
            Some(address) => match self.wallet.native_balance(&address).await {
                Ok(balance) => {
                    let mut reconciler = self.reconciler.write();
                    if reconciler.native_symbol() == symbol {
                        debug!("Native balance for {}: {} {}", address, balance, symbol);
                        reconciler.set_native_balance(balance);
                    } else {
                        debug!(
                            "Dropping {} balance fetched before switch to {}",
                            symbol,
                            reconciler.native_symbol()
                        );
                    }
                }
                Err(e) => warn!("Native balance fetch failed, keeping last value: {}", e),
            },
        }
        self.recompute()
    }

    /// Pull explorer history into the log. Returns how many entries were new.
    pub async fn sync_history(&self) -> usize {
        let Some(history) = &self.history else {
            return 0;
        };
        let Some(address) = self.wallet.account() else {
            return 0;
        };

        let native_symbol = self.native_symbol();
        let fetched = match history.fetch(&address, &native_symbol).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("History fetch failed: {}", e);
                return 0;
            }
        };

        match self.log.extend_from_history(fetched) {
            Ok(0) => 0,
            Ok(added) => {
                self.recompute();
                added
            }
            Err(e) => {
                warn!("Failed to persist history: {:#}", e);
                0
            }
        }
    }

    pub async fn handle_event(&self, event: WalletEvent) {
        match event {
            WalletEvent::AccountChanged(address) => {
                info!("Account changed: {}", address);
                self.refresh_native().await;
                self.sync_history().await;
            }
            WalletEvent::ChainChanged(chain_id) => {
                let network = network_for(chain_id);
                info!("Chain changed: {} ({})", network.chain_name, chain_id);
                self.reconciler.write().set_native_symbol(network.native_symbol());
                self.refresh_native().await;
            }
            WalletEvent::Disconnected => {
                info!("Wallet disconnected");
                self.reconciler.write().set_native_balance(Decimal::ZERO);
                self.recompute();
            }
        }
    }

    /// Start the native poll, history sync, and wallet event jobs
    pub fn spawn(self: &Arc<Self>) -> TaskGroup {
        let mut tasks = TaskGroup::new("balance tracker");

        let tracker = self.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(tracker.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tracker.refresh_native().await;
            }
        });

        if self.history.is_some() {
            let tracker = self.clone();
            tasks.spawn(async move {
                let mut interval = tokio::time::interval(tracker.history_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    tracker.sync_history().await;
                }
            });
        }

        let tracker = self.clone();
        let mut events = self.wallet.subscribe();
        tasks.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => tracker.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} wallet events, refreshing", skipped);
                        tracker.refresh_native().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        info!(
            "Balance tracker started: native every {:?}, history {}",
            self.poll_interval,
            if self.history.is_some() { format!("every {:?}", self.history_interval) } else { "off".to_string() }
        );
        tasks
    }
}
