//! Live price feed
//!
//! Two jobs share one authoritative price map:
//! - Refresh (slow): fetches the tracked assets and swaps the whole map.
//!   A failed first fetch installs the static fallback map; a failed later
//!   fetch keeps whatever is there.
//! - Tick (fast): republishes every authoritative price with a small random
//!   offset so the display never looks frozen. The offset is always applied
//!   to the authoritative price, never to the last displayed one.

use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::price_source::{tracked_ids, PriceSource};
use crate::task::TaskGroup;
use crate::types::{PriceMap, PriceSnapshot};

/// Platform token that no external source lists
pub const PLATFORM_SYMBOL: &str = "BPK";

pub fn platform_snapshot() -> PriceSnapshot {
    PriceSnapshot {
        asset_id: "bluepeak".to_string(),
        symbol: PLATFORM_SYMBOL.to_string(),
        price: dec!(1.85),
        change_percent_24h: dec!(15.4),
    }
}

/// Static reference prices used when no fetch has ever succeeded
pub fn fallback_prices() -> PriceMap {
    let entries = [
        ("bitcoin", "BTC", dec!(64000), dec!(0)),
        ("ethereum", "ETH", dec!(3200), dec!(0)),
        ("solana", "SOL", dec!(145), dec!(0)),
        ("tether", "USDT", dec!(1), dec!(0)),
        ("binancecoin", "BNB", dec!(580), dec!(0)),
        ("matic-network", "MATIC", dec!(0.70), dec!(0)),
    ];

    let mut map: PriceMap = entries
        .into_iter()
        .map(|(id, symbol, price, change)| {
            (
                symbol.to_string(),
                PriceSnapshot {
                    asset_id: id.to_string(),
                    symbol: symbol.to_string(),
                    price,
                    change_percent_24h: change,
                },
            )
        })
        .collect();
    map.insert(PLATFORM_SYMBOL.to_string(), platform_snapshot());
    map
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub asset_ids: Vec<String>,
    pub refresh_interval: Duration,
    pub tick_interval: Duration,
    /// Max relative offset per tick (0.0005 = 0.05%)
    pub jitter: Decimal,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            asset_ids: tracked_ids(),
            refresh_interval: Duration::from_secs(60),
            tick_interval: Duration::from_secs(1),
            jitter: dec!(0.0005),
        }
    }
}

/// Where the authoritative map came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Nothing fetched yet and no fallback installed
    Uninitialized,
    /// Every fetch so far failed; serving the static map
    StaleFallback,
    /// At least one fetch succeeded
    Live { refreshes: u64 },
}

impl FeedStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, FeedStatus::Live { .. })
    }
}

#[derive(Debug)]
struct FeedState {
    authoritative: Arc<PriceMap>,
    status: FeedStatus,
    last_success: Option<Instant>,
    consecutive_failures: u32,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            authoritative: Arc::new(PriceMap::new()),
            status: FeedStatus::Uninitialized,
            last_success: None,
            consecutive_failures: 0,
        }
    }
}

/// Offset `price` by a uniform random factor in `[-jitter, +jitter]`
pub fn perturb<R: Rng + ?Sized>(price: Decimal, jitter: Decimal, rng: &mut R) -> Decimal {
    let r = Decimal::from_f64(rng.gen_range(-1.0..=1.0))
        .unwrap_or(Decimal::ZERO)
        .round_dp(10);
    let displayed = price * (Decimal::ONE + jitter * r);

    // Keep the bound exact even if the multiplication had to round
    let low = price * (Decimal::ONE - jitter);
    let high = price * (Decimal::ONE + jitter);
    displayed.max(low).min(high)
}

pub struct PriceFeed {
    source: Arc<dyn PriceSource>,
    config: FeedConfig,
    state: RwLock<FeedState>,
    displayed: watch::Sender<Arc<PriceMap>>,
}

impl PriceFeed {
    pub fn new(source: Arc<dyn PriceSource>, config: FeedConfig) -> Self {
        let (displayed, _) = watch::channel(Arc::new(PriceMap::new()));
        Self {
            source,
            config,
            state: RwLock::new(FeedState::default()),
            displayed,
        }
    }

    pub fn status(&self) -> FeedStatus {
        self.state.read().status
    }

    /// Latest authoritative map (shared, never mutated in place)
    pub fn authoritative(&self) -> Arc<PriceMap> {
        self.state.read().authoritative.clone()
    }

    /// Latest displayed map
    pub fn displayed(&self) -> Arc<PriceMap> {
        self.displayed.borrow().clone()
    }

    /// Displayed price for one symbol
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.displayed.borrow().get(symbol).map(|s| s.price)
    }

    /// Receiver that wakes on every published displayed map
    pub fn subscribe(&self) -> watch::Receiver<Arc<PriceMap>> {
        self.displayed.subscribe()
    }

    pub fn seconds_since_success(&self) -> Option<u64> {
        self.state.read().last_success.map(|t| t.elapsed().as_secs())
    }

    /// Fetch authoritative prices once. Safe to call alongside the timer;
    /// whichever response completes last is the one kept.
    pub async fn refresh(&self) -> FeedStatus {
        let result = match self.source.fetch(&self.config.asset_ids).await {
            Ok(snapshots) if snapshots.is_empty() => {
                Err(FeedError::Parse("empty price response".to_string()))
            }
            other => other,
        };

        let (status, published) = {
            let mut state = self.state.write();
            match result {
                Ok(snapshots) => {
                    let map = merge_fresh(snapshots, &state.authoritative);
                    state.authoritative = Arc::new(map);
                    state.status = match state.status {
                        FeedStatus::Live { refreshes } => FeedStatus::Live { refreshes: refreshes + 1 },
                        _ => {
                            info!("Price feed live ({} assets)", state.authoritative.len());
                            FeedStatus::Live { refreshes: 1 }
                        }
                    };
                    state.last_success = Some(Instant::now());
                    state.consecutive_failures = 0;
                }
                Err(e) => {
                    state.consecutive_failures += 1;
                    match state.status {
                        FeedStatus::Uninitialized => {
                            warn!("Price fetch failed with no data yet, using fallback prices: {}", e);
                            state.authoritative = Arc::new(fallback_prices());
                            state.status = FeedStatus::StaleFallback;
                        }
                        FeedStatus::StaleFallback => {
                            warn!(
                                "Price fetch failed ({} in a row), still on fallback prices: {}",
                                state.consecutive_failures, e
                            );
                        }
                        FeedStatus::Live { .. } => {
                            warn!(
                                "Price fetch failed ({} in a row), keeping last prices: {}",
                                state.consecutive_failures, e
                            );
                        }
                    }
                }
            }
            (state.status, state.authoritative.clone())
        };

        self.displayed.send_replace(published);
        status
    }

    /// Publish one perturbed view of the authoritative map
    pub fn tick(&self) -> Arc<PriceMap> {
        let authoritative = self.authoritative();
        let mut rng = rand::thread_rng();

        let displayed: PriceMap = authoritative
            .iter()
            .map(|(symbol, snapshot)| {
                let mut shown = snapshot.clone();
                shown.price = perturb(snapshot.price, self.config.jitter, &mut rng);
                (symbol.clone(), shown)
            })
            .collect();

        let displayed = Arc::new(displayed);
        self.displayed.send_replace(displayed.clone());
        displayed
    }

    /// Start the refresh and tick jobs
    pub fn spawn(self: &Arc<Self>) -> TaskGroup {
        let mut tasks = TaskGroup::new("price feed");

        let feed = self.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(feed.config.refresh_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let status = feed.refresh().await;
                debug!("Price refresh done: {:?}", status);
            }
        });

        let feed = self.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(feed.config.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate first tick so the first refresh can land
            interval.tick().await;
            loop {
                interval.tick().await;
                feed.tick();
            }
        });

        info!(
            "Price feed started: refresh every {:?}, tick every {:?}, jitter {}",
            self.config.refresh_interval, self.config.tick_interval, self.config.jitter
        );
        tasks
    }
}

/// Build the new authoritative map from a fetch. Tracked entries missing from
/// the response keep their previous value (or the fallback one), and the
/// platform token is added when absent.
fn merge_fresh(snapshots: Vec<PriceSnapshot>, previous: &PriceMap) -> PriceMap {
    let mut map: PriceMap = snapshots
        .into_iter()
        .map(|s| (s.symbol.clone(), s))
        .collect();

    let fallback = fallback_prices();
    for (symbol, snapshot) in fallback {
        if !map.contains_key(&symbol) {
            let carried = previous.get(&symbol).cloned().unwrap_or(snapshot);
            map.insert(symbol, carried);
        }
    }

    map.entry(PLATFORM_SYMBOL.to_string())
        .or_insert_with(platform_snapshot);
    map
}
