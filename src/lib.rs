/// BluePeak portfolio services
///
/// Backend for the BluePeak dashboard: a jittered live price feed over a
/// periodically refreshed price API, balance reconciliation that replays a
/// local transaction log over the wallet's native balance and seed holdings,
/// and simulated swaps that append to that log.

pub mod config;
pub mod error;
pub mod history;
pub mod networks;
pub mod portfolio;
pub mod price_feed;
pub mod price_source;
pub mod reconcile;
pub mod swap;
pub mod task;
pub mod tracker;
pub mod tx_log;
pub mod types;
pub mod wallet;
