use thiserror::Error;

/// Failures of the external price and history sources.
/// None of these are fatal: callers fall back or keep stale data.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {source_name}")]
    Status { source_name: &'static str, status: u16 },

    #[error("parse failure: {0}")]
    Parse(String),
}

/// Wallet boundary failures
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("request rejected by user")]
    UserRejected,

    #[error("wallet not connected")]
    NotConnected,

    #[error("unknown chain id {0}")]
    UnknownChain(u64),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Swap quoting and execution failures
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("invalid amount {0:?}")]
    InvalidAmount(String),

    #[error("no price for {0}")]
    MissingPrice(String),

    #[error("cannot swap {0} for itself")]
    SameAsset(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Log write failed; the swap was not recorded
    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}
