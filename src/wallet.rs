use async_trait::async_trait;
use ethers::prelude::*;
use ethers::utils::{format_ether, format_units};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::WalletError;
use crate::networks::{network_for, Network, NETWORKS};

const EVENT_CAPACITY: usize = 16;

/// Account and chain changes pushed by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountChanged(String),
    ChainChanged(u64),
    Disconnected,
}

/// Boundary to the user's wallet. The portfolio services only read the
/// native balance; the swap service may ask for a zero-value self-transaction.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Request access and return the active address
    async fn connect(&self) -> Result<String, WalletError>;

    /// Forget the account locally
    fn disconnect(&self);

    fn account(&self) -> Option<String>;

    async fn native_balance(&self, address: &str) -> Result<Decimal, WalletError>;

    async fn chain_id(&self) -> Result<u64, WalletError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    async fn gas_price_gwei(&self) -> Result<Decimal, WalletError>;

    /// Send 0 native units from the account to itself, returning the hash
    async fn send_self_transaction(&self) -> Result<String, WalletError>;

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Map provider error text onto the wallet taxonomy
pub fn classify_provider_error(message: &str) -> WalletError {
    let lower = message.to_lowercase();
    if lower.contains("user rejected") || lower.contains("user denied") || lower.contains("4001") {
        WalletError::UserRejected
    } else {
        WalletError::Provider(message.to_string())
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, WalletError> {
    Decimal::from_str(raw).map_err(|e| WalletError::Provider(format!("bad amount {}: {}", raw, e)))
}

struct RpcState {
    provider: Provider<Http>,
    network: Network,
    account: Option<Address>,
}

/// Wallet backed by a JSON-RPC node. With a private key it can sign the
/// self-transaction; without one it is a read-only watch wallet.
pub struct RpcWallet {
    state: RwLock<RpcState>,
    signer: Option<LocalWallet>,
    watch_address: Option<Address>,
    events: broadcast::Sender<WalletEvent>,
}

impl RpcWallet {
    pub fn new(
        rpc_url: &str,
        chain_id: u64,
        private_key: Option<&str>,
        watch_address: Option<&str>,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let provider = Provider::<Http>::try_from(rpc_url).context("Invalid RPC URL")?;
        let signer = private_key
            .map(|pk| pk.parse::<LocalWallet>().context("Invalid private key"))
            .transpose()?;
        let watch_address = watch_address
            .map(|a| Address::from_str(a).context("Invalid wallet address"))
            .transpose()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            state: RwLock::new(RpcState {
                provider,
                network: network_for(chain_id),
                account: None,
            }),
            signer,
            watch_address,
            events,
        })
    }

    pub fn network(&self) -> Network {
        self.state.read().network.clone()
    }

    fn provider(&self) -> Provider<Http> {
        self.state.read().provider.clone()
    }

    fn emit(&self, event: WalletEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Wallet for RpcWallet {
    async fn connect(&self) -> Result<String, WalletError> {
        let address = self
            .signer
            .as_ref()
            .map(|s| s.address())
            .or(self.watch_address)
            .ok_or_else(|| WalletError::Provider("no account configured".to_string()))?;

        let chain_id = self.chain_id().await?;
        {
            let mut state = self.state.write();
            state.account = Some(address);
            state.network = network_for(chain_id);
        }

        let address = format!("{:?}", address);
        info!("Wallet connected: {} on chain {}", address, chain_id);
        self.emit(WalletEvent::AccountChanged(address.clone()));
        Ok(address)
    }

    fn disconnect(&self) {
        self.state.write().account = None;
        self.emit(WalletEvent::Disconnected);
    }

    fn account(&self) -> Option<String> {
        self.state.read().account.map(|a| format!("{:?}", a))
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, WalletError> {
        let address = Address::from_str(address)
            .map_err(|e| WalletError::Provider(format!("bad address {}: {}", address, e)))?;
        let wei = self
            .provider()
            .get_balance(address, None)
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;
        parse_decimal(&format_ether(wei))
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        let id = self
            .provider()
            .get_chainid()
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;
        Ok(id.as_u64())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let network = NETWORKS
            .iter()
            .find(|n| n.chain_id == chain_id)
            .cloned()
            .ok_or(WalletError::UnknownChain(chain_id))?;
        let rpc_url = network
            .rpc_urls
            .first()
            .ok_or_else(|| WalletError::Provider(format!("no RPC for {}", network.chain_name)))?;
        let provider = Provider::<Http>::try_from(*rpc_url)
            .map_err(|e| WalletError::Provider(e.to_string()))?;

        {
            let mut state = self.state.write();
            state.provider = provider;
            state.network = network.clone();
        }

        info!("Switched to {} ({})", network.chain_name, network.chain_id_hex());
        self.emit(WalletEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn gas_price_gwei(&self) -> Result<Decimal, WalletError> {
        let wei = self
            .provider()
            .get_gas_price()
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;
        let gwei = format_units(wei, "gwei").map_err(|e| WalletError::Provider(e.to_string()))?;
        parse_decimal(&gwei)
    }

    async fn send_self_transaction(&self) -> Result<String, WalletError> {
        let signer = self
            .signer
            .clone()
            .ok_or_else(|| WalletError::Provider("read-only wallet cannot sign".to_string()))?;
        if self.state.read().account.is_none() {
            return Err(WalletError::NotConnected);
        }

        let chain_id = self.chain_id().await?;
        let address = signer.address();
        let client = SignerMiddleware::new(self.provider(), signer.with_chain_id(chain_id));

        let tx = TransactionRequest::new().from(address).to(address).value(0u64);
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        let hash = format!("{:?}", pending.tx_hash());
        debug!("Self-transaction sent: {}", hash);
        Ok(hash)
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

struct SimulatedState {
    account: Option<String>,
    chain_id: u64,
    native_balance: Decimal,
}

/// In-memory wallet: no node, no signing. Used when no RPC is configured.
pub struct SimulatedWallet {
    address: String,
    state: RwLock<SimulatedState>,
    gas_price_gwei: Decimal,
    reject_next: AtomicBool,
    events: broadcast::Sender<WalletEvent>,
}

impl SimulatedWallet {
    pub fn new(address: &str, chain_id: u64, native_balance: Decimal) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            address: address.to_string(),
            state: RwLock::new(SimulatedState {
                account: None,
                chain_id,
                native_balance,
            }),
            gas_price_gwei: Decimal::from(20),
            reject_next: AtomicBool::new(false),
            events,
        }
    }

    pub fn set_native_balance(&self, balance: Decimal) {
        self.state.write().native_balance = balance;
    }

    /// Make the next prompt fail as if the user dismissed it
    pub fn reject_next_request(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    fn emit(&self, event: WalletEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Wallet for SimulatedWallet {
    async fn connect(&self) -> Result<String, WalletError> {
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(WalletError::UserRejected);
        }
        self.state.write().account = Some(self.address.clone());
        self.emit(WalletEvent::AccountChanged(self.address.clone()));
        Ok(self.address.clone())
    }

    fn disconnect(&self) {
        self.state.write().account = None;
        self.emit(WalletEvent::Disconnected);
    }

    fn account(&self) -> Option<String> {
        self.state.read().account.clone()
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, WalletError> {
        if !address.eq_ignore_ascii_case(&self.address) {
            warn!("Balance requested for foreign address {}", address);
            return Ok(Decimal::ZERO);
        }
        Ok(self.state.read().native_balance)
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.state.read().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        if !NETWORKS.iter().any(|n| n.chain_id == chain_id) {
            return Err(WalletError::UnknownChain(chain_id));
        }
        self.state.write().chain_id = chain_id;
        self.emit(WalletEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn gas_price_gwei(&self) -> Result<Decimal, WalletError> {
        Ok(self.gas_price_gwei)
    }

    async fn send_self_transaction(&self) -> Result<String, WalletError> {
        if self.state.read().account.is_none() {
            return Err(WalletError::NotConnected);
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(WalletError::UserRejected);
        }
        Ok(format!("0x{}", uuid::Uuid::new_v4().simple()))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

    #[test]
    fn test_classify_provider_error() {
        assert!(matches!(
            classify_provider_error("MetaMask Tx Signature: User denied transaction signature."),
            WalletError::UserRejected
        ));
        assert!(matches!(
            classify_provider_error("(code: 4001, message: rejected)"),
            WalletError::UserRejected
        ));
        assert!(matches!(
            classify_provider_error("insufficient funds"),
            WalletError::Provider(_)
        ));
    }

    #[tokio::test]
    async fn test_simulated_wallet_flow() {
        let wallet = SimulatedWallet::new(ADDRESS, 1, dec!(2));
        let mut events = wallet.subscribe();

        assert!(matches!(wallet.send_self_transaction().await, Err(WalletError::NotConnected)));

        let address = wallet.connect().await.unwrap();
        assert_eq!(address, ADDRESS);
        assert_eq!(events.recv().await.unwrap(), WalletEvent::AccountChanged(ADDRESS.into()));
        assert_eq!(wallet.native_balance(ADDRESS).await.unwrap(), dec!(2));

        let hash = wallet.send_self_transaction().await.unwrap();
        assert!(hash.starts_with("0x"));

        wallet.reject_next_request();
        assert!(matches!(wallet.send_self_transaction().await, Err(WalletError::UserRejected)));

        wallet.disconnect();
        assert_eq!(events.recv().await.unwrap(), WalletEvent::Disconnected);
        assert!(wallet.account().is_none());
    }

    #[tokio::test]
    async fn test_simulated_switch_chain() {
        let wallet = SimulatedWallet::new(ADDRESS, 1, Decimal::ZERO);
        wallet.switch_chain(137).await.unwrap();
        assert_eq!(wallet.chain_id().await.unwrap(), 137);
        assert!(matches!(
            wallet.switch_chain(999_999).await,
            Err(WalletError::UnknownChain(999_999))
        ));
    }

    #[test]
    fn test_rpc_wallet_rejects_bad_key() {
        assert!(RpcWallet::new("http://127.0.0.1:8545", 1, Some("not-a-key"), None).is_err());
        let wallet = RpcWallet::new("http://127.0.0.1:8545", 137, None, Some(ADDRESS)).unwrap();
        assert_eq!(wallet.network().native_symbol(), "MATIC");
        assert!(wallet.account().is_none());
    }
}
