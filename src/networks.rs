//! Known chains and their native currencies.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub chain_name: &'static str,
    pub native_currency: NativeCurrency,
    pub rpc_urls: &'static [&'static str],
    pub block_explorer_urls: &'static [&'static str],
}

impl Network {
    /// Chain id as the 0x-prefixed hex string wallets use
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    pub fn native_symbol(&self) -> &'static str {
        self.native_currency.symbol
    }

    /// Explorer link for a transaction hash, if the chain has an explorer
    pub fn tx_url(&self, hash: &str) -> Option<String> {
        self.block_explorer_urls
            .first()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), hash))
    }

    pub fn is_known(&self) -> bool {
        NETWORKS.iter().any(|n| n.chain_id == self.chain_id)
    }
}

pub const NETWORKS: &[Network] = &[
    Network {
        chain_id: 1,
        chain_name: "Ethereum Mainnet",
        native_currency: NativeCurrency { name: "Ether", symbol: "ETH", decimals: 18 },
        rpc_urls: &["https://mainnet.infura.io/v3/"],
        block_explorer_urls: &["https://etherscan.io"],
    },
    Network {
        chain_id: 11_155_111,
        chain_name: "Sepolia Testnet",
        native_currency: NativeCurrency { name: "Sepolia Ether", symbol: "SEP", decimals: 18 },
        rpc_urls: &["https://rpc.sepolia.org"],
        block_explorer_urls: &["https://sepolia.etherscan.io"],
    },
    Network {
        chain_id: 137,
        chain_name: "Polygon Mainnet",
        native_currency: NativeCurrency { name: "MATIC", symbol: "MATIC", decimals: 18 },
        rpc_urls: &["https://polygon-rpc.com/"],
        block_explorer_urls: &["https://polygonscan.com/"],
    },
    Network {
        chain_id: 80_002,
        chain_name: "Polygon Amoy",
        native_currency: NativeCurrency { name: "MATIC", symbol: "MATIC", decimals: 18 },
        rpc_urls: &["https://rpc-amoy.polygon.technology"],
        block_explorer_urls: &["https://www.oklink.com/amoy"],
    },
    Network {
        chain_id: 56,
        chain_name: "BSC Mainnet",
        native_currency: NativeCurrency { name: "BNB", symbol: "BNB", decimals: 18 },
        rpc_urls: &["https://bsc-dataseed.binance.org/"],
        block_explorer_urls: &["https://bscscan.com/"],
    },
    Network {
        chain_id: 97,
        chain_name: "BSC Testnet",
        native_currency: NativeCurrency { name: "BNB", symbol: "tBNB", decimals: 18 },
        rpc_urls: &["https://data-seed-prebsc-1-s1.binance.org:8545/"],
        block_explorer_urls: &["https://testnet.bscscan.com/"],
    },
];

/// Look up a chain; unknown ids get a placeholder with symbol `???`
pub fn network_for(chain_id: u64) -> Network {
    NETWORKS
        .iter()
        .find(|n| n.chain_id == chain_id)
        .cloned()
        .unwrap_or(Network {
            chain_id,
            chain_name: "Unknown Network",
            native_currency: NativeCurrency { name: "Unknown", symbol: "???", decimals: 18 },
            rpc_urls: &[],
            block_explorer_urls: &[],
        })
}

/// Parse a chain id given either as decimal or 0x-hex
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

/// Every native symbol in the registry. Swaps never debit these from the
/// derived balances since the wallet reports them directly.
///
/// All chains are included, not only the active one: a swap out of ETH logged
/// on mainnet was already reflected in the wallet balance at the time, so it
/// must stay undebited after the user switches to Polygon.
pub fn native_symbols() -> HashSet<String> {
    NETWORKS
        .iter()
        .map(|n| n.native_currency.symbol.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_networks() {
        let polygon = network_for(137);
        assert_eq!(polygon.native_symbol(), "MATIC");
        assert_eq!(polygon.chain_id_hex(), "0x89");
        assert!(polygon.is_known());

        let unknown = network_for(424242);
        assert_eq!(unknown.chain_name, "Unknown Network");
        assert_eq!(unknown.native_symbol(), "???");
        assert!(!unknown.is_known());
        assert!(unknown.tx_url("0xabc").is_none());
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("0xaa36a7"), Some(11_155_111));
        assert_eq!(parse_chain_id("137"), Some(137));
        assert_eq!(parse_chain_id("0xzz"), None);
    }

    #[test]
    fn test_tx_url_trims_slash() {
        let bsc = network_for(56);
        assert_eq!(bsc.tx_url("0x01").as_deref(), Some("https://bscscan.com/tx/0x01"));
    }

    #[test]
    fn test_native_symbols() {
        let natives = native_symbols();
        for sym in ["ETH", "MATIC", "BNB", "SEP", "tBNB"] {
            assert!(natives.contains(sym));
        }
        assert!(!natives.contains("USDT"));
    }
}
