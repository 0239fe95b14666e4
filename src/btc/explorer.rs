//! Block explorer links for broadcast transactions

use super::network::Network;

const MEMPOOL_MAINNET_EXPLORER: &str = "https://mempool.space";
const MEMPOOL_TESTNET_EXPLORER: &str = "https://mempool.space/testnet";

pub fn explorer_base(network: Network) -> &'static str {
    match network {
        Network::Mainnet => MEMPOOL_MAINNET_EXPLORER,
        Network::Testnet => MEMPOOL_TESTNET_EXPLORER,
    }
}

/// Explorer page for a transaction id.
pub fn transaction_url(txid: &str, network: Network) -> String {
    format!("{}/tx/{}", explorer_base(network), txid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_url_per_network() {
        let txid = "ab".repeat(32);
        assert_eq!(
            transaction_url(&txid, Network::Mainnet),
            format!("https://mempool.space/tx/{}", txid)
        );
        assert_eq!(
            transaction_url(&txid, Network::Testnet),
            format!("https://mempool.space/testnet/tx/{}", txid)
        );
    }
}
