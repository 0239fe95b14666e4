//! Broadcast Submission
//!
//! One submission per call. The payload is decoded locally first so a
//! malformed transaction never reaches the endpoint. A rejection saying the
//! transaction is already in the block chain means an earlier broadcast
//! confirmed; that is reported as success with the transaction's own id.
//! Bitcoin Core 28 words the same rejection as "Transaction outputs already
//! in utxo set".

use crate::blockchain::TransactionSubmitter;
use crate::btc::network::Network;
use crate::btc::transaction::decode_transaction;
use crate::error::BroadcastError;
use tracing::{info, warn};

const ALREADY_CONFIRMED: [&str; 2] = [
    "transaction already in block chain",
    "transaction outputs already in utxo set",
];

/// Whether an endpoint rejection means the transaction is already confirmed.
pub fn is_already_confirmed(detail: &str) -> bool {
    let detail = detail.to_ascii_lowercase();
    ALREADY_CONFIRMED.iter().any(|phrase| detail.contains(phrase))
}

/// Submit a signed transaction and return the network's transaction id.
pub async fn broadcast<S: TransactionSubmitter>(
    raw_tx_hex: &str,
    network: Network,
    client: &S,
) -> Result<String, BroadcastError> {
    let tx = decode_transaction(raw_tx_hex).map_err(BroadcastError::Malformed)?;
    let txid = tx.compute_txid().to_string();

    info!(%txid, %network, "broadcasting transaction");

    match client.submit(raw_tx_hex.trim(), network).await {
        Ok(returned) => {
            let returned = returned.trim();
            if returned.is_empty() {
                warn!(%txid, "endpoint accepted transaction without returning an id");
                return Err(BroadcastError::EmptyResponse);
            }
            if returned != txid {
                warn!(%txid, %returned, "endpoint reported a different txid");
            }
            info!(txid = %returned, "transaction accepted");
            Ok(returned.to_string())
        }
        Err(BroadcastError::AlreadyConfirmed(detail)) => {
            info!(%txid, %detail, "transaction already confirmed");
            Ok(txid)
        }
        Err(BroadcastError::Rejected(detail)) if is_already_confirmed(&detail) => {
            info!(%txid, %detail, "transaction already confirmed");
            Ok(txid)
        }
        Err(err) => {
            warn!(%txid, error = %err, "broadcast failed");
            Err(err)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::btc::multisig::AddressType;
    use crate::fixtures;
    use std::sync::Mutex;

    /// Records every submission and answers with a canned result.
    pub(crate) struct FakeSubmitter {
        pub calls: Mutex<Vec<(String, Network)>>,
        pub response: Result<String, BroadcastError>,
    }

    impl FakeSubmitter {
        pub fn answering(response: Result<String, BroadcastError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                response,
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl TransactionSubmitter for FakeSubmitter {
        async fn submit(&self, raw_tx_hex: &str, network: Network) -> Result<String, BroadcastError> {
            self.calls
                .lock()
                .unwrap()
                .push((raw_tx_hex.to_string(), network));
            self.response.clone()
        }
    }

    fn sample_hex() -> (String, String) {
        let inputs = vec![fixtures::input(1, AddressType::P2wsh)];
        let unsigned = fixtures::unsigned_transaction(&inputs);
        let txid = unsigned.as_transaction().compute_txid().to_string();
        (unsigned.to_hex(), txid)
    }

    #[tokio::test]
    async fn test_returns_endpoint_txid() {
        let (raw, txid) = sample_hex();
        let client = FakeSubmitter::answering(Ok(format!("{}\n", txid)));

        let result = broadcast(&raw, Network::Testnet, &client).await.unwrap();
        assert_eq!(result, txid);

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (raw, Network::Testnet));
    }

    #[tokio::test]
    async fn test_malformed_hex_never_contacts_endpoint() {
        let client = FakeSubmitter::answering(Ok("unused".to_string()));

        for raw in ["", "zz", "0200"] {
            let err = broadcast(raw, Network::Mainnet, &client).await.unwrap_err();
            assert!(matches!(err, BroadcastError::Malformed(_)));
        }
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_already_in_block_chain_is_success() {
        let (raw, txid) = sample_hex();
        let client = FakeSubmitter::answering(Err(BroadcastError::Rejected(
            "sendrawtransaction RPC error: {\"code\":-27,\"message\":\"Transaction already in block chain\"}"
                .to_string(),
        )));

        let result = broadcast(&raw, Network::Testnet, &client).await.unwrap();
        assert_eq!(result, txid);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_already_in_utxo_set_is_success() {
        let (raw, txid) = sample_hex();
        let client = FakeSubmitter::answering(Err(BroadcastError::Rejected(
            "sendrawtransaction RPC error: {\"code\":-27,\"message\":\"Transaction outputs already in utxo set\"}"
                .to_string(),
        )));

        let result = broadcast(&raw, Network::Testnet, &client).await.unwrap();
        assert_eq!(result, txid);
    }

    #[tokio::test]
    async fn test_node_already_confirmed_is_success() {
        let (raw, txid) = sample_hex();
        let client = FakeSubmitter::answering(Err(BroadcastError::AlreadyConfirmed(
            "Transaction outputs already in utxo set (code -27)".to_string(),
        )));

        let result = broadcast(&raw, Network::Mainnet, &client).await.unwrap();
        assert_eq!(result, txid);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_other_rejections_surface_verbatim() {
        let (raw, _) = sample_hex();
        let detail = "sendrawtransaction RPC error: {\"code\":-26,\"message\":\"min relay fee not met\"}";
        let client = FakeSubmitter::answering(Err(BroadcastError::Rejected(detail.to_string())));

        let err = broadcast(&raw, Network::Testnet, &client).await.unwrap_err();
        assert_eq!(err, BroadcastError::Rejected(detail.to_string()));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mempool_duplicate_is_not_masked() {
        let (raw, _) = sample_hex();
        let client = FakeSubmitter::answering(Err(BroadcastError::Rejected(
            "txn-already-known".to_string(),
        )));

        let err = broadcast(&raw, Network::Testnet, &client).await.unwrap_err();
        assert!(matches!(err, BroadcastError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_empty_id_is_an_error() {
        let (raw, _) = sample_hex();
        let client = FakeSubmitter::answering(Ok("  ".to_string()));

        let err = broadcast(&raw, Network::Testnet, &client).await.unwrap_err();
        assert_eq!(err, BroadcastError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let (raw, _) = sample_hex();
        let client = FakeSubmitter::answering(Err(BroadcastError::Transport(
            "connection refused".to_string(),
        )));

        let err = broadcast(&raw, Network::Testnet, &client).await.unwrap_err();
        assert_eq!(err, BroadcastError::Transport("connection refused".to_string()));
    }

    #[test]
    fn test_already_confirmed_detection() {
        assert!(is_already_confirmed("Transaction already in block chain"));
        assert!(is_already_confirmed("error: TRANSACTION ALREADY IN BLOCK CHAIN (code -27)"));
        assert!(is_already_confirmed("Transaction outputs already in utxo set (code -27)"));
        assert!(!is_already_confirmed("txn-already-in-mempool"));
    }
}
