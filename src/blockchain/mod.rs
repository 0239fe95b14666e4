//! Blockchain Endpoints
//!
//! Signed transactions reach the network through one of two clients:
//!
//! - **esplora**: public REST API (`POST {api}/tx`, mempool.space by default)
//! - **bitcoind**: a private node over JSON-RPC (`sendrawtransaction`)
//!
//! Both make exactly one request per submission and never retry.

pub mod bitcoind;
pub mod esplora;

pub use bitcoind::BitcoindClient;
pub use esplora::EsploraClient;

use crate::btc::network::Network;
use crate::config::ClientConfig;
use crate::error::{BroadcastError, ConfigError};
use std::future::Future;

/// Something that can hand a raw transaction to the network.
pub trait TransactionSubmitter {
    /// Submit `raw_tx_hex` once and return the id the endpoint reports.
    ///
    /// Rejections carry the endpoint's message unmodified.
    fn submit(
        &self,
        raw_tx_hex: &str,
        network: Network,
    ) -> impl Future<Output = Result<String, BroadcastError>> + Send;
}

/// Client selected from [`ClientConfig`].
#[derive(Debug, Clone)]
pub enum BlockchainClient {
    Public(EsploraClient),
    Private(BitcoindClient),
}

impl BlockchainClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        match config {
            ClientConfig::Public { api_url } => {
                let client = match api_url {
                    Some(url) => EsploraClient::with_api_url(url)?,
                    None => EsploraClient::new(),
                };
                Ok(BlockchainClient::Public(client))
            }
            ClientConfig::Private {
                url,
                username,
                password,
            } => Ok(BlockchainClient::Private(BitcoindClient::new(
                url,
                username.clone(),
                password.clone(),
            )?)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BlockchainClient::Public(_) => "public",
            BlockchainClient::Private(_) => "private",
        }
    }
}

impl TransactionSubmitter for BlockchainClient {
    async fn submit(&self, raw_tx_hex: &str, network: Network) -> Result<String, BroadcastError> {
        match self {
            BlockchainClient::Public(client) => client.submit(raw_tx_hex, network).await,
            BlockchainClient::Private(client) => client.submit(raw_tx_hex, network).await,
        }
    }
}

pub(crate) fn parse_endpoint(raw: &str) -> Result<url::Url, ConfigError> {
    url::Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| ConfigError::Invalid(format!("invalid URL '{}': {}", raw, e)))
}
