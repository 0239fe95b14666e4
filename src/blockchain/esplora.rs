//! Esplora REST broadcast (mempool.space and compatible)

use super::{parse_endpoint, TransactionSubmitter};
use crate::btc::network::Network;
use crate::error::{BroadcastError, ConfigError};
use reqwest::Client;
use tracing::debug;

// Mempool.space API endpoints
const MEMPOOL_MAINNET_API: &str = "https://mempool.space/api";
const MEMPOOL_TESTNET_API: &str = "https://mempool.space/testnet/api";

pub fn default_api_base(network: Network) -> &'static str {
    match network {
        Network::Mainnet => MEMPOOL_MAINNET_API,
        Network::Testnet => MEMPOOL_TESTNET_API,
    }
}

#[derive(Debug, Clone)]
pub struct EsploraClient {
    http: Client,
    /// Fixed API base; `None` picks mempool.space per network.
    api_url: Option<url::Url>,
}

impl Default for EsploraClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EsploraClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            api_url: None,
        }
    }

    /// Use a self-hosted API for every network.
    pub fn with_api_url(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            http: Client::new(),
            api_url: Some(parse_endpoint(api_url)?),
        })
    }

    pub fn tx_endpoint(&self, network: Network) -> String {
        let base = match &self.api_url {
            Some(url) => url.as_str().trim_end_matches('/').to_string(),
            None => default_api_base(network).to_string(),
        };
        format!("{}/tx", base)
    }
}

impl TransactionSubmitter for EsploraClient {
    async fn submit(&self, raw_tx_hex: &str, network: Network) -> Result<String, BroadcastError> {
        let url = self.tx_endpoint(network);
        debug!(%url, "posting transaction");

        let response = self
            .http
            .post(&url)
            .body(raw_tx_hex.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = body.trim();
            return Err(BroadcastError::Rejected(if detail.is_empty() {
                status.to_string()
            } else {
                detail.to_string()
            }));
        }

        Ok(body.trim().to_string())
    }
}
