//! Configuration loading
//!
//! A TOML file selects the network and the broadcast endpoint:
//!
//! ```toml
//! network = "testnet"
//!
//! [client]
//! type = "private"
//! url = "http://127.0.0.1:18332"
//! username = "rpcuser"
//! password = "rpcpass"
//! ```
//!
//! Environment variables override the file, CLI flags override both.

use crate::btc::network::Network;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_NETWORK: &str = "MULTISIG_NETWORK";
pub const ENV_CLIENT_URL: &str = "MULTISIG_CLIENT_URL";
pub const ENV_CLIENT_USERNAME: &str = "MULTISIG_CLIENT_USERNAME";
pub const ENV_CLIENT_PASSWORD: &str = "MULTISIG_CLIENT_PASSWORD";

/// Where signed transactions are submitted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientConfig {
    /// Public Esplora-compatible REST API (mempool.space by default).
    Public {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_url: Option<String>,
    },
    /// A bitcoind node reached over JSON-RPC.
    Private {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::Public { api_url: None }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MULTISIG_*` environment overrides.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    ///
    /// Setting a client URL switches a public client to a private node.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(network) = lookup(ENV_NETWORK) {
            self.network = network.parse().map_err(ConfigError::Invalid)?;
        }

        if let Some(new_url) = lookup(ENV_CLIENT_URL) {
            self.client = match self.client {
                ClientConfig::Private {
                    username, password, ..
                } => ClientConfig::Private {
                    url: new_url,
                    username,
                    password,
                },
                ClientConfig::Public { .. } => ClientConfig::Private {
                    url: new_url,
                    username: None,
                    password: None,
                },
            };
        }

        if let ClientConfig::Private {
            username, password, ..
        } = &mut self.client
        {
            if let Some(value) = lookup(ENV_CLIENT_USERNAME) {
                *username = Some(value);
            }
            if let Some(value) = lookup(ENV_CLIENT_PASSWORD) {
                *password = Some(value);
            }
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match &self.client {
            ClientConfig::Public { api_url: Some(url) } => check_http_url(url),
            ClientConfig::Public { api_url: None } => Ok(()),
            ClientConfig::Private { url, .. } => check_http_url(url),
        }
    }
}

fn check_http_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::Invalid(format!("invalid URL '{}': {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "unsupported URL scheme '{}' in '{}'",
            other, raw
        ))),
    }
}
