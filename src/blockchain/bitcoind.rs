//! bitcoind JSON-RPC broadcast

use super::{parse_endpoint, TransactionSubmitter};
use crate::btc::network::Network;
use crate::error::{BroadcastError, ConfigError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Serialize, Debug)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'static str,
    params: Vec<&'a str>,
}

#[derive(Deserialize, Debug)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize, Debug)]
struct RpcError {
    code: i64,
    message: String,
}

/// RPC_VERIFY_ALREADY_IN_CHAIN
const RPC_ALREADY_IN_CHAIN: i64 = -27;

#[derive(Clone)]
pub struct BitcoindClient {
    http: Client,
    url: url::Url,
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for BitcoindClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitcoindClient")
            .field("url", &self.url.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl BitcoindClient {
    pub fn new(
        url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            http: Client::new(),
            url: parse_endpoint(url)?,
            username,
            password,
        })
    }

}

/// Turn a JSON-RPC reply into a txid or the node's error message.
fn interpret_response(status: reqwest::StatusCode, body: &str) -> Result<String, BroadcastError> {
    // bitcoind answers RPC errors with HTTP 500 and a JSON body
    match serde_json::from_str::<RpcResponse>(body) {
        Ok(RpcResponse {
            error: Some(error), ..
        }) if error.code == RPC_ALREADY_IN_CHAIN => Err(BroadcastError::AlreadyConfirmed(format!(
            "{} (code {})",
            error.message, error.code
        ))),
        Ok(RpcResponse {
            error: Some(error), ..
        }) => Err(BroadcastError::Rejected(format!(
            "{} (code {})",
            error.message, error.code
        ))),
        Ok(RpcResponse {
            result: Some(Value::String(txid)),
            ..
        }) => Ok(txid.trim().to_string()),
        Ok(_) if status.is_success() => Err(BroadcastError::EmptyResponse),
        _ if !status.is_success() => {
            let detail = body.trim();
            Err(BroadcastError::Rejected(if detail.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, detail)
            }))
        }
        _ => Err(BroadcastError::Transport(format!(
            "unexpected RPC response: {}",
            body.trim()
        ))),
    }
}

impl TransactionSubmitter for BitcoindClient {
    async fn submit(&self, raw_tx_hex: &str, network: Network) -> Result<String, BroadcastError> {
        // The node is bound to one chain; the network only shows up in logs
        debug!(url = %self.url, %network, "sendrawtransaction");

        let request = RpcRequest {
            jsonrpc: "1.0",
            id: "multisig-spend",
            method: "sendrawtransaction",
            params: vec![raw_tx_hex],
        };

        let mut builder = self.http.post(self.url.clone()).json(&request);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        interpret_response(status, &body)
    }
}
