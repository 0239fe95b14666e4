//! Command implementations behind the CLI.
//!
//! Each `*_core` function returns a [`CommandResult`]: readable output plus a
//! JSON line for scripts. The binary only parses flags and prints.

use crate::blockchain::TransactionSubmitter;
use crate::btc::explorer::transaction_url;
use crate::btc::network::Network;
use crate::protocol::session::{BroadcastState, SpendSession};
use crate::storage::Storage;
use crate::{wrap_text, CommandResult};
use anyhow::{Context, Result};
use bitcoin::Txid;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const HEX_WRAP: usize = 128;
const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignedTransactionOutput {
    pub txid: String,
    pub raw_tx: String,
    pub inputs: usize,
    pub signers: usize,
    pub network: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BroadcastOutput {
    pub txid: Option<String>,
    pub raw_tx: String,
    pub network: String,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExplorerOutput {
    pub txid: String,
    pub network: String,
    pub explorer_url: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Combine the session's signatures and show the signed transaction.
pub fn combine_core(session_key: &str, storage: &dyn Storage) -> Result<CommandResult> {
    let session = SpendSession::load(storage, session_key)?;
    let signed = session
        .signed_transaction()
        .context("Failed to combine signatures")?;
    let raw_tx = bitcoin::consensus::encode::serialize_hex(&signed);
    let txid = signed.compute_txid().to_string();

    let mut out = String::new();
    out.push_str("Signed Transaction\n\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("Network: {}\n", session.network));
    out.push_str(&format!("Inputs: {}\n", signed.input.len()));
    out.push_str(&format!("Signers: {}\n", session.signature_importers.len()));
    out.push_str(&format!("TxID: {}\n", txid));
    out.push_str(&format!("Size: {} bytes\n\n", raw_tx.len() / 2));
    out.push_str(&wrap_text(&raw_tx, HEX_WRAP));
    out.push('\n');

    let output = SignedTransactionOutput {
        txid,
        raw_tx,
        inputs: signed.input.len(),
        signers: session.signature_importers.len(),
        network: session.network.to_string(),
        event_type: "signed_transaction".to_string(),
    };

    Ok(CommandResult {
        output: out,
        result: serde_json::to_string(&output)?,
    })
}

/// Combine, broadcast once, and record the outcome in the session document.
///
/// `network` overrides the session's network for this submission only; the
/// stored document keeps its own.
///
/// Endpoint failures are reported in the result, not as an `Err`, so the raw
/// transaction is still shown for a manual retry.
pub async fn broadcast_core<S: TransactionSubmitter>(
    session_key: &str,
    network: Option<Network>,
    storage: &dyn Storage,
    client: &S,
) -> Result<CommandResult> {
    let mut session = SpendSession::load(storage, session_key)?;
    let network = network.unwrap_or(session.network);

    let raw_tx = session
        .signed_transaction_hex()
        .context("Failed to combine signatures")?;

    let mut out = String::new();
    out.push_str("Broadcast\n\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("Network: {}\n", network));
    out.push_str("Warning: broadcasting a transaction cannot be undone.\n\n");
    out.push_str("Broadcasting transaction...\n");

    let state = session
        .broadcast_signed(&raw_tx, network, client)
        .await?
        .clone();
    session
        .save(storage, session_key)
        .context("Failed to record broadcast result")?;

    let explorer_url = state.txid().map(|txid| transaction_url(txid, network));
    match &state {
        BroadcastState::Succeeded { txid } => {
            out.push_str("\nTransaction successfully broadcast.\n");
            out.push_str(&format!("TxID: {}\n", txid));
            if let Some(url) = &explorer_url {
                out.push_str(&format!("Explorer: {}\n", url));
            }
        }
        BroadcastState::Failed { message } => {
            out.push_str(&format!("\n{}\n", message));
            out.push_str("Raw transaction (for manual broadcast):\n");
            out.push_str(&wrap_text(&raw_tx, HEX_WRAP));
            out.push('\n');
        }
        BroadcastState::Idle | BroadcastState::Broadcasting => {}
    }

    let output = BroadcastOutput {
        txid: state.txid().map(str::to_string),
        raw_tx,
        network: network.to_string(),
        explorer_url,
        error: state.error().map(str::to_string),
        event_type: "broadcast".to_string(),
    };

    Ok(CommandResult {
        output: out,
        result: serde_json::to_string(&output)?,
    })
}

/// Explorer link for an already known transaction id.
pub fn explorer_url_core(txid: &str, network: Network) -> Result<CommandResult> {
    let txid = Txid::from_str(txid.trim()).context("Invalid transaction id")?;
    let url = transaction_url(&txid.to_string(), network);

    let output = ExplorerOutput {
        txid: txid.to_string(),
        network: network.to_string(),
        explorer_url: url.clone(),
        event_type: "explorer_url".to_string(),
    };

    Ok(CommandResult {
        output: format!("{}\n", url),
        result: serde_json::to_string(&output)?,
    })
}
