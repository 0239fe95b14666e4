//! Spend Sessions
//!
//! A session document holds everything needed to finish a multisig spend:
//! network, unsigned transaction, inputs and the collected signatures. The
//! broadcast outcome is tracked as an explicit state so callers render from
//! one value:
//!
//! ```text
//!   Idle ──start──▶ Broadcasting ──ok──▶ Succeeded { txid }
//!    ▲                   │
//!    │                   └──err─▶ Failed { message } ──start──▶ Broadcasting
//!    └─ (dropped mid-flight)
//! ```

use crate::blockchain::TransactionSubmitter;
use crate::btc::explorer::transaction_url;
use crate::btc::network::Network;
use crate::btc::transaction::{Input, UnsignedTransaction};
use crate::error::{BroadcastError, CombineError, SessionError};
use crate::protocol::broadcast::broadcast;
use crate::protocol::combine::{combine, combine_hex, SignatureImporters};
use crate::storage::{read_json, write_json, Storage};
use anyhow::Result;
use bitcoin::Transaction;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where a session's broadcast stands.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BroadcastState {
    #[default]
    Idle,
    Broadcasting,
    Succeeded {
        txid: String,
    },
    Failed {
        message: String,
    },
}

impl BroadcastState {
    /// Enter `Broadcasting`. Only one attempt may be in flight, and a
    /// successful broadcast is final.
    pub fn start(&self) -> Result<BroadcastState, SessionError> {
        match self {
            BroadcastState::Idle | BroadcastState::Failed { .. } => Ok(BroadcastState::Broadcasting),
            BroadcastState::Broadcasting => Err(SessionError::AlreadyBroadcasting),
            BroadcastState::Succeeded { txid } => Err(SessionError::AlreadyBroadcast(txid.clone())),
        }
    }

    /// Record the outcome of the in-flight attempt.
    pub fn finish(&self, result: Result<String, BroadcastError>) -> Result<BroadcastState, SessionError> {
        if *self != BroadcastState::Broadcasting {
            return Err(SessionError::NotBroadcasting);
        }
        Ok(match result {
            Ok(txid) => BroadcastState::Succeeded { txid },
            Err(err) => BroadcastState::Failed {
                message: format!("There was an error broadcasting the transaction: {}", err),
            },
        })
    }

    pub fn is_broadcasting(&self) -> bool {
        matches!(self, BroadcastState::Broadcasting)
    }

    pub fn txid(&self) -> Option<&str> {
        match self {
            BroadcastState::Succeeded { txid } => Some(txid),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BroadcastState::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Puts an abandoned attempt back to `Idle` so it can be retried.
struct InFlight<'a> {
    state: &'a mut BroadcastState,
}

impl<'a> InFlight<'a> {
    fn begin(state: &'a mut BroadcastState) -> Result<Self, SessionError> {
        *state = state.start()?;
        Ok(Self { state })
    }

    fn finish(self, result: Result<String, BroadcastError>) -> Result<(), SessionError> {
        *self.state = self.state.finish(result)?;
        Ok(())
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.state.is_broadcasting() {
            *self.state = BroadcastState::Idle;
        }
    }
}

/// A multisig spend waiting to be combined and broadcast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpendSession {
    #[serde(default)]
    pub network: Network,
    pub unsigned_transaction: UnsignedTransaction,
    pub inputs: Vec<Input>,
    pub signature_importers: SignatureImporters,
    #[serde(default)]
    pub status: BroadcastState,
}

impl SpendSession {
    pub fn new(
        network: Network,
        unsigned_transaction: UnsignedTransaction,
        inputs: Vec<Input>,
        signature_importers: SignatureImporters,
    ) -> Self {
        Self {
            network,
            unsigned_transaction,
            inputs,
            signature_importers,
            status: BroadcastState::Idle,
        }
    }

    pub fn signed_transaction(&self) -> Result<Transaction, CombineError> {
        combine(&self.unsigned_transaction, &self.inputs, &self.signature_importers)
    }

    pub fn signed_transaction_hex(&self) -> Result<String, CombineError> {
        combine_hex(&self.unsigned_transaction, &self.inputs, &self.signature_importers)
    }

    /// Explorer link once the broadcast succeeded.
    pub fn transaction_url(&self) -> Option<String> {
        self.status
            .txid()
            .map(|txid| transaction_url(txid, self.network))
    }

    /// Combine, then submit once.
    ///
    /// A combination failure returns before anything is sent and leaves the
    /// broadcast state untouched. Endpoint failures land in
    /// [`BroadcastState::Failed`] rather than in the returned error.
    pub async fn broadcast<S: TransactionSubmitter>(
        &mut self,
        client: &S,
    ) -> Result<&BroadcastState, SessionError> {
        let raw_tx = self.signed_transaction_hex()?;
        let network = self.network;
        self.broadcast_signed(&raw_tx, network, client).await
    }

    /// Submit `raw_tx`, already combined from this session, to `network`.
    ///
    /// The stored network is not touched.
    pub async fn broadcast_signed<S: TransactionSubmitter>(
        &mut self,
        raw_tx: &str,
        network: Network,
        client: &S,
    ) -> Result<&BroadcastState, SessionError> {
        let in_flight = InFlight::begin(&mut self.status)?;
        let result = broadcast(raw_tx, network, client).await;
        in_flight.finish(result)?;

        Ok(&self.status)
    }

    /// Load a session document. An attempt recorded as in flight by a process
    /// that never finished it is reset to `Idle`.
    pub fn load(storage: &dyn Storage, key: &str) -> Result<Self> {
        let mut session: SpendSession = read_json(storage, key)?;
        if session.status.is_broadcasting() {
            warn!(key, "session was left broadcasting; resetting to idle");
            session.status = BroadcastState::Idle;
        }
        Ok(session)
    }

    pub fn save(&self, storage: &dyn Storage, key: &str) -> Result<()> {
        write_json(storage, key, self)
    }
}
