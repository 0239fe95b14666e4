//! Error types for combining signatures and broadcasting.

use thiserror::Error;

/// Errors raised while assembling a signed multisig transaction.
///
/// None of these are recoverable by retrying: they mean the signer set or the
/// session document is wrong and the transaction must not be broadcast.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CombineError {
    /// The transaction template has no inputs to sign.
    #[error("transaction has no inputs")]
    NoInputs,

    /// A signer's key or signature list does not line up with the inputs.
    #[error(
        "signer {signer} supplied {public_keys} public keys and {signatures} signatures for {inputs} inputs"
    )]
    MismatchedLength {
        signer: String,
        public_keys: usize,
        signatures: usize,
        inputs: usize,
    },

    /// The input list disagrees with the unsigned transaction.
    #[error("input {input}: {reason}")]
    InputMismatch { input: usize, reason: String },

    /// The redeem/witness script is not a bare m-of-n CHECKMULTISIG script.
    #[error("input {input}: invalid multisig script: {reason}")]
    InvalidScript { input: usize, reason: String },

    /// A signature failed to parse, verify, or conflicts with another signer.
    #[error("input {input}: invalid signature for public key {public_key}: {reason}")]
    InvalidSignature {
        input: usize,
        public_key: String,
        reason: String,
    },

    /// Not enough valid signatures to satisfy the input's threshold.
    #[error("input {input}: {valid} valid signatures, {required} required")]
    IncompleteSignature {
        input: usize,
        required: usize,
        valid: usize,
    },
}

/// Errors raised while submitting a signed transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// The hex payload is not a transaction. The endpoint was not contacted.
    #[error("malformed transaction: {0}")]
    Malformed(String),

    /// The endpoint answered and refused the transaction.
    #[error("broadcast rejected: {0}")]
    Rejected(String),

    /// The node reports the transaction as already confirmed (RPC code -27).
    #[error("transaction already confirmed: {0}")]
    AlreadyConfirmed(String),

    /// The request never got a usable answer (connection, TLS, decoding).
    #[error("broadcast request failed: {0}")]
    Transport(String),

    /// The endpoint accepted the request but returned no transaction id.
    #[error("endpoint returned an empty transaction id")]
    EmptyResponse,
}

impl From<reqwest::Error> for BroadcastError {
    fn from(err: reqwest::Error) -> Self {
        BroadcastError::Transport(err.to_string())
    }
}

/// Errors from the broadcast session state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a broadcast is already in flight")]
    AlreadyBroadcasting,

    #[error("transaction already broadcast as {0}")]
    AlreadyBroadcast(String),

    #[error("no broadcast in flight")]
    NotBroadcasting,

    #[error(transparent)]
    Combine(#[from] CombineError),
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
