//! Combine collected multisig signatures into a signed Bitcoin transaction
//! and broadcast it.
//!
//! - **btc**: multisig scripts, transaction assembly, explorer links
//! - **protocol**: signature combination, broadcast, spend sessions
//! - **blockchain**: Esplora and bitcoind endpoints
//! - **config**: TOML + environment configuration
//! - **storage**: session document storage

pub mod blockchain;
pub mod btc;
pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod storage;

#[cfg(test)]
mod fixtures;

pub use error::{BroadcastError, CombineError, ConfigError, SessionError};
pub use protocol::broadcast::broadcast;
pub use protocol::combine::{combine, SignatureImporter, SignatureImporters};

/// Result from a command, separating readable output from the JSON result
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Human-readable output
    pub output: String,
    /// Clean JSON result for scripting
    pub result: String,
}

/// Break `text` into lines of at most `width` characters.
pub fn wrap_text(text: &str, width: usize) -> String {
    if width == 0 {
        return text.to_string();
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|line| line.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
