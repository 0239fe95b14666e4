//! Bitcoin Integration
//!
//! This module provides Bitcoin-specific functionality:
//!
//! - **multisig**: m-of-n CHECKMULTISIG scripts and address types
//! - **transaction**: sighash, signature validation and spend assembly
//! - **network**: mainnet / testnet selection
//! - **explorer**: block explorer links

pub mod explorer;
pub mod multisig;
pub mod network;
pub mod transaction;
