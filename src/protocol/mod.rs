//! Multisig Spend Protocol
//!
//! - **combine**: regroup signer contributions and assemble the signed transaction
//! - **broadcast**: single-attempt submission to a blockchain endpoint
//! - **session**: spend session documents and the broadcast state machine

pub mod broadcast;
pub mod combine;
pub mod session;
