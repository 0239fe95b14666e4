//! Signature Combination
//!
//! Each signer hands back one signature per input together with the public
//! key it signed with. Combining regroups those contributions per input
//! (public key -> signature) and hands them to the multisig assembly in
//! `btc::transaction`, which checks them against each input's script.
//!
//! ```text
//!   signer A: [pkA_0, pkA_1]  [sigA_0, sigA_1]
//!   signer B: [pkB_0, pkB_1]  [sigB_0, sigB_1]
//!                     │
//!                     ▼
//!   input 0: {pkA_0: sigA_0, pkB_0: sigB_0}
//!   input 1: {pkA_1: sigA_1, pkB_1: sigB_1}
//! ```

use crate::btc::transaction::{
    signed_multisig_transaction, Input, InputSignatureSet, UnsignedTransaction,
};
use crate::error::CombineError;
use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::{PublicKey, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::str::FromStr;

/// One signer's contribution: `public_keys[i]` signed input `i`, producing
/// `signatures[i]`. Both are hex.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignatureImporter {
    pub public_keys: Vec<String>,
    pub signatures: Vec<String>,
}

/// Signer id -> contribution.
pub type SignatureImporters = BTreeMap<String, SignatureImporter>;

/// Combine every signer's signatures into a fully signed transaction.
///
/// Pure: the same arguments always produce the same transaction.
pub fn combine(
    unsigned: &UnsignedTransaction,
    inputs: &[Input],
    importers: &SignatureImporters,
) -> Result<Transaction, CombineError> {
    if inputs.is_empty() {
        return Err(CombineError::NoInputs);
    }

    let sets = input_signature_sets(inputs.len(), importers)?;

    signed_multisig_transaction(unsigned, inputs, &sets)
}

/// Combine and serialise to consensus hex.
pub fn combine_hex(
    unsigned: &UnsignedTransaction,
    inputs: &[Input],
    importers: &SignatureImporters,
) -> Result<String, CombineError> {
    let signed = combine(unsigned, inputs, importers)?;
    Ok(bitcoin::consensus::encode::serialize_hex(&signed))
}

fn check_lengths(input_count: usize, importers: &SignatureImporters) -> Result<(), CombineError> {
    for (signer, importer) in importers {
        if importer.public_keys.len() != input_count || importer.signatures.len() != input_count {
            return Err(CombineError::MismatchedLength {
                signer: signer.clone(),
                public_keys: importer.public_keys.len(),
                signatures: importer.signatures.len(),
                inputs: input_count,
            });
        }
    }
    Ok(())
}

/// Regroup signer contributions into one public key -> signature map per input.
///
/// Two signers claiming the same key for an input must agree on the
/// signature; a conflicting pair is rejected instead of overwritten.
pub fn input_signature_sets(
    input_count: usize,
    importers: &SignatureImporters,
) -> Result<Vec<InputSignatureSet>, CombineError> {
    check_lengths(input_count, importers)?;

    let mut sets = Vec::with_capacity(input_count);
    for index in 0..input_count {
        let mut set = InputSignatureSet::new();

        for importer in importers.values() {
            let key_hex = &importer.public_keys[index];
            let public_key = PublicKey::from_str(key_hex.trim()).map_err(|e| {
                CombineError::InvalidSignature {
                    input: index,
                    public_key: key_hex.clone(),
                    reason: format!("invalid public key: {}", e),
                }
            })?;
            let signature = parse_signature(index, &public_key, &importer.signatures[index])?;

            match set.entry(public_key) {
                Entry::Vacant(slot) => {
                    slot.insert(signature);
                }
                Entry::Occupied(existing) if *existing.get() == signature => {}
                Entry::Occupied(_) => {
                    return Err(CombineError::InvalidSignature {
                        input: index,
                        public_key: public_key.to_string(),
                        reason: "conflicting signatures supplied for the same public key".to_string(),
                    });
                }
            }
        }

        sets.push(set);
    }

    Ok(sets)
}

fn parse_signature(
    index: usize,
    public_key: &PublicKey,
    signature_hex: &str,
) -> Result<EcdsaSignature, CombineError> {
    let invalid = |reason: String| CombineError::InvalidSignature {
        input: index,
        public_key: public_key.to_string(),
        reason,
    };
    let bytes = hex::decode(signature_hex.trim()).map_err(|e| invalid(format!("invalid hex: {}", e)))?;
    EcdsaSignature::from_slice(&bytes).map_err(|e| invalid(format!("invalid DER signature: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::multisig::AddressType;
    use crate::fixtures;

    fn two_signer_session(
        address_type: AddressType,
        input_count: u8,
    ) -> (UnsignedTransaction, Vec<Input>, SignatureImporters) {
        let inputs: Vec<Input> = (1..=input_count)
            .map(|n| fixtures::input(n, address_type))
            .collect();
        let unsigned = fixtures::unsigned_transaction(&inputs);
        let mut importers = SignatureImporters::new();
        importers.insert("1".to_string(), fixtures::importer(1, &unsigned, &inputs));
        importers.insert("2".to_string(), fixtures::importer(2, &unsigned, &inputs));
        (unsigned, inputs, importers)
    }

    #[test]
    fn test_two_of_three_single_input() {
        let (unsigned, inputs, importers) = two_signer_session(AddressType::P2wsh, 1);

        let signed = combine(&unsigned, &inputs, &importers).unwrap();
        assert_eq!(signed.input.len(), 1);
        assert_eq!(signed.input[0].witness.len(), 4);
        assert_eq!(signed.compute_txid(), unsigned.as_transaction().compute_txid());
    }

    #[test]
    fn test_combine_is_deterministic() {
        let (unsigned, inputs, importers) = two_signer_session(AddressType::P2shP2wsh, 3);

        let first = combine_hex(&unsigned, &inputs, &importers).unwrap();
        let second = combine_hex(&unsigned, &inputs, &importers).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_signature_is_incomplete() {
        let (unsigned, inputs, mut importers) = two_signer_session(AddressType::P2wsh, 1);
        importers.remove("2");

        let err = combine(&unsigned, &inputs, &importers).unwrap_err();
        assert_eq!(
            err,
            CombineError::IncompleteSignature {
                input: 0,
                required: 2,
                valid: 1
            }
        );
    }

    #[test]
    fn test_mismatched_lengths() {
        let (unsigned, inputs, mut importers) = two_signer_session(AddressType::P2sh, 2);
        importers.get_mut("2").unwrap().signatures.pop();

        let err = combine(&unsigned, &inputs, &importers).unwrap_err();
        assert_eq!(
            err,
            CombineError::MismatchedLength {
                signer: "2".to_string(),
                public_keys: 2,
                signatures: 1,
                inputs: 2
            }
        );
    }

    #[test]
    fn test_no_inputs() {
        let (unsigned, _, importers) = two_signer_session(AddressType::P2wsh, 1);
        assert_eq!(combine(&unsigned, &[], &importers).unwrap_err(), CombineError::NoInputs);
    }

    #[test]
    fn test_duplicate_key_same_signature_accepted() {
        let (unsigned, inputs, mut importers) = two_signer_session(AddressType::P2wsh, 1);
        let copy = importers["1"].clone();
        importers.insert("1-again".to_string(), copy);

        assert!(combine(&unsigned, &inputs, &importers).is_ok());
    }

    #[test]
    fn test_duplicate_key_conflicting_signature_rejected() {
        let (unsigned, inputs, mut importers) = two_signer_session(AddressType::P2wsh, 1);
        // Same key as signer 1 but a signature over a different transaction
        let other_inputs = vec![fixtures::input(9, AddressType::P2wsh)];
        let other_unsigned = fixtures::unsigned_transaction(&other_inputs);
        importers.insert(
            "imposter".to_string(),
            fixtures::importer(1, &other_unsigned, &other_inputs),
        );

        let err = combine(&unsigned, &inputs, &importers).unwrap_err();
        match err {
            CombineError::InvalidSignature { input, reason, .. } => {
                assert_eq!(input, 0);
                assert!(reason.contains("conflicting"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_hex_is_invalid_signature() {
        let (unsigned, inputs, mut importers) = two_signer_session(AddressType::P2wsh, 1);
        importers.get_mut("2").unwrap().signatures[0] = "3044zz".to_string();

        let err = combine(&unsigned, &inputs, &importers).unwrap_err();
        assert!(matches!(err, CombineError::InvalidSignature { input: 0, .. }));

        importers.get_mut("2").unwrap().public_keys[0] = "02abcd".to_string();
        let err = combine(&unsigned, &inputs, &importers).unwrap_err();
        assert!(matches!(err, CombineError::InvalidSignature { input: 0, .. }));
    }

    #[test]
    fn test_sets_group_by_input() {
        let (_, inputs, importers) = two_signer_session(AddressType::P2wsh, 2);
        let sets = input_signature_sets(inputs.len(), &importers).unwrap();

        assert_eq!(sets.len(), 2);
        for set in &sets {
            assert_eq!(set.len(), 2);
            assert!(set.contains_key(&fixtures::public_key(1)));
            assert!(set.contains_key(&fixtures::public_key(2)));
        }
        assert_ne!(sets[0], sets[1]);
    }
}
