//! Deterministic keys, scripts and signatures shared by unit tests.

use crate::btc::multisig::{AddressType, MultisigScript};
use crate::btc::transaction::{Input, MultisigSpend, UnsignedTransaction};
use crate::protocol::combine::SignatureImporter;
use bitcoin::absolute::LockTime;
use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, OutPoint, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use std::collections::BTreeMap;

pub fn secret_key(seed: u8) -> SecretKey {
    SecretKey::from_slice(&[seed; 32]).unwrap()
}

pub fn public_key(seed: u8) -> PublicKey {
    let secp = Secp256k1::new();
    PublicKey::new(bitcoin::secp256k1::PublicKey::from_secret_key(
        &secp,
        &secret_key(seed),
    ))
}

/// 2-of-3 over keys 1, 2, 3 in that order.
pub fn two_of_three() -> MultisigScript {
    MultisigScript::new(2, vec![public_key(1), public_key(2), public_key(3)]).unwrap()
}

pub fn input(n: u8, address_type: AddressType) -> Input {
    Input {
        txid: Txid::from_byte_array([n; 32]),
        index: u32::from(n % 4),
        amount_sats: 100_000 * u64::from(n),
        multisig: MultisigSpend {
            address_type,
            script: two_of_three().script().to_owned(),
        },
    }
}

pub fn unsigned_transaction(inputs: &[Input]) -> UnsignedTransaction {
    let total: u64 = inputs.iter().map(|i| i.amount_sats).sum();
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|i| TxIn {
                previous_output: i.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(total - 1_000),
            script_pubkey: two_of_three().script_pubkey(AddressType::P2wsh),
        }],
    };
    UnsignedTransaction::new(tx)
}

/// SIGHASH_ALL signature by key `seed` over input `index`.
pub fn sign_input(
    unsigned: &UnsignedTransaction,
    inputs: &[Input],
    index: usize,
    seed: u8,
) -> EcdsaSignature {
    sign_input_with(unsigned, inputs, index, seed, EcdsaSighashType::All)
}

pub fn sign_input_with(
    unsigned: &UnsignedTransaction,
    inputs: &[Input],
    index: usize,
    seed: u8,
    sighash_type: EcdsaSighashType,
) -> EcdsaSignature {
    let input = &inputs[index];
    let mut cache = SighashCache::new(unsigned.as_transaction());
    let digest = match input.multisig.address_type {
        AddressType::P2sh => cache
            .legacy_signature_hash(index, &input.multisig.script, sighash_type.to_u32())
            .unwrap()
            .to_byte_array(),
        AddressType::P2shP2wsh | AddressType::P2wsh => cache
            .p2wsh_signature_hash(
                index,
                &input.multisig.script,
                Amount::from_sat(input.amount_sats),
                sighash_type,
            )
            .unwrap()
            .to_byte_array(),
    };
    let secp = Secp256k1::new();
    let signature = secp.sign_ecdsa(&Message::from_digest(digest), &secret_key(seed));
    EcdsaSignature {
        signature,
        sighash_type,
    }
}

/// The outputs `inputs` spend, as the script interpreter sees them.
pub fn prevouts(inputs: &[Input]) -> BTreeMap<OutPoint, TxOut> {
    inputs
        .iter()
        .map(|input| {
            let multisig = MultisigScript::parse(&input.multisig.script).unwrap();
            let prevout = TxOut {
                value: Amount::from_sat(input.amount_sats),
                script_pubkey: multisig.script_pubkey(input.multisig.address_type),
            };
            (input.outpoint(), prevout)
        })
        .collect()
}

/// A signer who signed every input with key `seed`.
pub fn importer(seed: u8, unsigned: &UnsignedTransaction, inputs: &[Input]) -> SignatureImporter {
    SignatureImporter {
        public_keys: (0..inputs.len()).map(|_| public_key(seed).to_string()).collect(),
        signatures: (0..inputs.len())
            .map(|i| hex::encode(sign_input(unsigned, inputs, i, seed).to_vec()))
            .collect(),
    }
}
