//! Multisig Transaction Assembly
//!
//! Turns an unsigned transaction template plus validated per-input signature
//! sets into a fully signed transaction:
//! - sighash computation (legacy for P2SH, BIP143 for P2WSH and P2SH-P2WSH)
//! - ECDSA verification of every supplied signature
//! - threshold check and script-order sorting
//! - scriptSig / witness construction

use crate::btc::multisig::{AddressType, MultisigScript};
use crate::error::CombineError;
use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::OP_0;
use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::secp256k1::{Message, Secp256k1, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, OutPoint, PublicKey, Transaction, TxIn, Txid, Witness};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Signatures collected for one input, keyed by the signing public key.
pub type InputSignatureSet = BTreeMap<PublicKey, EcdsaSignature>;

// ============================================================================
// Data Types
// ============================================================================

/// The spend policy of one input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MultisigSpend {
    pub address_type: AddressType,
    /// Redeem script (P2SH) or witness script (P2WSH, P2SH-P2WSH), hex in JSON.
    pub script: ScriptBuf,
}

/// One previous output being spent, aligned by position with the
/// unsigned transaction's inputs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub txid: Txid,
    pub index: u32,
    pub amount_sats: u64,
    pub multisig: MultisigSpend,
}

impl Input {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.index)
    }
}

/// Immutable transaction template awaiting signatures.
///
/// Serialised as consensus hex.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct UnsignedTransaction(Transaction);

impl UnsignedTransaction {
    pub fn new(tx: Transaction) -> Self {
        Self(tx)
    }

    pub fn from_hex(raw_tx_hex: &str) -> Result<Self, String> {
        decode_transaction(raw_tx_hex).map(Self)
    }

    pub fn as_transaction(&self) -> &Transaction {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        bitcoin::consensus::encode::serialize_hex(&self.0)
    }
}

impl TryFrom<String> for UnsignedTransaction {
    type Error = String;

    fn try_from(raw_tx_hex: String) -> Result<Self, Self::Error> {
        Self::from_hex(&raw_tx_hex)
    }
}

impl From<UnsignedTransaction> for String {
    fn from(tx: UnsignedTransaction) -> Self {
        tx.to_hex()
    }
}

/// Decode a consensus-serialised transaction from hex.
pub fn decode_transaction(raw_tx_hex: &str) -> Result<Transaction, String> {
    let trimmed = raw_tx_hex.trim();
    if trimmed.is_empty() {
        return Err("empty transaction hex".to_string());
    }
    let bytes = hex::decode(trimmed).map_err(|e| format!("invalid hex: {}", e))?;
    bitcoin::consensus::deserialize(&bytes).map_err(|e| format!("invalid transaction: {}", e))
}

// ============================================================================
// Assembly
// ============================================================================

/// Validate the signature sets against each input's multisig script and
/// build the signed transaction.
///
/// `signature_sets[i]` belongs to `inputs[i]`, which must spend the same
/// outpoint as input `i` of the template. The template is left untouched.
pub fn signed_multisig_transaction(
    unsigned: &UnsignedTransaction,
    inputs: &[Input],
    signature_sets: &[InputSignatureSet],
) -> Result<Transaction, CombineError> {
    let template = unsigned.as_transaction();

    if inputs.is_empty() || template.input.is_empty() {
        return Err(CombineError::NoInputs);
    }
    if template.input.len() != inputs.len() {
        return Err(CombineError::InputMismatch {
            input: inputs.len().min(template.input.len()),
            reason: format!(
                "transaction has {} inputs but {} were described",
                template.input.len(),
                inputs.len()
            ),
        });
    }
    if signature_sets.len() != inputs.len() {
        return Err(CombineError::InputMismatch {
            input: signature_sets.len().min(inputs.len()),
            reason: format!(
                "{} signature sets for {} inputs",
                signature_sets.len(),
                inputs.len()
            ),
        });
    }

    let secp = Secp256k1::verification_only();
    let mut cache = SighashCache::new(template);
    let mut signed = template.clone();

    for (index, (input, set)) in inputs.iter().zip(signature_sets).enumerate() {
        let spent = template.input[index].previous_output;
        if spent != input.outpoint() {
            return Err(CombineError::InputMismatch {
                input: index,
                reason: format!("transaction spends {} but input describes {}", spent, input.outpoint()),
            });
        }

        let multisig = MultisigScript::parse(&input.multisig.script)
            .map_err(|reason| CombineError::InvalidScript { input: index, reason })?;

        let mut valid: Vec<(usize, EcdsaSignature)> = Vec::with_capacity(set.len());
        for (public_key, signature) in set {
            let position = multisig.position(public_key).ok_or_else(|| {
                invalid_signature(index, public_key, "public key is not part of the multisig script")
            })?;

            let message = input_sighash(&mut cache, index, input, &multisig, signature.sighash_type)?;
            verify(&secp, &message, public_key, signature).map_err(|reason| {
                invalid_signature(index, public_key, reason)
            })?;

            valid.push((position, *signature));
        }

        debug!(
            input = index,
            valid = valid.len(),
            required = multisig.required(),
            keys = multisig.public_keys().len(),
            "validated input signatures"
        );

        if valid.len() < multisig.required() {
            return Err(CombineError::IncompleteSignature {
                input: index,
                required: multisig.required(),
                valid: valid.len(),
            });
        }

        // CHECKMULTISIG walks keys and signatures in the same order
        valid.sort_by_key(|(position, _)| *position);
        let signatures: Vec<EcdsaSignature> = valid
            .into_iter()
            .take(multisig.required())
            .map(|(_, signature)| signature)
            .collect();

        apply_spend(&mut signed.input[index], index, input.multisig.address_type, &multisig, &signatures)?;
    }

    Ok(signed)
}

/// Sighash message a signature over `input` must commit to.
pub fn input_sighash(
    cache: &mut SighashCache<&Transaction>,
    index: usize,
    input: &Input,
    multisig: &MultisigScript,
    sighash_type: EcdsaSighashType,
) -> Result<Message, CombineError> {
    let digest = if input.multisig.address_type.is_segwit() {
        cache
            .p2wsh_signature_hash(
                index,
                multisig.script(),
                Amount::from_sat(input.amount_sats),
                sighash_type,
            )
            .map(|hash| hash.to_byte_array())
            .map_err(|e| e.to_string())
    } else {
        cache
            .legacy_signature_hash(index, multisig.script(), sighash_type.to_u32())
            .map(|hash| hash.to_byte_array())
            .map_err(|e| e.to_string())
    }
    .map_err(|reason| CombineError::InputMismatch { input: index, reason })?;

    Ok(Message::from_digest(digest))
}

fn verify<C: Verification>(
    secp: &Secp256k1<C>,
    message: &Message,
    public_key: &PublicKey,
    signature: &EcdsaSignature,
) -> Result<(), String> {
    secp.verify_ecdsa(message, &signature.signature, &public_key.inner)
        .map_err(|e| format!("signature does not verify: {}", e))
}

fn invalid_signature(index: usize, public_key: &PublicKey, reason: impl Into<String>) -> CombineError {
    CombineError::InvalidSignature {
        input: index,
        public_key: public_key.to_string(),
        reason: reason.into(),
    }
}

fn push_bytes(index: usize, bytes: Vec<u8>) -> Result<PushBytesBuf, CombineError> {
    PushBytesBuf::try_from(bytes).map_err(|e| CombineError::InvalidScript {
        input: index,
        reason: format!("push too large: {}", e),
    })
}

fn multisig_witness(multisig: &MultisigScript, signatures: &[EcdsaSignature]) -> Witness {
    let mut witness = Witness::new();
    // CHECKMULTISIG pops one extra stack element
    witness.push(Vec::<u8>::new());
    for signature in signatures {
        witness.push(signature.to_vec());
    }
    witness.push(multisig.script().as_bytes());
    witness
}

fn apply_spend(
    txin: &mut TxIn,
    index: usize,
    address_type: AddressType,
    multisig: &MultisigScript,
    signatures: &[EcdsaSignature],
) -> Result<(), CombineError> {
    match address_type {
        AddressType::P2sh => {
            let mut builder = Builder::new().push_opcode(OP_0);
            for signature in signatures {
                builder = builder.push_slice(push_bytes(index, signature.to_vec())?);
            }
            builder = builder.push_slice(push_bytes(index, multisig.script().to_bytes())?);
            txin.script_sig = builder.into_script();
            txin.witness = Witness::new();
        }
        AddressType::P2shP2wsh => {
            let redeem = push_bytes(index, multisig.witness_program().into_bytes())?;
            txin.script_sig = Builder::new().push_slice(redeem).into_script();
            txin.witness = multisig_witness(multisig, signatures);
        }
        AddressType::P2wsh => {
            txin.script_sig = ScriptBuf::new();
            txin.witness = multisig_witness(multisig, signatures);
        }
    }
    Ok(())
}
