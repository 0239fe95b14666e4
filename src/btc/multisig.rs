//! Multisig Script Model
//!
//! Bare m-of-n scripts of the form
//! `OP_m <pubkey_1> ... <pubkey_n> OP_n OP_CHECKMULTISIG`, used as the redeem
//! script (P2SH) or witness script (P2WSH, P2SH-P2WSH) of a multisig input.

use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::opcodes::Opcode;
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::{PublicKey, WScriptHash};
use serde::{Deserialize, Serialize};

/// Highest key count CHECKMULTISIG accepts in a standard script.
pub const MAX_MULTISIG_KEYS: usize = 16;

/// How the multisig script is committed to in the spent output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    #[serde(rename = "P2SH")]
    P2sh,
    #[serde(rename = "P2SH-P2WSH")]
    P2shP2wsh,
    #[serde(rename = "P2WSH")]
    P2wsh,
}

impl AddressType {
    /// Segwit inputs sign with BIP143 and carry their signatures in the witness.
    pub fn is_segwit(&self) -> bool {
        !matches!(self, AddressType::P2sh)
    }
}

/// A parsed m-of-n CHECKMULTISIG script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigScript {
    required: usize,
    public_keys: Vec<PublicKey>,
    script: ScriptBuf,
}

impl MultisigScript {
    /// Build the script for `required` of `public_keys`, keeping the key order given.
    pub fn new(required: usize, public_keys: Vec<PublicKey>) -> Result<Self, String> {
        check_threshold(required, public_keys.len())?;

        let mut builder = Builder::new().push_int(required as i64);
        for key in &public_keys {
            builder = builder.push_key(key);
        }
        let script = builder
            .push_int(public_keys.len() as i64)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();

        Ok(Self {
            required,
            public_keys,
            script,
        })
    }

    /// Parse an existing redeem or witness script.
    pub fn parse(script: &Script) -> Result<Self, String> {
        let mut instructions = script.instructions();

        let required = match instructions.next() {
            Some(Ok(Instruction::Op(op))) => {
                decode_pushnum(op).ok_or("script does not start with OP_m")?
            }
            _ => return Err("script does not start with OP_m".to_string()),
        };

        let mut public_keys = Vec::new();
        let total = loop {
            match instructions.next() {
                Some(Ok(Instruction::PushBytes(bytes))) => {
                    let key = PublicKey::from_slice(bytes.as_bytes())
                        .map_err(|e| format!("key {} is not a public key: {}", public_keys.len(), e))?;
                    public_keys.push(key);
                }
                Some(Ok(Instruction::Op(op))) => {
                    break decode_pushnum(op).ok_or("expected OP_n after the public keys")?;
                }
                Some(Err(e)) => return Err(format!("unparseable script: {}", e)),
                None => return Err("script ends before OP_n".to_string()),
            }
        };

        match instructions.next() {
            Some(Ok(Instruction::Op(op))) if op == OP_CHECKMULTISIG => {}
            _ => return Err("expected OP_CHECKMULTISIG after OP_n".to_string()),
        }
        if instructions.next().is_some() {
            return Err("trailing data after OP_CHECKMULTISIG".to_string());
        }

        if total != public_keys.len() {
            return Err(format!(
                "OP_n says {} keys but script holds {}",
                total,
                public_keys.len()
            ));
        }
        check_threshold(required, total)?;

        Ok(Self {
            required,
            public_keys,
            script: script.to_owned(),
        })
    }

    /// Signatures needed to spend (m).
    pub fn required(&self) -> usize {
        self.required
    }

    /// Keys in script order.
    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Index of `key` in script order.
    pub fn position(&self, key: &PublicKey) -> Option<usize> {
        self.public_keys.iter().position(|k| k == key)
    }

    /// `OP_0 <sha256(script)>`, the redeem script of a P2SH-P2WSH output.
    pub fn witness_program(&self) -> ScriptBuf {
        let hash = WScriptHash::hash(self.script.as_bytes());
        ScriptBuf::new_p2wsh(&hash)
    }

    /// The scriptPubKey of an output locked to this script.
    pub fn script_pubkey(&self, address_type: AddressType) -> ScriptBuf {
        match address_type {
            AddressType::P2sh => ScriptBuf::new_p2sh(&self.script.script_hash()),
            AddressType::P2shP2wsh => {
                ScriptBuf::new_p2sh(&self.witness_program().script_hash())
            }
            AddressType::P2wsh => self.witness_program(),
        }
    }
}

fn decode_pushnum(op: Opcode) -> Option<usize> {
    let code = op.to_u8();
    let first = OP_PUSHNUM_1.to_u8();
    if (first..=OP_PUSHNUM_16.to_u8()).contains(&code) {
        Some((code - first + 1) as usize)
    } else {
        None
    }
}

fn check_threshold(required: usize, total: usize) -> Result<(), String> {
    if total == 0 || total > MAX_MULTISIG_KEYS {
        return Err(format!("{} keys is outside 1..={}", total, MAX_MULTISIG_KEYS));
    }
    if required == 0 || required > total {
        return Err(format!("threshold {} is outside 1..={}", required, total));
    }
    Ok(())
}
