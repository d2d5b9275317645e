//! Transaction structure and validation
//!
//! UTXO-based transactions with Schnorr signatures. Each input is signed over
//! a trimmed copy of the transaction in which only that input carries the
//! public key hash of the output it spends.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::constants::{PUBKEY_HASH_LEN, SUBSIDY};
use crate::crypto::{hash_bytes, hash_pub_key, verify_raw, Hash, PrivateKey};
use crate::wallet::{address_to_pubkey_hash, WalletError};

/// Output index carried by a coinbase input
pub const COINBASE_VOUT: i64 = -1;

/// Transaction errors
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Referenced transaction {0} is not known")]
    MissingPrevious(String),
    #[error("Input does not reference a transaction")]
    MissingReference,
    #[error("Output {vout} does not exist in transaction {txid}")]
    OutputIndexOutOfRange { txid: String, vout: i64 },
}

/// A transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the transaction containing the output, `None` for coinbase
    pub txid: Option<Hash>,
    /// Index of the output in that transaction, -1 for coinbase
    pub vout: i64,
    /// Signature proving ownership
    pub signature: Vec<u8>,
    /// Raw public key of the spender (arbitrary data for coinbase)
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// Unsigned input spending `txid:vout` with `pub_key`
    pub fn new(txid: Hash, vout: i64, pub_key: Vec<u8>) -> Self {
        Self {
            txid: Some(txid),
            vout,
            signature: Vec::new(),
            pub_key,
        }
    }

    /// Check whether this input was created by the owner of `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &[u8; PUBKEY_HASH_LEN]) -> bool {
        hash_pub_key(&self.pub_key) == *pub_key_hash
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in base units
    pub value: u64,
    /// Public key hash of the recipient
    pub pub_key_hash: [u8; PUBKEY_HASH_LEN],
}

impl TxOutput {
    /// Output locked to a public key hash
    pub fn new(value: u64, pub_key_hash: [u8; PUBKEY_HASH_LEN]) -> Self {
        Self { value, pub_key_hash }
    }

    /// Output locked to an encoded address
    pub fn to_address(value: u64, address: &str) -> Result<Self, WalletError> {
        let pub_key_hash = address_to_pubkey_hash(address)?;
        Ok(Self::new(value, pub_key_hash))
    }

    /// Check if the output can be unlocked by the owner of `pub_key_hash`
    pub fn is_locked_with_key(&self, pub_key_hash: &[u8; PUBKEY_HASH_LEN]) -> bool {
        self.pub_key_hash == *pub_key_hash
    }
}

/// A complete transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hash of the transaction with this field excluded
    pub id: Hash,
    /// Transaction inputs
    pub inputs: Vec<TxInput>,
    /// Transaction outputs
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a new transaction, computing its id
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash::zero(),
            inputs,
            outputs,
        };
        tx.id = tx.hash();
        tx
    }

    /// Create a coinbase transaction paying `SUBSIDY` to `to`
    ///
    /// Empty `data` is replaced by random bytes so that two coinbases paying
    /// the same key never share an id.
    pub fn coinbase(to: [u8; PUBKEY_HASH_LEN], data: &str) -> Self {
        let data = if data.is_empty() {
            let mut random = [0u8; 20];
            rand::thread_rng().fill_bytes(&mut random);
            random.to_vec()
        } else {
            data.as_bytes().to_vec()
        };

        let input = TxInput {
            txid: None,
            vout: COINBASE_VOUT,
            signature: Vec::new(),
            pub_key: data,
        };

        Self::new(vec![input], vec![TxOutput::new(SUBSIDY, to)])
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].txid.is_none()
            && self.inputs[0].vout == COINBASE_VOUT
    }

    /// Calculate transaction hash (everything but the id)
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.encode(false))
    }

    /// Canonical bytes including the id, used as the Merkle leaf
    pub fn serialize(&self) -> Vec<u8> {
        self.encode(true)
    }

    /// Length-prefixed, big-endian, fixed field order
    fn encode(&self, with_id: bool) -> Vec<u8> {
        let mut bytes = Vec::new();

        if with_id {
            bytes.extend_from_slice(&self.id.0);
        }

        bytes.extend_from_slice(&(self.inputs.len() as u32).to_be_bytes());
        for input in &self.inputs {
            match &input.txid {
                Some(txid) => {
                    bytes.push(1);
                    bytes.extend_from_slice(&txid.0);
                }
                None => bytes.push(0),
            }
            bytes.extend_from_slice(&input.vout.to_be_bytes());
            bytes.extend_from_slice(&(input.signature.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&input.signature);
            bytes.extend_from_slice(&(input.pub_key.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&input.pub_key);
        }

        bytes.extend_from_slice(&(self.outputs.len() as u32).to_be_bytes());
        for output in &self.outputs {
            bytes.extend_from_slice(&output.value.to_be_bytes());
            bytes.extend_from_slice(&output.pub_key_hash);
        }

        bytes
    }

    /// Copy with every input's signature and public key stripped
    pub fn trimmed_copy(&self) -> Self {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                txid: input.txid,
                vout: input.vout,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        Self {
            id: self.id,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// Digest signed by input `index`: the trimmed copy with that input
    /// carrying the public key hash of the output it spends
    fn signing_hash(trimmed: &mut Transaction, index: usize, locking: &[u8; PUBKEY_HASH_LEN]) -> Hash {
        trimmed.inputs[index].pub_key = locking.to_vec();
        let digest = trimmed.hash();
        trimmed.inputs[index].pub_key = Vec::new();
        digest
    }

    /// Resolve the output spent by `input` among `prev_txs` (keyed by hex id)
    fn referenced_output<'a>(
        input: &TxInput,
        prev_txs: &'a HashMap<String, Transaction>,
    ) -> Result<&'a TxOutput, TransactionError> {
        let txid = input.txid.ok_or(TransactionError::MissingReference)?.to_hex();
        let prev = prev_txs
            .get(&txid)
            .ok_or_else(|| TransactionError::MissingPrevious(txid.clone()))?;

        usize::try_from(input.vout)
            .ok()
            .and_then(|vout| prev.outputs.get(vout))
            .ok_or(TransactionError::OutputIndexOutOfRange {
                txid,
                vout: input.vout,
            })
    }

    /// Sign every input with `key`, then refresh the id
    pub fn sign(
        &mut self,
        key: &PrivateKey,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut trimmed = self.trimmed_copy();

        for index in 0..self.inputs.len() {
            let locking = Self::referenced_output(&self.inputs[index], prev_txs)?.pub_key_hash;
            let digest = Self::signing_hash(&mut trimmed, index, &locking);
            self.inputs[index].signature = key.sign(&digest).to_bytes().to_vec();
        }

        self.id = self.hash();
        Ok(())
    }

    /// Verify all input signatures against the outputs they spend
    ///
    /// An unknown referenced transaction is an error; a bad key, bad
    /// signature or missing output index makes the transaction invalid.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> Result<bool, TransactionError> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut trimmed = self.trimmed_copy();

        for (index, input) in self.inputs.iter().enumerate() {
            let locking = match Self::referenced_output(input, prev_txs) {
                Ok(output) => output.pub_key_hash,
                Err(TransactionError::OutputIndexOutOfRange { .. }) => return Ok(false),
                Err(e) => return Err(e),
            };

            // Public key must match the output it spends
            if !input.uses_key(&locking) {
                return Ok(false);
            }

            let digest = Self::signing_hash(&mut trimmed, index, &locking);
            if !verify_raw(&input.pub_key, &digest, &input.signature) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Calculate total output value
    pub fn total_output_value(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |total, o| total.saturating_add(o.value))
    }
}
