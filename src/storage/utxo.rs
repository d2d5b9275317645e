//! UTXO set derivation
//!
//! The set is never persisted; it is rebuilt by walking the chain from tip
//! to genesis.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::consensus::Block;
use crate::constants::PUBKEY_HASH_LEN;
use crate::validation::TxOutput;

/// An output not yet referenced by any input in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Position of the output in its transaction
    pub index: usize,
    /// The output itself
    pub output: TxOutput,
}

/// Unspent outputs keyed by hex-encoded transaction id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UTXOSet {
    utxos: HashMap<String, Vec<UnspentOutput>>,
}

impl UTXOSet {
    /// Create a new empty UTXO set
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the set from blocks ordered tip first
    ///
    /// Every output seen in the scan is collected, then every output named by
    /// a non-coinbase input anywhere in the scan is dropped. The result does
    /// not depend on the order of transactions inside a block.
    pub fn derive<I, E>(blocks: I) -> Result<Self, E>
    where
        I: IntoIterator<Item = Result<Block, E>>,
    {
        let mut set = Self::new();
        let mut spent: HashMap<String, HashSet<i64>> = HashMap::new();
        let mut block_count = 0usize;

        for block in blocks {
            let block = block?;
            block_count += 1;

            for tx in &block.transactions {
                let txid = tx.id.to_hex();
                for (index, output) in tx.outputs.iter().enumerate() {
                    set.add(
                        txid.clone(),
                        UnspentOutput {
                            index,
                            output: output.clone(),
                        },
                    );
                }

                if !tx.is_coinbase() {
                    for input in &tx.inputs {
                        if let Some(prev) = input.txid {
                            spent.entry(prev.to_hex()).or_default().insert(input.vout);
                        }
                    }
                }
            }
        }

        set.utxos.retain(|txid, outs| {
            if let Some(indices) = spent.get(txid) {
                outs.retain(|u| !indices.contains(&(u.index as i64)));
            }
            !outs.is_empty()
        });

        debug!(blocks = block_count, transactions = set.tx_count(), outputs = set.len(), "derived utxo set");
        Ok(set)
    }

    /// Add an unspent output of `txid`
    pub fn add(&mut self, txid: String, utxo: UnspentOutput) {
        self.utxos.entry(txid).or_default().push(utxo);
    }

    /// Unspent outputs of `txid`
    pub fn get(&self, txid: &str) -> Option<&[UnspentOutput]> {
        self.utxos.get(txid).map(Vec::as_slice)
    }

    /// Check if output `index` of `txid` is unspent
    pub fn contains(&self, txid: &str, index: usize) -> bool {
        self.get(txid)
            .map(|outs| outs.iter().any(|u| u.index == index))
            .unwrap_or(false)
    }

    /// Iterate over `(txid, outputs)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<UnspentOutput>)> {
        self.utxos.iter()
    }

    /// Get all UTXOs locked to a public key hash
    pub fn find_by_pubkey_hash(&self, pubkey_hash: &[u8; PUBKEY_HASH_LEN]) -> Vec<(&str, &UnspentOutput)> {
        self.iter()
            .flat_map(|(txid, outs)| outs.iter().map(move |u| (txid.as_str(), u)))
            .filter(|(_, u)| u.output.is_locked_with_key(pubkey_hash))
            .collect()
    }

    /// Get total balance for a public key hash
    pub fn balance(&self, pubkey_hash: &[u8; PUBKEY_HASH_LEN]) -> u64 {
        self.find_by_pubkey_hash(pubkey_hash)
            .iter()
            .fold(0u64, |total, (_, u)| total.saturating_add(u.output.value))
    }

    /// Collect outputs of `pubkey_hash` until `amount` is covered
    ///
    /// Returns the accumulated value, which is below `amount` when funds are
    /// insufficient, and the chosen output indices per txid. Transactions are
    /// visited in txid order so the choice is deterministic.
    pub fn find_spendable_outputs(
        &self,
        pubkey_hash: &[u8; PUBKEY_HASH_LEN],
        amount: u64,
    ) -> (u64, BTreeMap<String, Vec<usize>>) {
        let mut accumulated = 0u64;
        let mut chosen: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        let ordered: BTreeMap<&String, &Vec<UnspentOutput>> = self.utxos.iter().collect();
        'outer: for (txid, outs) in ordered {
            for utxo in outs {
                if accumulated >= amount {
                    break 'outer;
                }
                if utxo.output.is_locked_with_key(pubkey_hash) {
                    accumulated = accumulated.saturating_add(utxo.output.value);
                    chosen.entry(txid.clone()).or_default().push(utxo.index);
                }
            }
        }

        (accumulated, chosen)
    }

    /// Get total number of unspent outputs
    pub fn len(&self) -> usize {
        self.utxos.values().map(Vec::len).sum()
    }

    /// Number of transactions with at least one unspent output
    pub fn tx_count(&self) -> usize {
        self.utxos.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}
