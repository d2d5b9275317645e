//! Block structure for the ledger
//!
//! Blocks are created once by mining, never mutated, and persisted through
//! their bincode encoding.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::consensus::pow::{PowError, ProofOfWork};
use crate::crypto::{compute_merkle_root, Hash, MerkleTree};
use crate::validation::Transaction;

/// Block construction and encoding errors
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("A block must carry at least one transaction")]
    EmptyTransactions,
    #[error("Genesis block must carry exactly one coinbase transaction")]
    InvalidGenesis,
    #[error("Proof of work failed: {0}")]
    Pow(#[from] PowError),
    #[error("Block encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// A mined block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block timestamp (seconds since Unix epoch)
    pub timestamp: i64,
    /// Transactions, at least one
    pub transactions: Vec<Transaction>,
    /// Hash of the previous block, `None` only for genesis
    pub prev_hash: Option<Hash>,
    /// Proof-of-work hash of the header
    pub hash: Hash,
    /// Nonce found by mining
    pub nonce: u64,
    /// Distance from genesis
    pub height: u64,
}

impl Block {
    /// Build and mine a block stamped with the current time
    pub fn new(
        transactions: Vec<Transaction>,
        prev_hash: Option<Hash>,
        height: u64,
    ) -> Result<Self, BlockError> {
        Self::with_timestamp(transactions, prev_hash, height, current_timestamp())
    }

    /// Build and mine a block with an explicit timestamp
    pub fn with_timestamp(
        transactions: Vec<Transaction>,
        prev_hash: Option<Hash>,
        height: u64,
        timestamp: i64,
    ) -> Result<Self, BlockError> {
        if transactions.is_empty() {
            return Err(BlockError::EmptyTransactions);
        }

        let mut block = Self {
            timestamp,
            transactions,
            prev_hash,
            hash: Hash::zero(),
            nonce: 0,
            height,
        };

        let (nonce, hash) = ProofOfWork::new(&block).run()?;
        block.nonce = nonce;
        block.hash = hash;

        Ok(block)
    }

    /// Build and mine the genesis block around a coinbase transaction
    pub fn genesis(coinbase: Transaction) -> Result<Self, BlockError> {
        if !coinbase.is_coinbase() {
            return Err(BlockError::InvalidGenesis);
        }
        Self::new(vec![coinbase], None, 0)
    }

    /// Merkle root over the serialized transactions
    pub fn hash_transactions(&self) -> Hash {
        compute_merkle_root(&self.serialized_transactions())
    }

    /// Full Merkle tree, for inclusion proofs
    pub fn merkle_tree(&self) -> Option<MerkleTree> {
        MerkleTree::new(&self.serialized_transactions())
    }

    fn serialized_transactions(&self) -> Vec<Vec<u8>> {
        self.transactions.iter().map(|tx| tx.serialize()).collect()
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }

    /// Encode for storage
    pub fn serialize(&self) -> Result<Vec<u8>, BlockError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from storage
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlockError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
