//! Block admission checks
//!
//! Pure functions; nothing here touches the store.

use thiserror::Error;

use crate::consensus::{Block, ProofOfWork};
use crate::crypto::Hash;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Block carries no transactions")]
    EmptyBlock,
    #[error("Block at height {height} has inconsistent genesis linkage")]
    InvalidGenesisLinkage { height: u64 },
    #[error("Stored hash {stored} does not match header hash {computed}")]
    HashMismatch { stored: Hash, computed: Hash },
    #[error("Invalid proof of work")]
    InvalidPoW,
}

/// Validate proof of work against the block's recorded nonce
pub fn validate_pow(block: &Block) -> Result<(), ValidationError> {
    if !ProofOfWork::new(block).validate() {
        return Err(ValidationError::InvalidPoW);
    }
    Ok(())
}

/// Validate a block before it is admitted to the store
pub fn validate_block(block: &Block) -> Result<(), ValidationError> {
    if block.transactions.is_empty() {
        return Err(ValidationError::EmptyBlock);
    }

    // Genesis and only genesis has no parent
    if block.prev_hash.is_none() != (block.height == 0) {
        return Err(ValidationError::InvalidGenesisLinkage {
            height: block.height,
        });
    }

    let pow = ProofOfWork::new(block);
    let computed = pow.hash_with_nonce(block.nonce);
    if computed != block.hash {
        return Err(ValidationError::HashMismatch {
            stored: block.hash,
            computed,
        });
    }

    validate_pow(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Transaction;

    fn mined(tag: &str) -> Block {
        Block::genesis(Transaction::coinbase([4u8; 20], tag)).unwrap()
    }

    #[test]
    fn test_mined_block_is_valid() {
        assert!(validate_block(&mined("ok")).is_ok());
    }

    #[test]
    fn test_forged_hash_rejected() {
        let mut block = mined("forged");
        block.hash = Hash::zero();
        assert!(matches!(
            validate_block(&block),
            Err(ValidationError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_tampered_transactions_rejected() {
        let mut block = mined("tamper");
        block.transactions[0].outputs[0].value = 1_000_000;
        assert!(validate_block(&block).is_err());
    }

    #[test]
    fn test_genesis_linkage() {
        let mut block = mined("linkage");
        block.height = 3;
        assert!(matches!(
            validate_block(&block),
            Err(ValidationError::InvalidGenesisLinkage { height: 3 })
        ));
    }

    #[test]
    fn test_empty_block_rejected() {
        let mut block = mined("empty");
        block.transactions.clear();
        assert!(matches!(validate_block(&block), Err(ValidationError::EmptyBlock)));
    }
}
