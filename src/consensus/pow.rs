//! Proof-of-work engine
//!
//! A block header hash, read as a big-endian 256-bit integer, must be
//! strictly below `2^(256 - TARGET_BITS)`.

use thiserror::Error;
use tracing::{debug, trace};

use crate::consensus::Block;
use crate::constants::{MAX_NONCE, TARGET_BITS};
use crate::crypto::{hash_bytes, Hash};

/// Nonces between progress traces
const PROGRESS_INTERVAL: u64 = 100_000;

/// Proof-of-work errors
#[derive(Debug, Error)]
pub enum PowError {
    #[error("Nonce space exhausted after {0} attempts")]
    NonceExhausted(u64),
}

/// Big-endian target for `bits` of difficulty (`1 <= bits <= 255`)
pub fn target_for_bits(bits: u32) -> [u8; 32] {
    let shift = 256 - bits as usize;
    let mut target = [0u8; 32];
    target[31 - shift / 8] = 1 << (shift % 8);
    target
}

/// Compare hash to target (hash < target)
pub fn meets_target(hash: &Hash, target: &[u8; 32]) -> bool {
    // Lexicographic order on big-endian bytes is integer order
    hash.0 < *target
}

/// Proof-of-work over a candidate block
#[derive(Debug)]
pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: [u8; 32],
    merkle_root: Hash,
}

impl<'a> ProofOfWork<'a> {
    /// Prepare proof-of-work for `block` at the protocol difficulty
    pub fn new(block: &'a Block) -> Self {
        Self {
            block,
            target: target_for_bits(TARGET_BITS),
            merkle_root: block.hash_transactions(),
        }
    }

    /// The numeric target as big-endian bytes
    pub fn target(&self) -> &[u8; 32] {
        &self.target
    }

    /// Header preimage for `nonce`:
    /// `prev_hash || merkle_root || timestamp || target_bits || nonce`,
    /// integers as big-endian 8-byte values
    pub fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let prev = self.block.prev_hash.as_ref().map(|h| h.as_ref()).unwrap_or(&[]);

        let mut data = Vec::with_capacity(prev.len() + 32 + 24);
        data.extend_from_slice(prev);
        data.extend_from_slice(&self.merkle_root.0);
        data.extend_from_slice(&self.block.timestamp.to_be_bytes());
        data.extend_from_slice(&i64::from(TARGET_BITS).to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    /// Header hash for `nonce`
    pub fn hash_with_nonce(&self, nonce: u64) -> Hash {
        hash_bytes(&self.prepare_data(nonce))
    }

    /// Search nonces from zero upward for the first hash below target
    ///
    /// Runs to completion; exhausting the nonce space is an error.
    pub fn run(&self) -> Result<(u64, Hash), PowError> {
        for nonce in 0..MAX_NONCE {
            let hash = self.hash_with_nonce(nonce);

            if meets_target(&hash, &self.target) {
                debug!(nonce, %hash, height = self.block.height, "mined block");
                return Ok((nonce, hash));
            }

            if nonce % PROGRESS_INTERVAL == 0 {
                trace!(nonce, %hash, "mining");
            }
        }

        Err(PowError::NonceExhausted(MAX_NONCE))
    }

    /// Check the block's recorded nonce against the target
    pub fn validate(&self) -> bool {
        let hash = self.hash_with_nonce(self.block.nonce);
        meets_target(&hash, &self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Transaction;

    #[test]
    fn test_target_bits() {
        let target = target_for_bits(16);
        assert_eq!(target[0], 0x00);
        assert_eq!(target[1], 0x01);
        assert!(target[2..].iter().all(|b| *b == 0));

        let easy = target_for_bits(1);
        assert_eq!(easy[0], 0x80);

        let hard = target_for_bits(255);
        assert_eq!(hard[31], 0x02);
    }

    #[test]
    fn test_meets_target_is_strict() {
        let target = target_for_bits(16);
        assert!(!meets_target(&Hash(target), &target));

        let mut below = [0u8; 32];
        below[1] = 0x00;
        below[2] = 0xFF;
        assert!(meets_target(&Hash(below), &target));

        assert!(!meets_target(&Hash([0xFF; 32]), &target));
    }

    #[test]
    fn test_preimage_layout() {
        let tx = Transaction::coinbase([1u8; 20], "genesis");
        let block = Block::new(vec![tx], None, 0).unwrap();
        let pow = ProofOfWork::new(&block);

        // Genesis has no previous hash
        let data = pow.prepare_data(7);
        assert_eq!(data.len(), 32 + 8 + 8 + 8);
        assert_eq!(&data[..32], block.hash_transactions().as_bytes());
        assert_eq!(&data[32..40], &block.timestamp.to_be_bytes());
        assert_eq!(&data[40..48], &16i64.to_be_bytes());
        assert_eq!(&data[48..], &7u64.to_be_bytes());

        let child = Block::new(
            vec![Transaction::coinbase([2u8; 20], "child")],
            Some(block.hash),
            1,
        )
        .unwrap();
        let data = ProofOfWork::new(&child).prepare_data(0);
        assert_eq!(&data[..32], block.hash.as_bytes());
        assert_eq!(data.len(), 32 + 32 + 24);
    }

    #[test]
    fn test_mined_block_validates() {
        let tx = Transaction::coinbase([1u8; 20], "pow");
        let block = Block::new(vec![tx], None, 0).unwrap();
        let pow = ProofOfWork::new(&block);

        assert!(pow.validate());
        assert_eq!(pow.hash_with_nonce(block.nonce), block.hash);
        assert!(meets_target(&block.hash, pow.target()));
    }

    #[test]
    fn test_search_returns_first_valid_nonce() {
        let tx = Transaction::coinbase([1u8; 20], "first");
        let block = Block::new(vec![tx], None, 0).unwrap();
        let pow = ProofOfWork::new(&block);

        for nonce in 0..block.nonce {
            assert!(!meets_target(&pow.hash_with_nonce(nonce), pow.target()));
        }
    }
}
