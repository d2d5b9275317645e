//! Tip-to-genesis block iteration

use sled::Tree;

use crate::consensus::Block;
use crate::crypto::Hash;
use crate::storage::ChainError;

/// Walks the chain backwards by following `prev_hash`
///
/// Yields the block named by the starting hash first and stops after
/// genesis. A missing or undecodable block is yielded once as an error and
/// ends the walk.
#[derive(Debug, Clone)]
pub struct BlockchainIterator {
    current: Option<Hash>,
    blocks: Tree,
}

impl BlockchainIterator {
    pub(crate) fn new(start: Hash, blocks: Tree) -> Self {
        Self {
            current: Some(start),
            blocks,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;
        match load_block(&self.blocks, &hash) {
            Ok(block) => {
                self.current = block.prev_hash;
                Some(Ok(block))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read and decode a block outside of a transaction
pub(crate) fn load_block(blocks: &Tree, hash: &Hash) -> Result<Block, ChainError> {
    let bytes = blocks.get(hash)?.ok_or(ChainError::BlockNotFound(*hash))?;
    Ok(Block::deserialize(&bytes)?)
}
