//! Chain store using Sled
//!
//! One tree maps `block hash -> bincode(block)` and holds the tip hash under
//! the reserved key `l`. Every write that touches the tip runs inside a sled
//! transaction so the tip always names a stored block.

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::consensus::{validate_block, Block, BlockError, ValidationError};
use crate::constants::{BLOCKS_TREE, GENESIS_COINBASE_DATA, TIP_KEY};
use crate::crypto::{Hash, PrivateKey};
use crate::storage::iter::load_block;
use crate::storage::{BlockchainIterator, UTXOSet};
use crate::validation::{Transaction, TransactionError as TxError};
use crate::wallet::{address_to_pubkey_hash, WalletError};

/// Chain store errors
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Blockchain already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error("No existing blockchain found at {0}")]
    NotFound(PathBuf),
    #[error("Block {0} not found")]
    BlockNotFound(Hash),
    #[error("Transaction {0} not found")]
    TransactionNotFound(Hash),
    #[error("Parent {parent} of block {block} is not stored")]
    OrphanBlock { block: Hash, parent: Hash },
    #[error("Block {block} claims height {height}, parent is at {parent_height}")]
    HeightMismatch {
        block: Hash,
        height: u64,
        parent_height: u64,
    },
    #[error("Invalid transaction {0}")]
    InvalidTransaction(Hash),
    #[error("Genesis transaction {0} is not a coinbase")]
    InvalidCoinbase(Hash),
    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] ValidationError),
    #[error("Store has no tip")]
    MissingTip,
    #[error("Tip pointer is not a block hash")]
    CorruptTip,
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error(transparent)]
    Transaction(#[from] TxError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
}

impl ChainError {
    /// Errors that leave the node unable to continue
    ///
    /// Lookups of unknown blocks or transactions, rejected blocks and bad
    /// caller input are recoverable; store failures, corrupt data and
    /// attempts to mine invalid transactions are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChainError::Storage(_)
                | ChainError::Block(_)
                | ChainError::MissingTip
                | ChainError::CorruptTip
                | ChainError::InvalidTransaction(_)
        )
    }
}

impl From<TransactionError<ChainError>> for ChainError {
    fn from(err: TransactionError<ChainError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => ChainError::Storage(e),
        }
    }
}

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

type TxResult<T> = ConflictableTransactionResult<T, ChainError>;

fn aborting<E: Into<ChainError>>(err: E) -> ConflictableTransactionError<ChainError> {
    ConflictableTransactionError::Abort(err.into())
}

fn decode_tip(bytes: &[u8]) -> Result<Hash> {
    Hash::from_slice(bytes).ok_or(ChainError::CorruptTip)
}

fn read_tip(blocks: &Tree) -> Result<Hash> {
    let bytes = blocks.get(TIP_KEY)?.ok_or(ChainError::MissingTip)?;
    decode_tip(&bytes)
}

fn tx_tip(tx: &TransactionalTree) -> TxResult<Hash> {
    let bytes = tx.get(TIP_KEY)?.ok_or_else(|| aborting(ChainError::MissingTip))?;
    decode_tip(&bytes).map_err(aborting)
}

fn tx_block(tx: &TransactionalTree, hash: &Hash) -> TxResult<Option<Block>> {
    match tx.get(hash)? {
        Some(bytes) => Block::deserialize(&bytes).map(Some).map_err(aborting),
        None => Ok(None),
    }
}

/// Store the genesis block and point the tip at it
fn write_genesis(db: &Db, genesis: &Block, path: &Path) -> Result<Tree> {
    let encoded = genesis.serialize()?;
    let blocks = db.open_tree(BLOCKS_TREE)?;

    blocks.transaction(|tx| -> TxResult<()> {
        if tx.get(TIP_KEY)?.is_some() {
            return Err(aborting(ChainError::AlreadyExists(path.to_path_buf())));
        }
        tx.insert(genesis.hash.as_ref(), encoded.as_slice())?;
        tx.insert(TIP_KEY, genesis.hash.as_ref())?;
        Ok(())
    })?;
    db.flush()?;

    Ok(blocks)
}

/// Close and delete a store left half-initialised by a failed create
fn discard_store(db: Db, path: &Path) {
    drop(db);
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %e, "failed to remove partial store");
    }
}

/// Persistent, append-only chain of blocks
#[derive(Debug)]
pub struct Blockchain {
    /// Cached copy of the stored tip
    tip: RwLock<Hash>,
    db: Db,
    blocks: Tree,
    /// Last derived UTXO set and the tip it was derived at
    utxo_cache: Mutex<Option<(Hash, UTXOSet)>>,
}

impl Blockchain {
    /// Create a new store whose genesis pays the subsidy to `address`
    pub fn create(config: &NodeConfig, address: &str) -> Result<Self> {
        let pubkey_hash = address_to_pubkey_hash(address)?;
        let coinbase = Transaction::coinbase(pubkey_hash, GENESIS_COINBASE_DATA);
        Self::create_with_coinbase(config, coinbase)
    }

    /// Create a new store around an explicit genesis coinbase
    pub fn create_with_coinbase(config: &NodeConfig, coinbase: Transaction) -> Result<Self> {
        let path = config.db_path();
        if path.exists() {
            return Err(ChainError::AlreadyExists(path));
        }

        if !coinbase.is_coinbase() {
            return Err(ChainError::InvalidCoinbase(coinbase.id));
        }

        let genesis = Block::genesis(coinbase)?;
        let db = sled::open(&path)?;

        let blocks = match write_genesis(&db, &genesis, &path) {
            Ok(blocks) => blocks,
            // Someone else initialised the store; it is not ours to remove
            Err(e @ ChainError::AlreadyExists(_)) => return Err(e),
            Err(e) => {
                discard_store(db, &path);
                return Err(e);
            }
        };

        info!(path = %path.display(), genesis = %genesis.hash, "created blockchain");

        Ok(Self {
            tip: RwLock::new(genesis.hash),
            db,
            blocks,
            utxo_cache: Mutex::new(None),
        })
    }

    /// Open an existing store
    pub fn open(config: &NodeConfig) -> Result<Self> {
        let path = config.db_path();
        if !path.exists() {
            return Err(ChainError::NotFound(path));
        }

        let db = sled::open(&path)?;
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let tip = read_tip(&blocks)?;

        info!(path = %path.display(), tip = %tip, "opened blockchain");

        Ok(Self {
            tip: RwLock::new(tip),
            db,
            blocks,
            utxo_cache: Mutex::new(None),
        })
    }

    /// Hash of the current best block
    pub fn tip(&self) -> Hash {
        *self.tip.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reload the cached tip from the store
    ///
    /// The stored tip is read under the write lock, so concurrent writers
    /// cannot leave an older tip in the cache.
    fn refresh_tip(&self) -> Result<Hash> {
        let mut cached = self.tip.write().unwrap_or_else(PoisonError::into_inner);
        let tip = read_tip(&self.blocks)?;
        *cached = tip;
        Ok(tip)
    }

    /// Store a block received from elsewhere
    ///
    /// Adding a known block is a no-op. The tip moves only when the new block
    /// is strictly higher than the current tip, so ties keep the first block
    /// seen. The parent must already be stored.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        validate_block(block)?;
        let encoded = block.serialize()?;

        let outcome = self.blocks.transaction(|tx| -> TxResult<AddOutcome> {
            if tx.get(block.hash)?.is_some() {
                return Ok(AddOutcome::Known);
            }

            if let Some(parent_hash) = block.prev_hash {
                let parent = tx_block(tx, &parent_hash)?.ok_or_else(|| {
                    aborting(ChainError::OrphanBlock {
                        block: block.hash,
                        parent: parent_hash,
                    })
                })?;
                if parent.height + 1 != block.height {
                    return Err(aborting(ChainError::HeightMismatch {
                        block: block.hash,
                        height: block.height,
                        parent_height: parent.height,
                    }));
                }
            }

            tx.insert(block.hash.as_ref(), encoded.as_slice())?;

            let tip_hash = tx_tip(tx)?;
            let tip = tx_block(tx, &tip_hash)?
                .ok_or_else(|| aborting(ChainError::BlockNotFound(tip_hash)))?;

            if block.height > tip.height {
                tx.insert(TIP_KEY, block.hash.as_ref())?;
                Ok(AddOutcome::NewTip)
            } else {
                Ok(AddOutcome::Stored)
            }
        })?;
        self.flush()?;

        match outcome {
            AddOutcome::Known => debug!(hash = %block.hash, "block already stored"),
            AddOutcome::Stored => {
                debug!(hash = %block.hash, height = block.height, "stored side block")
            }
            AddOutcome::NewTip => {
                self.refresh_tip()?;
                info!(hash = %block.hash, height = block.height, "added block, new tip");
            }
        }

        Ok(())
    }

    /// Verify `transactions`, mine them on top of the tip and persist the block
    ///
    /// Any invalid transaction aborts the whole operation before mining.
    pub fn mine_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        for tx in &transactions {
            match self.verify_transaction(tx) {
                Ok(true) => {}
                Ok(false) | Err(ChainError::TransactionNotFound(_)) => {
                    warn!(txid = %tx.id, "refusing to mine invalid transaction");
                    return Err(ChainError::InvalidTransaction(tx.id));
                }
                Err(e) => return Err(e),
            }
        }

        // Reading the tip, mining and persisting run as one unit; on conflict
        // sled reruns the closure against the new tip.
        let block = self.blocks.transaction(|tx| -> TxResult<Block> {
            let last_hash = tx_tip(tx)?;
            let last = tx_block(tx, &last_hash)?
                .ok_or_else(|| aborting(ChainError::BlockNotFound(last_hash)))?;

            let block = Block::new(transactions.clone(), Some(last_hash), last.height + 1)
                .map_err(aborting)?;
            let encoded = block.serialize().map_err(aborting)?;

            tx.insert(block.hash.as_ref(), encoded)?;
            tx.insert(TIP_KEY, block.hash.as_ref())?;
            Ok(block)
        })?;
        self.flush()?;
        self.refresh_tip()?;

        info!(
            hash = %block.hash,
            height = block.height,
            transactions = block.transactions.len(),
            "mined block"
        );

        Ok(block)
    }

    /// Iterate from the tip back to genesis
    pub fn iter(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.tip(), self.blocks.clone())
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash) -> Result<Block> {
        load_block(&self.blocks, hash)
    }

    /// Height of the stored tip
    pub fn get_best_height(&self) -> Result<u64> {
        let height = self.blocks.transaction(|tx| -> TxResult<u64> {
            let tip_hash = tx_tip(tx)?;
            let tip = tx_block(tx, &tip_hash)?
                .ok_or_else(|| aborting(ChainError::BlockNotFound(tip_hash)))?;
            Ok(tip.height)
        })?;
        Ok(height)
    }

    /// Hashes of all blocks on the best chain, tip first
    pub fn get_block_hashes(&self) -> Result<Vec<Hash>> {
        self.iter().map(|block| block.map(|b| b.hash)).collect()
    }

    /// Find a transaction on the best chain by id
    pub fn find_transaction(&self, id: &Hash) -> Result<Transaction> {
        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == *id) {
                return Ok(tx);
            }
        }
        Err(ChainError::TransactionNotFound(*id))
    }

    /// Derive the unspent outputs of the best chain
    ///
    /// The result is cached until the tip moves.
    pub fn find_utxo(&self) -> Result<UTXOSet> {
        let tip = self.tip();
        let mut cache = self.utxo_cache.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((cached_tip, set)) = cache.as_ref() {
            if *cached_tip == tip {
                return Ok(set.clone());
            }
        }

        let set = UTXOSet::derive(BlockchainIterator::new(tip, self.blocks.clone()))?;
        *cache = Some((tip, set.clone()));
        Ok(set)
    }

    /// Previous transactions referenced by the inputs of `tx`, keyed by hex id
    fn prev_transactions(&self, tx: &Transaction) -> Result<HashMap<String, Transaction>> {
        let mut prev = HashMap::new();
        for input in &tx.inputs {
            if let Some(txid) = input.txid {
                let key = txid.to_hex();
                if !prev.contains_key(&key) {
                    prev.insert(key, self.find_transaction(&txid)?);
                }
            }
        }
        Ok(prev)
    }

    /// Sign every input of `tx` against the outputs it spends
    pub fn sign_transaction(&self, tx: &mut Transaction, key: &PrivateKey) -> Result<()> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev = self.prev_transactions(tx)?;
        tx.sign(key, &prev)?;
        Ok(())
    }

    /// Check the signatures of `tx` against the outputs it spends
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev = self.prev_transactions(tx)?;
        Ok(tx.verify(&prev)?)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

enum AddOutcome {
    Known,
    Stored,
    NewTip,
}
