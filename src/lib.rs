//! Ledger core library
//!
//! A minimal cryptocurrency ledger: an append-only chain of blocks secured
//! by proof-of-work, committing to transactions through a Merkle root, with
//! unspent outputs derived by scanning the chain.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod validation;
pub mod storage;
pub mod wallet;

pub use config::NodeConfig;
pub use consensus::Block;
pub use storage::{Blockchain, BlockchainIterator, ChainError, UTXOSet};
pub use validation::{Transaction, TxInput, TxOutput};

/// Protocol constants - HARD-CODED, NEVER CONFIGURABLE
pub mod constants {
    /// Difficulty: a block hash must be below 2^(256 - TARGET_BITS)
    pub const TARGET_BITS: u32 = 16;

    /// Upper bound of the nonce search space
    pub const MAX_NONCE: u64 = i64::MAX as u64;

    /// Value created by a coinbase transaction
    pub const SUBSIDY: u64 = 10;

    /// Coinbase data embedded in the genesis block
    pub const GENESIS_COINBASE_DATA: &str =
        "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

    /// Store file name pattern, `{}` is replaced by the node id
    pub const DB_FILE_PATTERN: &str = "blockchain_{}.db";

    /// Namespace holding `hash -> serialized block` and the tip pointer
    pub const BLOCKS_TREE: &str = "blocks";

    /// Reserved key holding the tip hash
    pub const TIP_KEY: &[u8] = b"l";

    /// Address version byte
    pub const ADDRESS_VERSION: u8 = 0x00;

    /// Address checksum length in bytes
    pub const ADDRESS_CHECKSUM_LEN: usize = 4;

    /// Length of a public key hash
    pub const PUBKEY_HASH_LEN: usize = 20;
}
