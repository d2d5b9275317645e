//! Storage module - sled-backed chain store and UTXO derivation

mod db;
mod iter;
mod utxo;

pub use db::*;
pub use iter::BlockchainIterator;
pub use utxo::*;
