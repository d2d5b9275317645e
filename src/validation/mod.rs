//! Validation module - transactions and their signature checks

mod transaction;

pub use transaction::*;
