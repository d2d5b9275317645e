//! Cryptography module - SHA-256 hashing, Schnorr signatures, Merkle trees

mod hash;
mod schnorr;
mod merkle;

pub use hash::*;
pub use schnorr::*;
pub use merkle::*;
