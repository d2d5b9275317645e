//! Consensus module - block structure, proof of work and admission checks

mod block;
mod pow;
mod validation;

pub use block::*;
pub use pow::*;
pub use validation::*;
