//! Wallet implementation
//!
//! Key pairs and construction of unsigned spends from a derived UTXO view.
//! Signing happens through the chain, which resolves the spent outputs.

use thiserror::Error;

use crate::constants::PUBKEY_HASH_LEN;
use crate::crypto::{hash_pub_key, Hash, PrivateKey, PublicKey};
use crate::storage::UTXOSet;
use crate::validation::{Transaction, TxInput, TxOutput};

use super::pubkey_hash_to_address;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid transaction id: {0}")]
    InvalidTxid(String),
}

/// A wallet key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Private key (for signing)
    private_key: PrivateKey,
    /// Public key
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let private_key = PrivateKey::generate();
        let public_key = private_key.public_key();
        Self {
            private_key,
            public_key,
        }
    }

    /// Import from private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        let private_key =
            PrivateKey::from_bytes(bytes).map_err(|_| WalletError::InvalidPrivateKey)?;
        let public_key = private_key.public_key();
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Private key used to sign inputs
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Raw public key bytes, as carried by inputs
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.to_bytes().to_vec()
    }

    /// Get the public key hash (used in outputs)
    pub fn pubkey_hash(&self) -> [u8; PUBKEY_HASH_LEN] {
        hash_pub_key(&self.public_key.0)
    }

    /// Base58Check address of this key
    pub fn address(&self) -> String {
        pubkey_hash_to_address(&self.pubkey_hash())
    }
}

/// Build an unsigned transaction moving `amount` from `from` to `to`
///
/// Change goes back to `from`. The result must be signed with
/// `Blockchain::sign_transaction` before it is mined.
pub fn create_transaction(
    from: &KeyPair,
    to: &str,
    amount: u64,
    utxo_set: &UTXOSet,
) -> Result<Transaction, WalletError> {
    let payment = TxOutput::to_address(amount, to)?;
    let (accumulated, spendable) = utxo_set.find_spendable_outputs(&from.pubkey_hash(), amount);

    if accumulated < amount {
        return Err(WalletError::InsufficientFunds {
            have: accumulated,
            need: amount,
        });
    }

    let mut inputs = Vec::new();
    for (txid, indices) in spendable {
        let txid_hash = Hash::from_hex(&txid).map_err(|_| WalletError::InvalidTxid(txid.clone()))?;
        for index in indices {
            inputs.push(TxInput::new(txid_hash, index as i64, from.public_key_bytes()));
        }
    }

    let mut outputs = vec![payment];
    if accumulated > amount {
        outputs.push(TxOutput::new(accumulated - amount, from.pubkey_hash()));
    }

    Ok(Transaction::new(inputs, outputs))
}
