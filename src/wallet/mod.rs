//! Wallet module - key pairs, addresses and spend construction
//!
//! The wallet does NOT affect consensus; the chain only relies on
//! `sign` and `hash_pub_key`.

mod wallet;

pub use wallet::*;

use crate::constants::{ADDRESS_CHECKSUM_LEN, ADDRESS_VERSION, PUBKEY_HASH_LEN};
use crate::crypto::checksum;

/// Encode a public key hash as a Base58Check address
/// Address format: Base58(version || pubkey_hash || checksum[0:4])
pub fn pubkey_hash_to_address(pubkey_hash: &[u8; PUBKEY_HASH_LEN]) -> String {
    let mut payload = Vec::with_capacity(1 + PUBKEY_HASH_LEN + ADDRESS_CHECKSUM_LEN);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(pubkey_hash);
    let check = checksum(&payload);
    payload.extend_from_slice(&check[..ADDRESS_CHECKSUM_LEN]);
    bs58::encode(payload).into_string()
}

/// Decode an address back to its pubkey hash
pub fn address_to_pubkey_hash(address: &str) -> Result<[u8; PUBKEY_HASH_LEN], WalletError> {
    let invalid = || WalletError::InvalidAddress(address.to_string());

    let decoded = bs58::decode(address).into_vec().map_err(|_| invalid())?;
    if decoded.len() != 1 + PUBKEY_HASH_LEN + ADDRESS_CHECKSUM_LEN {
        return Err(invalid());
    }

    let (payload, check) = decoded.split_at(1 + PUBKEY_HASH_LEN);
    if payload[0] != ADDRESS_VERSION || check != &checksum(payload)[..ADDRESS_CHECKSUM_LEN] {
        return Err(invalid());
    }

    let mut pubkey_hash = [0u8; PUBKEY_HASH_LEN];
    pubkey_hash.copy_from_slice(&payload[1..]);
    Ok(pubkey_hash)
}

/// Check an address' encoding and checksum
pub fn validate_address(address: &str) -> bool {
    address_to_pubkey_hash(address).is_ok()
}
