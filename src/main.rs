//! Ledger node
//!
//! Opens the chain store for `NODE_ID`, creating it with a genesis block
//! when it does not exist yet, and reports the state of the best chain.

use ledger_core::storage::{Blockchain, ChainError};
use ledger_core::wallet::{address_to_pubkey_hash, KeyPair};
use ledger_core::NodeConfig;
use tracing::{info, warn, Level};

/// Address receiving the genesis subsidy of a new store
const MINER_ADDRESS_ENV: &str = "MINER_ADDRESS";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(Level::INFO.as_str())),
        )
        .init();

    let config = NodeConfig::from_env()?;

    let miner_address = match std::env::var(MINER_ADDRESS_ENV) {
        Ok(address) => address,
        Err(_) => {
            let keypair = KeyPair::generate();
            warn!(
                address = %keypair.address(),
                private_key = %hex::encode(keypair.private_key().to_bytes()),
                "{} not set, generated a new key pair",
                MINER_ADDRESS_ENV
            );
            keypair.address()
        }
    };

    let chain = match Blockchain::open(&config) {
        Ok(chain) => chain,
        Err(ChainError::NotFound(_)) => Blockchain::create(&config, &miner_address)?,
        Err(e) => return Err(e.into()),
    };

    let height = chain.get_best_height()?;
    let hashes = chain.get_block_hashes()?;
    info!(node = %config.node_id, height, tip = %chain.tip(), blocks = hashes.len(), "chain loaded");
    for hash in &hashes {
        info!(%hash, "block");
    }

    let pubkey_hash = address_to_pubkey_hash(&miner_address)?;
    let utxo = chain.find_utxo()?;
    info!(address = %miner_address, balance = utxo.balance(&pubkey_hash), "miner balance");

    let tip = chain.get_block(&chain.tip())?;
    println!("{}", serde_json::to_string_pretty(&tip)?);

    Ok(())
}
