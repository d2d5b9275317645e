//! End-to-end chain store scenarios on temporary directories

use ledger_core::consensus::Block;
use ledger_core::crypto::Hash;
use ledger_core::storage::{Blockchain, ChainError};
use ledger_core::validation::{Transaction, TxInput, TxOutput};
use ledger_core::wallet::{create_transaction, KeyPair};
use ledger_core::NodeConfig;
use tempfile::TempDir;

fn setup() -> (TempDir, NodeConfig, Blockchain, KeyPair) {
    let dir = TempDir::new().unwrap();
    let config = NodeConfig::new(dir.path(), "node-a").unwrap();
    let miner = KeyPair::generate();
    let chain = Blockchain::create(&config, &miner.address()).unwrap();
    (dir, config, chain, miner)
}

fn reward(to: &KeyPair, tag: &str) -> Transaction {
    Transaction::coinbase(to.pubkey_hash(), tag)
}

#[test]
fn test_genesis_pays_subsidy() {
    let (_dir, _config, chain, miner) = setup();

    let utxo = chain.find_utxo().unwrap();
    assert_eq!(utxo.len(), 1);
    assert_eq!(utxo.balance(&miner.pubkey_hash()), 10);
}

#[test]
fn test_spend_updates_utxo_set() {
    let (_dir, _config, chain, x) = setup();
    let y = KeyPair::generate();
    let genesis = chain.get_block(&chain.tip()).unwrap();
    let funding = &genesis.transactions[0];

    let utxo = chain.find_utxo().unwrap();
    let mut tx = create_transaction(&x, &y.address(), 4, &utxo).unwrap();
    chain.sign_transaction(&mut tx, x.private_key()).unwrap();
    assert!(chain.verify_transaction(&tx).unwrap());

    let block = chain.mine_block(vec![tx.clone()]).unwrap();
    assert_eq!(block.height, 1);
    assert_eq!(chain.find_transaction(&tx.id).unwrap(), tx);

    let utxo = chain.find_utxo().unwrap();
    assert!(utxo.get(&funding.id.to_hex()).is_none());
    assert_eq!(utxo.balance(&x.pubkey_hash()), 6);
    assert_eq!(utxo.balance(&y.pubkey_hash()), 4);
    assert_eq!(utxo.len(), 2);
}

#[test]
fn test_output_spent_in_same_block_is_not_unspent() {
    let (_dir, _config, chain, miner) = setup();
    let y = KeyPair::generate();

    let funding = Transaction::new(
        vec![TxInput::new(Hash::from_bytes([0x22; 32]), 0, miner.public_key_bytes())],
        vec![TxOutput::new(7, miner.pubkey_hash())],
    );
    let spend = Transaction::new(
        vec![TxInput::new(funding.id, 0, miner.public_key_bytes())],
        vec![TxOutput::new(7, y.pubkey_hash())],
    );

    let block = Block::new(vec![funding.clone(), spend.clone()], Some(chain.tip()), 1).unwrap();
    chain.add_block(&block).unwrap();

    let utxo = chain.find_utxo().unwrap();
    assert!(!utxo.contains(&funding.id.to_hex(), 0));
    assert!(utxo.contains(&spend.id.to_hex(), 0));
    assert_eq!(utxo.balance(&y.pubkey_hash()), 7);
    assert_eq!(utxo.balance(&miner.pubkey_hash()), 10);
}

#[test]
fn test_signature_from_other_transaction_rejected() {
    let (_dir, _config, chain, x) = setup();
    let y = KeyPair::generate();
    let z = KeyPair::generate();

    let utxo = chain.find_utxo().unwrap();
    let mut to_y = create_transaction(&x, &y.address(), 4, &utxo).unwrap();
    let mut to_z = create_transaction(&x, &z.address(), 4, &utxo).unwrap();
    chain.sign_transaction(&mut to_y, x.private_key()).unwrap();
    chain.sign_transaction(&mut to_z, x.private_key()).unwrap();

    // Same key and same spent output, but signed over a different trimmed copy
    to_y.inputs[0].signature = to_z.inputs[0].signature.clone();
    assert!(!chain.verify_transaction(&to_y).unwrap());

    let err = chain.mine_block(vec![to_y]).unwrap_err();
    assert!(matches!(err, ChainError::InvalidTransaction(_)));
}

#[test]
fn test_wrong_key_rejected() {
    let (_dir, _config, chain, x) = setup();
    let thief = KeyPair::generate();

    let utxo = chain.find_utxo().unwrap();
    let mut tx = create_transaction(&x, &thief.address(), 10, &utxo).unwrap();
    chain.sign_transaction(&mut tx, thief.private_key()).unwrap();

    assert!(!chain.verify_transaction(&tx).unwrap());
}

#[test]
fn test_unknown_input_reference() {
    let (_dir, _config, chain, x) = setup();
    let y = KeyPair::generate();

    let mut tx = create_transaction(&x, &y.address(), 4, &chain.find_utxo().unwrap()).unwrap();
    tx.inputs[0].txid = Some(Hash::from_bytes([0xAB; 32]));

    assert!(matches!(
        chain.verify_transaction(&tx),
        Err(ChainError::TransactionNotFound(_))
    ));
    assert!(matches!(
        chain.sign_transaction(&mut tx, x.private_key()),
        Err(ChainError::TransactionNotFound(_))
    ));
    assert!(matches!(
        chain.mine_block(vec![tx]),
        Err(ChainError::InvalidTransaction(_))
    ));
}

#[test]
fn test_add_block_tip_rules() {
    let (_dir, _config, chain, miner) = setup();
    let genesis = chain.tip();

    // A higher block moves the tip
    let a1 = Block::new(vec![reward(&miner, "a1")], Some(genesis), 1).unwrap();
    chain.add_block(&a1).unwrap();
    assert_eq!(chain.tip(), a1.hash);

    // Adding it again changes nothing
    chain.add_block(&a1).unwrap();
    assert_eq!(chain.tip(), a1.hash);
    assert_eq!(chain.get_block_hashes().unwrap(), vec![a1.hash, genesis]);

    // Same height keeps the first block seen
    let b1 = Block::new(vec![reward(&miner, "b1")], Some(genesis), 1).unwrap();
    chain.add_block(&b1).unwrap();
    assert_eq!(chain.tip(), a1.hash);
    assert_eq!(chain.get_block(&b1.hash).unwrap(), b1);

    // A longer side branch takes over
    let b2 = Block::new(vec![reward(&miner, "b2")], Some(b1.hash), 2).unwrap();
    chain.add_block(&b2).unwrap();
    assert_eq!(chain.tip(), b2.hash);
    assert_eq!(chain.get_best_height().unwrap(), 2);
    assert_eq!(
        chain.get_block_hashes().unwrap(),
        vec![b2.hash, b1.hash, genesis]
    );

    // Lower blocks never move it back
    let a2 = Block::new(vec![reward(&miner, "a2")], Some(a1.hash), 2).unwrap();
    chain.add_block(&a2).unwrap();
    assert_eq!(chain.tip(), b2.hash);
}

#[test]
fn test_add_block_rejects_invalid_pow() {
    let (_dir, _config, chain, miner) = setup();
    let genesis = chain.tip();

    let mut forged = Block::new(vec![reward(&miner, "forged")], Some(genesis), 1).unwrap();
    forged.transactions[0].outputs[0].value = 1_000;

    let err = chain.add_block(&forged).unwrap_err();
    assert!(matches!(err, ChainError::InvalidBlock(_)));
    assert!(!err.is_fatal());
    assert_eq!(chain.tip(), genesis);
}

#[test]
fn test_iteration_reaches_genesis() {
    let (_dir, _config, chain, miner) = setup();
    for i in 0..3 {
        chain.mine_block(vec![reward(&miner, &format!("r{i}"))]).unwrap();
    }

    let height = chain.get_best_height().unwrap();
    let blocks: Vec<Block> = chain.iter().collect::<Result<_, _>>().unwrap();

    assert_eq!(height, 3);
    assert_eq!(blocks.len() as u64, height + 1);
    assert!(blocks.last().unwrap().is_genesis());
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].prev_hash, Some(pair[1].hash));
        assert_eq!(pair[0].height, pair[1].height + 1);
    }
}

#[test]
fn test_state_survives_reopen() {
    let (_dir, config, chain, miner) = setup();
    let mined = chain.mine_block(vec![reward(&miner, "persisted")]).unwrap();
    drop(chain);

    let chain = Blockchain::open(&config).unwrap();
    assert_eq!(chain.tip(), mined.hash);
    assert_eq!(chain.get_best_height().unwrap(), 1);
    assert_eq!(chain.find_utxo().unwrap().balance(&miner.pubkey_hash()), 20);
}

#[test]
fn test_lookup_failures() {
    let (_dir, config, chain, miner) = setup();
    let missing = Hash::from_bytes([0x11; 32]);

    let err = chain.get_block(&missing).unwrap_err();
    assert!(matches!(err, ChainError::BlockNotFound(h) if h == missing));
    assert!(!err.is_fatal());

    assert!(matches!(
        chain.find_transaction(&missing),
        Err(ChainError::TransactionNotFound(_))
    ));
    drop(chain);

    assert!(matches!(
        Blockchain::create(&config, &miner.address()),
        Err(ChainError::AlreadyExists(_))
    ));

    let other = NodeConfig::new(config.data_dir.clone(), "node-b").unwrap();
    assert!(matches!(Blockchain::open(&other), Err(ChainError::NotFound(_))));
}
