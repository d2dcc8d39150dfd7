//! End-to-end flow: fund an account, pick coins for payments, batch and
//! sign the transactions, stage the batch in the pool, assemble a block,
//! and prove batch inclusion against the block's Merkle root.

mod common;

use common::{test_key, value};
use ezchain_core::{
    Block, BlockAssembler, MerkleTree, MultiTransaction, TransactionPool, ValuePicker, ValueState,
};

#[test]
fn payment_flows_from_wallet_to_proven_block() {
    let key = test_key();
    let sender = "acct-sender";

    // Wallet side: fund the account and pick coins for two payments.
    let mut picker = ValuePicker::new(sender);
    picker.add_values(vec![
        value("0x10000", 500),
        value("0x20000", 250),
        value("0x30000", 250),
    ]);

    let first = picker
        .pick_for_payment(600, "acct-merchant", 1)
        .expect("600 is funded");
    let second = picker
        .pick_for_payment(100, "acct-grocer", 2)
        .expect("100 is funded from the remainder");

    // Pick one: 500 + 250 scanned, 150 change minted back to the sender.
    assert_eq!(first.selected_sum, 750);
    assert_eq!(first.change.as_ref().expect("change").count(), 150);
    // Pick two: the change is still Selected, so the scan starts at 0x30000.
    assert_eq!(second.selected_sum, 250);
    assert_eq!(second.change.as_ref().expect("change").count(), 150);

    // Sign everything and batch it.
    let mut txs = Vec::new();
    for selection in [&first, &second] {
        let mut primary = selection.primary.clone();
        primary.sign(&key.private_pem).expect("sign primary");
        txs.push(primary);
        if let Some(change_tx) = &selection.change_tx {
            let mut change_tx = change_tx.clone();
            change_tx.sign(&key.private_pem).expect("sign change");
            txs.push(change_tx);
        }
    }
    let mut batch = MultiTransaction::new(sender, txs).expect("homogeneous batch");
    batch.sign(&key.private_pem).expect("sign batch");
    assert!(batch.verify(&key.public_pem));

    // Pool side: admission under the sender's key.
    let pool = TransactionPool::open_in_memory().expect("open pool");
    let (accepted, message) = pool.add(&batch, Some(&key.public_pem)).expect("admission");
    assert!(accepted, "admission failed: {message}");
    picker.commit(&first).expect("commit first");
    picker.commit(&second).expect("commit second");

    // Producer side: package, build, finalize.
    let miner = test_key();
    let assembler = BlockAssembler::with_defaults();
    let genesis = Block::genesis("miner-1");
    let package = assembler.package(&pool);
    assert_eq!(package.sender_addresses, vec![sender]);

    let block = assembler
        .build_block(&package, "miner-1", &genesis.hash(), 1, Some(&miner.private_pem))
        .expect("build block");
    assert!(genesis.is_valid_next(&block));
    assert!(block.verify_signature());
    assert!(block.bloom_contains(sender));
    assert_eq!(assembler.finalize(&pool, &package).expect("finalize"), 1);
    assert!(pool.is_empty());

    // Verifier side: the batch digest proves into the block's Merkle root.
    let digests: Vec<String> = package
        .batches
        .iter()
        .map(|b| b.digest.clone().expect("digest"))
        .collect();
    let tree = MerkleTree::new(&digests).expect("tree over digests");
    assert_eq!(tree.root_hash(), block.merkle_root);
    let proof = tree.proof(0).expect("inclusion proof");
    let batch_digest = batch.digest.clone().expect("digest");
    assert!(proof.verify(batch_digest.as_bytes(), &block.merkle_root));

    // Wallet side again: confirmation retires the spent coins.
    picker.confirm(&first).expect("confirm first");
    picker.confirm(&second).expect("confirm second");
    assert_eq!(picker.balance(ValueState::Confirmed), 1000);
    assert_eq!(picker.cleanup_confirmed(), 5);
    assert_eq!(picker.total_balance(), 0);
    assert!(picker.validate_integrity());
}

#[test]
fn rejected_batch_rolls_the_wallet_back() {
    let key = test_key();
    let stranger = test_key();
    let sender = "acct-sender";

    let mut picker = ValuePicker::new(sender);
    picker.add_values(vec![value("0x10000", 300)]);
    let selection = picker.pick_for_payment(200, "acct-merchant", 1).expect("pick");

    let mut primary = selection.primary.clone();
    primary.sign(&key.private_pem).expect("sign");
    let mut batch = MultiTransaction::new(sender, vec![primary]).expect("batch");
    batch.sign(&key.private_pem).expect("sign batch");

    // The pool rejects the batch under the wrong key; the wallet rolls back.
    let pool = TransactionPool::open_in_memory().expect("open pool");
    let (accepted, _) = pool
        .add(&batch, Some(&stranger.public_pem))
        .expect("admission");
    assert!(!accepted);

    picker.rollback(&selection).expect("rollback");
    assert_eq!(picker.balance(ValueState::Unspent), 300);
    assert_eq!(picker.balance(ValueState::Selected), 0);

    // The coins fund the retried payment immediately.
    assert!(picker.pick_for_payment(200, "acct-merchant", 2).is_ok());
}
