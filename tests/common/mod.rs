#![allow(dead_code)]

use ezchain_core::{Keypair, MultiTransaction, RangeValue, Transaction};

/// Test keypair along with its PEM halves.
pub struct TestKey {
    pub keypair: Keypair,
    pub private_pem: String,
    pub public_pem: String,
}

pub fn test_key() -> TestKey {
    let keypair = Keypair::generate();
    let private_pem = keypair
        .private_key_pem()
        .expect("encode private key")
        .to_string();
    let public_pem = keypair.public_key_pem();
    TestKey {
        keypair,
        private_pem,
        public_pem,
    }
}

pub fn value(begin_hex: &str, count: u64) -> RangeValue {
    RangeValue::from_hex(begin_hex, count).expect("valid test value")
}

/// Deterministic transaction with a fixed timestamp.
pub fn transaction(sender: &str, recipient: &str, begin_hex: &str, count: u64, nonce: u64) -> Transaction {
    Transaction::with_timestamp(
        sender,
        recipient,
        vec![value(begin_hex, count)],
        nonce,
        format!("2026-03-01T10:00:{:02}.000000+00:00", nonce % 60),
    )
}

/// Signed batch of `children` transactions from one sender. Child value
/// intervals are offset by `lane` so batches built for different lanes never
/// reuse an address range.
pub fn signed_batch(sender: &str, private_pem: &str, children: usize, lane: u64) -> MultiTransaction {
    let txs: Vec<Transaction> = (0..children)
        .map(|child| {
            let child = child as u64;
            let mut tx = transaction(
                sender,
                "recipient-1",
                &format!("0x{:x}", (lane + 1) * 0x10_0000 + child * 0x100),
                16,
                child,
            );
            tx.sign(private_pem).expect("sign child transaction");
            tx
        })
        .collect();
    let mut batch = MultiTransaction::with_timestamp(
        sender,
        txs,
        format!("2026-03-01T10:05:{:02}.000000+00:00", lane % 60),
    )
    .expect("valid batch");
    batch.sign(private_pem).expect("sign batch");
    batch
}
