mod common;

use std::sync::Arc;
use std::thread;

use common::{signed_batch, test_key};
use ezchain_core::{PoolConfig, TransactionPool};

#[test]
fn admission_stages_and_indexes_a_valid_batch() {
    let key = test_key();
    let pool = TransactionPool::open_in_memory().expect("open pool");
    let batch = signed_batch("acct-1", &key.private_pem, 2, 0);

    let (accepted, message) = pool.add(&batch, Some(&key.public_pem)).expect("admission");
    assert!(accepted, "rejected: {message}");
    assert_eq!(pool.len(), 1);

    let digest = batch.digest.clone().expect("digest stored");
    assert!(pool.contains(&digest));
    assert_eq!(pool.by_digest(&digest).expect("by digest").len(), 2);
    assert_eq!(pool.by_sender("acct-1").len(), 1);
    assert!(pool.by_sender("acct-2").is_empty());

    let stats = pool.stats();
    assert_eq!(stats.total_received, 1);
    assert_eq!(stats.valid_received, 1);
    assert_eq!(stats.invalid_received, 0);
    assert_eq!(stats.duplicates, 0);
}

#[test]
fn duplicate_digests_are_counted_and_not_restaged() {
    let key = test_key();
    let pool = TransactionPool::open_in_memory().expect("open pool");
    let batch = signed_batch("acct-1", &key.private_pem, 2, 0);

    let (first, _) = pool.add(&batch, Some(&key.public_pem)).expect("admission");
    let (second, message) = pool.add(&batch, Some(&key.public_pem)).expect("admission");
    assert!(first);
    assert!(!second);
    assert!(message.contains("duplicate"));
    assert_eq!(pool.len(), 1);
    assert_eq!(pool.stats().duplicates, 1);
    assert_eq!(pool.stats().total_received, 2);
}

#[test]
fn same_content_different_timestamp_is_not_a_duplicate() {
    let key = test_key();
    let pool = TransactionPool::open_in_memory().expect("open pool");
    let mut early = signed_batch("acct-1", &key.private_pem, 1, 0);
    let mut late = early.clone();
    early.timestamp = "2026-03-01T10:00:00.000000+00:00".into();
    late.timestamp = "2026-03-01T10:00:01.000000+00:00".into();
    early.sign(&key.private_pem).expect("re-sign early");
    late.sign(&key.private_pem).expect("re-sign late");

    assert!(pool.add(&early, Some(&key.public_pem)).expect("admission").0);
    assert!(pool.add(&late, Some(&key.public_pem)).expect("admission").0);
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.stats().duplicates, 0);
}

#[test]
fn wrong_key_and_unsigned_batches_are_rejected() {
    let key = test_key();
    let stranger = test_key();
    let pool = TransactionPool::open_in_memory().expect("open pool");

    let batch = signed_batch("acct-1", &key.private_pem, 1, 0);
    let (accepted, _) = pool.add(&batch, Some(&stranger.public_pem)).expect("admission");
    assert!(!accepted);

    let mut unsigned = signed_batch("acct-1", &key.private_pem, 1, 1);
    unsigned.signature = None;
    let (accepted, _) = pool.add(&unsigned, None).expect("admission");
    assert!(!accepted);

    // Without a public key, a present signature is enough.
    let lax = signed_batch("acct-1", &key.private_pem, 1, 2);
    let (accepted, _) = pool.add(&lax, None).expect("admission");
    assert!(accepted);

    assert_eq!(pool.stats().invalid_received, 2);
    assert_eq!(pool.stats().valid_received, 1);
}

#[test]
fn removal_marks_the_row_processed_across_restarts() {
    let key = test_key();
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("pool.sqlite");

    let keep_digest;
    let drop_digest;
    {
        let pool = TransactionPool::open(PoolConfig::new(&db_path)).expect("open pool");
        let keep = signed_batch("acct-1", &key.private_pem, 1, 0);
        let gone = signed_batch("acct-2", &key.private_pem, 2, 1);
        keep_digest = keep.digest.clone().expect("digest");
        drop_digest = gone.digest.clone().expect("digest");

        assert!(pool.add(&keep, Some(&key.public_pem)).expect("admission").0);
        assert!(pool.add(&gone, Some(&key.public_pem)).expect("admission").0);
        assert!(pool.remove(&drop_digest).expect("remove"));
        assert!(!pool.remove(&drop_digest).expect("second remove is a no-op"));
        assert_eq!(pool.len(), 1);
    }

    // Rehydration skips processed rows.
    let reopened = TransactionPool::open(PoolConfig::new(&db_path)).expect("reopen pool");
    assert_eq!(reopened.len(), 1);
    assert!(reopened.contains(&keep_digest));
    assert!(!reopened.contains(&drop_digest));
}

#[test]
fn aging_sweep_drops_stale_entries_from_memory_and_disk() {
    let key = test_key();
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("pool.sqlite");

    let mut config = PoolConfig::new(&db_path);
    config.max_entry_age_hours = 24;
    let pool = TransactionPool::open(config.clone()).expect("open pool");

    // One batch stamped two days ago, one stamped now.
    let mut stale = signed_batch("acct-1", &key.private_pem, 1, 0);
    stale.timestamp = (chrono::Utc::now() - chrono::Duration::hours(48))
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    stale.sign(&key.private_pem).expect("re-sign stale");
    let mut fresh = signed_batch("acct-2", &key.private_pem, 1, 1);
    fresh.timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    fresh.sign(&key.private_pem).expect("re-sign fresh");

    assert!(pool.add(&stale, Some(&key.public_pem)).expect("admission").0);
    assert!(pool.add(&fresh, Some(&key.public_pem)).expect("admission").0);
    assert_eq!(pool.len(), 2);

    assert_eq!(pool.sweep_expired().expect("sweep"), 1);
    assert_eq!(pool.len(), 1);
    let stale_digest = stale.digest.clone().expect("digest");
    assert!(!pool.contains(&stale_digest));
    drop(pool);

    // The stale row is gone from the store as well.
    let reopened = TransactionPool::open(config).expect("reopen pool");
    assert_eq!(reopened.len(), 1);
    assert!(!reopened.contains(&stale_digest));
}

#[test]
fn concurrent_admissions_all_land() {
    let key = test_key();
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = Arc::new(
        TransactionPool::open(PoolConfig::new(dir.path().join("pool.sqlite"))).expect("open pool"),
    );

    let handles: Vec<_> = (0..4u64)
        .map(|lane| {
            let pool = Arc::clone(&pool);
            let private_pem = key.private_pem.clone();
            let public_pem = key.public_pem.clone();
            thread::spawn(move || {
                let batch = signed_batch(&format!("acct-{lane}"), &private_pem, 1, lane);
                pool.add(&batch, Some(&public_pem)).expect("admission").0
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("admission thread"));
    }
    assert_eq!(pool.len(), 4);
    assert_eq!(pool.stats().valid_received, 4);
}
