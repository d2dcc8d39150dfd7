//! Validated staging of multi-transaction batches.
//!
//! The pool is the only shared mutable structure in the core. One mutex
//! guards the in-memory list, both lookup indexes, the cumulative counters,
//! and the SQLite handle; every public operation holds it for its full
//! duration. Admission persists the entry before touching the in-memory
//! list, so a storage failure leaves memory exactly as it was.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use tracing::{debug, info, warn};

use crate::batch::MultiTransaction;
use crate::error::{Error, Result};
use crate::transaction::now_iso;

/// Pool configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// SQLite database path (`:memory:` for a transient store).
    pub db_path: PathBuf,
    /// Hours between aging sweeps.
    pub cleanup_interval_hours: u64,
    /// Age past which an unprocessed entry is dropped.
    pub max_entry_age_hours: u64,
}

impl PoolConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            cleanup_interval_hours: 1,
            max_entry_age_hours: 24,
        }
    }
}

/// Cumulative admission counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total_received: u64,
    pub valid_received: u64,
    pub invalid_received: u64,
    pub duplicates: u64,
}

/// One staged batch.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    pub digest: String,
    pub sender: String,
    pub timestamp: String,
    pub signature: Option<Vec<u8>>,
    pub encoded: Vec<u8>,
    pub is_valid: bool,
    pub processed: bool,
}

struct PoolInner {
    entries: Vec<PoolEntry>,
    by_digest: HashMap<String, usize>,
    by_sender: HashMap<String, Vec<usize>>,
    stats: PoolStats,
    conn: Connection,
}

/// Validated, persisted, aged staging area for batches.
pub struct TransactionPool {
    inner: Mutex<PoolInner>,
    config: PoolConfig,
}

impl TransactionPool {
    /// Open (or create) the pool store and rehydrate unprocessed entries in
    /// admission order.
    pub fn open(config: PoolConfig) -> Result<Self> {
        let conn = Connection::open(&config.db_path)?;
        init_schema(&conn)?;
        let entries = load_unprocessed(&conn)?;
        let mut inner = PoolInner {
            entries,
            by_digest: HashMap::new(),
            by_sender: HashMap::new(),
            stats: PoolStats::default(),
            conn,
        };
        inner.rebuild_indexes();
        info!(entries = inner.entries.len(), "transaction pool rehydrated");
        Ok(Self {
            inner: Mutex::new(inner),
            config,
        })
    }

    /// Pool backed by a transient in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(PoolConfig::new(":memory:"))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Admit a batch, returning `(accepted, message)`.
    ///
    /// With a public key the aggregate signature and every child signature
    /// must verify; without one, only their presence is required. Duplicate
    /// digests are rejected. Only storage failures error.
    pub fn add(
        &self,
        batch: &MultiTransaction,
        public_key_pem: Option<&str>,
    ) -> Result<(bool, String)> {
        let mut inner = self.inner.lock();
        inner.stats.total_received += 1;

        if let Err(err) = batch.validate_structure() {
            return inner.reject(batch, "structural", err.to_string());
        }
        if let Some(tx) = batch.iter().find(|tx| tx.signature.is_none()) {
            return inner.reject(
                batch,
                "structural",
                format!("transaction {} is unsigned", tx.hash_hex()),
            );
        }

        match public_key_pem {
            Some(key) => {
                if !batch.verify(key) {
                    return inner.reject(
                        batch,
                        "signature",
                        format!("aggregate {}", Error::SignatureInvalid),
                    );
                }
                if let Some(tx) = batch.iter().find(|tx| !tx.verify(key)) {
                    return inner.reject(
                        batch,
                        "signature",
                        format!("transaction {}: {}", tx.hash_hex(), Error::SignatureInvalid),
                    );
                }
            }
            None => {
                if batch.signature.is_none() {
                    return inner.reject(batch, "signature", "batch is unsigned".into());
                }
            }
        }

        let digest = batch
            .digest
            .clone()
            .unwrap_or_else(|| batch.compute_digest());
        if inner.by_digest.contains_key(&digest) {
            inner.stats.duplicates += 1;
            inner.record_validation(&digest, "duplicate", false, "digest already staged");
            debug!(%digest, "rejected duplicate batch");
            return Ok((false, Error::Duplicate(digest).to_string()));
        }

        let entry = PoolEntry {
            digest: digest.clone(),
            sender: batch.sender.clone(),
            timestamp: batch.timestamp.clone(),
            signature: batch.signature.clone(),
            encoded: batch.encode()?,
            is_valid: true,
            processed: false,
        };
        inner.persist_entry(&entry)?;
        inner.record_validation(&digest, "admission", true, "");

        let index = inner.entries.len();
        inner.by_digest.insert(digest.clone(), index);
        inner
            .by_sender
            .entry(entry.sender.clone())
            .or_default()
            .push(index);
        inner.entries.push(entry);
        inner.stats.valid_received += 1;
        debug!(%digest, sender = %batch.sender, "staged batch");
        Ok((true, format!("batch {digest} staged")))
    }

    /// Staged batches from one sender, in admission order.
    pub fn by_sender(&self, sender: &str) -> Vec<MultiTransaction> {
        let inner = self.inner.lock();
        inner
            .by_sender
            .get(sender)
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|&index| inner.entries.get(index))
                    .filter_map(decode_entry)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Staged batch with the given digest, if present.
    pub fn by_digest(&self, digest: &str) -> Option<MultiTransaction> {
        let inner = self.inner.lock();
        let index = *inner.by_digest.get(digest)?;
        inner.entries.get(index).and_then(decode_entry)
    }

    /// All staged batches in admission order.
    pub fn all(&self) -> Vec<MultiTransaction> {
        let inner = self.inner.lock();
        inner.entries.iter().filter_map(decode_entry).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.inner.lock().by_digest.contains_key(digest)
    }

    /// Cumulative counters snapshot.
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }

    /// Unlink a staged batch and mark its persisted row processed. Returns
    /// `false` when the digest is unknown.
    pub fn remove(&self, digest: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(index) = inner.by_digest.get(digest).copied() else {
            return Ok(false);
        };
        inner.conn.execute(
            "UPDATE multi_transactions SET processed = 1 WHERE digest = ?1",
            params![digest],
        )?;
        inner.entries.remove(index);
        inner.rebuild_indexes();
        debug!(%digest, "removed staged batch");
        Ok(true)
    }

    /// Drop unprocessed entries older than the configured horizon from both
    /// memory and storage. Returns the number removed.
    pub fn sweep_expired(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let horizon = Utc::now() - ChronoDuration::hours(self.config.max_entry_age_hours as i64);
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|entry| !entry.processed)
            .filter(|entry| match parse_timestamp(&entry.timestamp) {
                Some(stamp) => stamp < horizon,
                None => {
                    warn!(digest = %entry.digest, "entry timestamp is unparseable; keeping");
                    false
                }
            })
            .map(|entry| entry.digest.clone())
            .collect();

        for digest in &expired {
            inner.conn.execute(
                "DELETE FROM multi_transactions WHERE digest = ?1",
                params![digest],
            )?;
        }
        if !expired.is_empty() {
            inner
                .entries
                .retain(|entry| !expired.contains(&entry.digest));
            inner.rebuild_indexes();
            info!(removed = expired.len(), "aged out stale batches");
        }
        Ok(expired.len())
    }

    /// Spawn the background aging task. It sleeps for the configured
    /// interval between sweeps and honours `shutdown` at each sweep
    /// boundary; sweep errors are logged and retried next interval.
    pub fn spawn_aging_task(pool: Arc<TransactionPool>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        let interval = Duration::from_secs(pool.config.cleanup_interval_hours.saturating_mul(3600));
        thread::spawn(move || {
            loop {
                thread::park_timeout(interval);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(err) = pool.sweep_expired() {
                    warn!(%err, "aging sweep failed; retrying next interval");
                }
            }
        })
    }
}

impl PoolInner {
    fn rebuild_indexes(&mut self) {
        self.by_digest.clear();
        self.by_sender.clear();
        for (index, entry) in self.entries.iter().enumerate() {
            self.by_digest.insert(entry.digest.clone(), index);
            self.by_sender
                .entry(entry.sender.clone())
                .or_default()
                .push(index);
        }
    }

    fn reject(
        &mut self,
        batch: &MultiTransaction,
        validation_type: &str,
        reason: String,
    ) -> Result<(bool, String)> {
        self.stats.invalid_received += 1;
        let digest = batch
            .digest
            .clone()
            .unwrap_or_else(|| batch.compute_digest());
        self.record_validation(&digest, validation_type, false, &reason);
        debug!(%digest, %reason, "rejected batch");
        Ok((false, reason))
    }

    fn persist_entry(&self, entry: &PoolEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO multi_transactions \
             (digest, sender, sender_id, timestamp, signature_hex, encoded_blob, \
              is_valid, validation_time, processed) \
             VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                entry.digest,
                entry.sender,
                entry.timestamp,
                entry.signature.as_ref().map(hex::encode),
                entry.encoded,
                entry.is_valid,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    fn record_validation(&self, digest: &str, validation_type: &str, is_valid: bool, message: &str) {
        let outcome = self.conn.execute(
            "INSERT INTO validation_results \
             (digest, validation_type, is_valid, error_message, validation_time) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![digest, validation_type, is_valid, message, now_iso()],
        );
        if let Err(err) = outcome {
            warn!(%digest, %err, "failed to record validation result");
        }
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS multi_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            digest TEXT NOT NULL UNIQUE,
            sender TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            signature_hex TEXT,
            encoded_blob BLOB NOT NULL,
            is_valid INTEGER NOT NULL,
            validation_time TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS validation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            digest TEXT NOT NULL,
            validation_type TEXT NOT NULL,
            is_valid INTEGER NOT NULL,
            error_message TEXT,
            validation_time TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_multi_transactions_sender
            ON multi_transactions(sender);
        CREATE INDEX IF NOT EXISTS idx_multi_transactions_digest
            ON multi_transactions(digest);
        CREATE INDEX IF NOT EXISTS idx_multi_transactions_timestamp
            ON multi_transactions(timestamp);
        CREATE INDEX IF NOT EXISTS idx_validation_results_digest
            ON validation_results(digest);",
    )?;
    Ok(())
}

fn load_unprocessed(conn: &Connection) -> Result<Vec<PoolEntry>> {
    let mut statement = conn.prepare(
        "SELECT digest, sender, timestamp, signature_hex, encoded_blob, is_valid \
         FROM multi_transactions WHERE processed = 0 ORDER BY id",
    )?;
    let rows = statement.query_map([], |row| {
        let signature_hex: Option<String> = row.get(3)?;
        Ok(PoolEntry {
            digest: row.get(0)?,
            sender: row.get(1)?,
            timestamp: row.get(2)?,
            signature: signature_hex.and_then(|sig| hex::decode(sig).ok()),
            encoded: row.get(4)?,
            is_valid: row.get(5)?,
            processed: false,
        })
    })?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn decode_entry(entry: &PoolEntry) -> Option<MultiTransaction> {
    match MultiTransaction::decode(&entry.encoded) {
        Ok(batch) => Some(batch),
        Err(err) => {
            warn!(digest = %entry.digest, %err, "dropping undecodable pool entry");
            None
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|stamp| stamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            value
                .parse::<NaiveDateTime>()
                .ok()
                .map(|stamp| stamp.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_parse_with_and_without_zone() {
        assert!(parse_timestamp("2026-01-02T03:04:05.000006+00:00").is_some());
        assert!(parse_timestamp("2026-01-02T03:04:05.000006").is_some());
        assert!(parse_timestamp("not a time").is_none());
    }
}
