//! Batches of single transactions under one aggregate signature.
//!
//! A multi-transaction groups transfers from one sender so the pool and the
//! block layer can treat them as a unit. Its canonical form binds the
//! sender, the batch timestamp, the `multi_transaction` tag, and the ordered
//! child signing forms; the SHA-256 of that form is both the batch identity
//! (the pool digest) and the aggregate signing input.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::hash::sha256_bytes;
use crate::keys;
use crate::transaction::{Transaction, now_iso};
use crate::value::RangeValue;

/// Tag bound into the canonical batch form.
pub const BATCH_TAG: &str = "multi_transaction";

/// A batch of transactions from one sender with one aggregate signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiTransaction {
    pub sender: String,
    /// ISO-8601 batch creation time; part of the digest, so two otherwise
    /// identical batches stamped apart are distinct.
    pub timestamp: String,
    /// Child transactions, all from `sender`.
    pub txs: Vec<Transaction>,
    /// Hex SHA-256 of the canonical batch form, once computed.
    pub digest: Option<String>,
    /// DER-encoded aggregate ECDSA signature, once signed.
    pub signature: Option<Vec<u8>>,
}

impl MultiTransaction {
    /// Group transactions from one sender; rejects empty or mixed batches.
    pub fn new(sender: &str, txs: Vec<Transaction>) -> Result<Self> {
        Self::with_timestamp(sender, txs, now_iso())
    }

    /// Like [`MultiTransaction::new`] with an explicit timestamp.
    pub fn with_timestamp(sender: &str, txs: Vec<Transaction>, timestamp: String) -> Result<Self> {
        let batch = Self {
            sender: sender.into(),
            timestamp,
            txs,
            digest: None,
            signature: None,
        };
        batch.validate_structure()?;
        Ok(batch)
    }

    /// Structural requirements: non-empty, named sender, homogeneous child
    /// senders, children with consistent identity digests and well-formed
    /// values.
    pub fn validate_structure(&self) -> Result<()> {
        if self.txs.is_empty() {
            return Err(Error::EmptyBatch);
        }
        if self.sender.is_empty() {
            return Err(Error::InvalidArgument("batch sender is empty".into()));
        }
        for tx in &self.txs {
            if tx.sender != self.sender {
                return Err(Error::SenderMismatch {
                    expected: self.sender.clone(),
                    found: tx.sender.clone(),
                });
            }
            if !tx.hash_is_consistent() {
                return Err(Error::InvalidArgument(format!(
                    "transaction {} has an inconsistent identity digest",
                    tx.hash_hex()
                )));
            }
            if !tx.values.iter().all(RangeValue::is_well_formed) {
                return Err(Error::InvalidArgument(format!(
                    "transaction {} carries a malformed value",
                    tx.hash_hex()
                )));
            }
        }
        Ok(())
    }

    /// Canonical batch form: sorted keys, compact separators, child
    /// *signing* forms in batch order.
    pub fn canonical_json(&self) -> String {
        json!({
            "sender": self.sender,
            "timestamp": self.timestamp,
            "transactions": self.txs.iter().map(Transaction::signing_value).collect::<Vec<_>>(),
            "type": BATCH_TAG,
        })
        .to_string()
    }

    /// Digest of the current canonical form, without storing it.
    pub fn compute_digest(&self) -> String {
        hex::encode(sha256_bytes(self.canonical_json().as_bytes()))
    }

    /// Recompute and store the batch digest.
    pub fn set_digest(&mut self) {
        self.digest = Some(self.compute_digest());
    }

    /// Recompute the digest and sign it with PEM private-key material,
    /// storing both.
    pub fn sign(&mut self, private_key_pem: &str) -> Result<()> {
        if self.txs.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let digest = sha256_bytes(self.canonical_json().as_bytes());
        self.signature = Some(keys::sign_digest_with_pem(private_key_pem, &digest)?);
        self.digest = Some(hex::encode(digest));
        Ok(())
    }

    /// Verify the aggregate signature under a SubjectPublicKeyInfo PEM key
    /// against the recomputed canonical form. Absent signature or digest is
    /// `false`, never an error.
    pub fn verify(&self, public_key_pem: &str) -> bool {
        let (Some(signature), Some(_)) = (&self.signature, &self.digest) else {
            return false;
        };
        let digest = sha256_bytes(self.canonical_json().as_bytes());
        keys::verify_digest_with_pem(public_key_pem, &digest, signature)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Child transaction by position.
    pub fn get(&self, index: usize) -> Option<&Transaction> {
        self.txs.get(index)
    }

    /// Children in batch order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.txs.iter()
    }

    /// Stable structured encoding preserving sender, timestamp, children,
    /// signature, and digest.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| Error::InvalidArgument(format!("batch encoding failed: {e}")))
    }

    /// Decode a persisted batch blob.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::InvalidArgument(format!("malformed batch blob: {e}")))
    }
}
