//! Single signed transfers of interval coins.
//!
//! A transaction carries two distinct canonical JSON forms, both rendered
//! with sorted keys and compact separators:
//!
//! - the *hashing* form (key `time`, value records **with** `state`) feeds
//!   `tx_hash`, the transaction's identity;
//! - the *signing* form (key `timestamp`, value records **without** `state`)
//!   feeds ECDSA, so lifecycle transitions never invalidate a signature.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::hash::sha256_bytes;
use crate::keys;
use crate::value::RangeValue;

/// Current UTC time as an RFC 3339 string with microsecond precision.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A signed transfer of one or more interval coins from one sender.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub nonce: u64,
    /// ISO-8601 creation time.
    pub timestamp: String,
    /// Coins being transferred, in selection order.
    pub values: Vec<RangeValue>,
    /// DER-encoded ECDSA signature over the signing form, once signed.
    pub signature: Option<Vec<u8>>,
    /// SHA-256 over the hashing form; bound to every field except
    /// `signature` and itself.
    pub tx_hash: [u8; 32],
}

impl Transaction {
    /// Build a transaction stamped with the current time.
    pub fn new(sender: &str, recipient: &str, values: Vec<RangeValue>, nonce: u64) -> Self {
        Self::with_timestamp(sender, recipient, values, nonce, now_iso())
    }

    /// Build a transaction with an explicit timestamp (deterministic
    /// reconstruction, replayed wire data).
    pub fn with_timestamp(
        sender: &str,
        recipient: &str,
        values: Vec<RangeValue>,
        nonce: u64,
        timestamp: String,
    ) -> Self {
        let mut tx = Self {
            sender: sender.into(),
            recipient: recipient.into(),
            nonce,
            timestamp,
            values,
            signature: None,
            tx_hash: [0u8; 32],
        };
        tx.tx_hash = tx.compute_hash();
        tx
    }

    /// Canonical hashing form as a JSON document. Uses key `time` and value
    /// records with `state`; excludes `signature` and `tx_hash`.
    pub fn hashing_value(&self) -> serde_json::Value {
        json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "nonce": self.nonce,
            "time": self.timestamp,
            "value": self.values.iter().map(RangeValue::hashing_record).collect::<Vec<_>>(),
        })
    }

    /// Canonical hashing form rendered to bytes-stable JSON text.
    pub fn hashing_json(&self) -> String {
        self.hashing_value().to_string()
    }

    /// Canonical signing form as a JSON document. Uses key `timestamp` and
    /// value records without `state`.
    pub fn signing_value(&self) -> serde_json::Value {
        json!({
            "sender": self.sender,
            "recipient": self.recipient,
            "nonce": self.nonce,
            "timestamp": self.timestamp,
            "value": self.values.iter().map(RangeValue::signing_record).collect::<Vec<_>>(),
        })
    }

    /// Canonical signing form rendered to bytes-stable JSON text.
    pub fn signing_json(&self) -> String {
        self.signing_value().to_string()
    }

    /// Recompute the identity digest from the current fields.
    pub fn compute_hash(&self) -> [u8; 32] {
        sha256_bytes(self.hashing_json().as_bytes())
    }

    /// Identity digest rendered as lowercase hex.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.tx_hash)
    }

    /// True when the stored identity digest matches the current fields.
    pub fn hash_is_consistent(&self) -> bool {
        self.tx_hash == self.compute_hash()
    }

    /// Sign the canonical signing form with PKCS#8 PEM private-key material.
    pub fn sign(&mut self, private_key_pem: &str) -> Result<()> {
        if self.sender.is_empty() || self.recipient.is_empty() || self.values.is_empty() {
            return Err(Error::InvalidArgument(
                "transaction data is incomplete".into(),
            ));
        }
        if private_key_pem.trim().is_empty() {
            return Err(Error::InvalidArgument("private key PEM is empty".into()));
        }
        let digest = sha256_bytes(self.signing_json().as_bytes());
        self.signature = Some(keys::sign_digest_with_pem(private_key_pem, &digest)?);
        Ok(())
    }

    /// Verify the stored signature under a SubjectPublicKeyInfo PEM key.
    /// A missing signature is `false`, never an error.
    pub fn verify(&self, public_key_pem: &str) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        let digest = sha256_bytes(self.signing_json().as_bytes());
        keys::verify_digest_with_pem(public_key_pem, &digest, signature)
    }

    pub fn is_self_transfer(&self) -> bool {
        self.sender == self.recipient
    }

    /// Number of carried values intersecting `target`.
    pub fn count_values_intersecting(&self, target: &RangeValue) -> usize {
        self.values
            .iter()
            .filter(|value| value.intersects(target))
            .count()
    }

    /// Number of carried values that fully contain `target`.
    pub fn count_values_containing(&self, target: &RangeValue) -> usize {
        self.values
            .iter()
            .filter(|value| value.contains(target))
            .count()
    }

    /// Stable structured encoding for pool persistence and wire transport.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| Error::InvalidArgument(format!("transaction encoding failed: {e}")))
    }

    /// Decode a persisted transaction blob.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::InvalidArgument(format!("malformed transaction blob: {e}")))
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} nonce {} ({} values, hash {})",
            self.sender,
            self.recipient,
            self.nonce,
            self.values.len(),
            self.hash_hex()
        )
    }
}
