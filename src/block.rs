//! Chain blocks and their canonical header.
//!
//! The canonical header is a line-terminated text rendering of every header
//! field except the signature; the block hash is its SHA-256 and the block
//! signature is ECDSA over the same bytes. The signature travels in a
//! `{signature, miner_id, timestamp, public_key}` envelope. A genesis block
//! (`index = 0`) carries no signature and always passes the signature check.

use serde::{Deserialize, Serialize};

use crate::bloom::{BloomConfig, BloomFilter};
use crate::error::Result;
use crate::hash::{sha256_bytes, sha256_hex};
use crate::keys::{self, Keypair};
use crate::transaction::now_iso;

/// Default header version.
pub const BLOCK_VERSION: u32 = 1;

/// Signature envelope carried next to the header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    /// DER-encoded ECDSA signature over the canonical header, hex rendered.
    pub signature: String,
    pub miner_id: String,
    /// Signing time, distinct from the header timestamp.
    pub timestamp: String,
    /// SubjectPublicKeyInfo PEM of the signing key.
    pub public_key: String,
}

/// A block: header fields plus the Bloom index over batch senders.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: String,
    pub miner: String,
    pub timestamp: String,
    pub nonce: u64,
    pub merkle_root: String,
    pub version: u32,
    pub bloom: BloomFilter,
    pub signature: Option<BlockSignature>,
}

impl Block {
    /// Unsigned block with a fresh Bloom filter.
    pub fn new(
        index: u64,
        merkle_root: &str,
        miner: &str,
        previous_hash: &str,
        bloom: BloomConfig,
        timestamp: String,
    ) -> Self {
        Self {
            index,
            previous_hash: previous_hash.into(),
            miner: miner.into(),
            timestamp,
            nonce: 0,
            merkle_root: merkle_root.into(),
            version: BLOCK_VERSION,
            bloom: BloomFilter::with_config(bloom),
            signature: None,
        }
    }

    /// Genesis block: index zero, empty root, no signature.
    pub fn genesis(miner: &str) -> Self {
        Self::new(0, "", miner, "0", BloomConfig::default(), now_iso())
    }

    /// Canonical header: line-terminated fields, signature excluded.
    pub fn header_string(&self) -> String {
        format!(
            "Index: {}\nNonce: {}\nBloom: {}\nMerkle Tree Root: {}\nTime: {}\nMiner: {}\nPrevious Hash: {}\nVersion: {}\n",
            self.index,
            self.nonce,
            self.bloom,
            self.merkle_root,
            self.timestamp,
            self.miner,
            self.previous_hash,
            self.version,
        )
    }

    /// SHA-256 of the canonical header, as lowercase hex.
    pub fn hash(&self) -> String {
        sha256_hex(self.header_string().as_bytes())
    }

    /// Sign the canonical header with the miner's key. Genesis blocks stay
    /// unsigned.
    pub fn sign(&mut self, private_key_pem: &str) -> Result<()> {
        if self.index == 0 {
            return Ok(());
        }
        let keypair = Keypair::from_private_key_pem(private_key_pem)?;
        let digest = sha256_bytes(self.header_string().as_bytes());
        self.signature = Some(BlockSignature {
            signature: hex::encode(keypair.sign_digest(&digest)),
            miner_id: self.miner.clone(),
            timestamp: now_iso(),
            public_key: keypair.public_key_pem(),
        });
        Ok(())
    }

    /// Header signature check. Genesis is accepted unconditionally; any
    /// other block must carry an envelope whose signature verifies over the
    /// recomputed header under the envelope's key. Never errors.
    pub fn verify_signature(&self) -> bool {
        if self.index == 0 {
            return true;
        }
        let Some(envelope) = &self.signature else {
            return false;
        };
        let Ok(signature) = hex::decode(&envelope.signature) else {
            return false;
        };
        let digest = sha256_bytes(self.header_string().as_bytes());
        keys::verify_digest_with_pem(&envelope.public_key, &digest, &signature)
    }

    /// Parent linkage: `child` must carry the next index and this block's
    /// hash.
    pub fn is_valid_next(&self, child: &Block) -> bool {
        child.index == self.index + 1 && child.previous_hash == self.hash()
    }

    /// Record a batch sender in the block's Bloom index.
    pub fn add_to_bloom(&mut self, item: &str) {
        self.bloom.insert(item);
    }

    /// Probabilistic sender membership; false positives possible.
    pub fn bloom_contains(&self, item: &str) -> bool {
        self.bloom.contains(item)
    }

    /// Short display line.
    pub fn summary(&self) -> String {
        format!("Index: {}, Miner: {}", self.index, self.miner)
    }
}
