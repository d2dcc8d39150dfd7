//! Selection of staged batches into block packages.
//!
//! The assembler drains the pool under a selection strategy, commits to the
//! selected batch digests with a Merkle root, records the distinct senders
//! for the block's Bloom index, and signs the finished header with the
//! miner's key.

use tracing::{debug, info};

use crate::batch::MultiTransaction;
use crate::block::Block;
use crate::bloom::BloomConfig;
use crate::error::{Error, Result};
use crate::hash::sha256_hex;
use crate::merkle::MerkleTree;
use crate::pool::TransactionPool;
use crate::transaction::now_iso;

/// Order in which staged batches are drained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Pool admission order.
    #[default]
    Fifo,
    /// Descending child count, a proxy for carried fees.
    Fee,
}

/// Assembler configuration.
#[derive(Clone, Copy, Debug)]
pub struct AssemblerConfig {
    pub max_batches_per_block: usize,
    pub strategy: SelectionStrategy,
    pub bloom: BloomConfig,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_batches_per_block: 100,
            strategy: SelectionStrategy::Fifo,
            bloom: BloomConfig::default(),
        }
    }
}

/// Batches selected for one block plus the commitments derived from them.
#[derive(Clone, Debug)]
pub struct BlockPackage {
    pub batches: Vec<MultiTransaction>,
    /// Merkle root over the batch digests; empty for an empty selection.
    pub merkle_root: String,
    /// Distinct senders in first-seen order.
    pub sender_addresses: Vec<String>,
    pub timestamp: String,
}

/// Summary counters for a package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackageStats {
    pub batch_count: usize,
    pub transaction_count: usize,
    pub unique_senders: usize,
}

/// Builds block packages from the pool and blocks from packages.
pub struct BlockAssembler {
    config: AssemblerConfig,
}

impl BlockAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(AssemblerConfig::default())
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Select staged batches under the configured strategy and derive the
    /// package commitments. An empty pool yields an empty-root package.
    pub fn package(&self, pool: &TransactionPool) -> BlockPackage {
        let mut batches = pool.all();
        if self.config.strategy == SelectionStrategy::Fee {
            // Stable sort: ties keep admission order.
            batches.sort_by(|a, b| b.len().cmp(&a.len()));
        }
        batches.truncate(self.config.max_batches_per_block);

        let mut sender_addresses: Vec<String> = Vec::new();
        for batch in &batches {
            if !batch.sender.is_empty() && !sender_addresses.contains(&batch.sender) {
                sender_addresses.push(batch.sender.clone());
            }
        }

        let leaves: Vec<String> = batches.iter().map(batch_leaf).collect();
        let merkle_root = if leaves.is_empty() {
            String::new()
        } else {
            MerkleTree::new(&leaves)
                .expect("leaf set is non-empty")
                .root_hash()
                .to_owned()
        };

        debug!(
            batches = batches.len(),
            senders = sender_addresses.len(),
            "packaged staged batches"
        );
        BlockPackage {
            batches,
            merkle_root,
            sender_addresses,
            timestamp: now_iso(),
        }
    }

    /// Build a block around a package, inserting every sender into the
    /// Bloom index. Non-genesis blocks are signed with the miner's key.
    pub fn build_block(
        &self,
        package: &BlockPackage,
        miner: &str,
        previous_hash: &str,
        index: u64,
        miner_key_pem: Option<&str>,
    ) -> Result<Block> {
        let mut block = Block::new(
            index,
            &package.merkle_root,
            miner,
            previous_hash,
            self.config.bloom,
            package.timestamp.clone(),
        );
        for sender in &package.sender_addresses {
            block.add_to_bloom(sender);
        }
        if index != 0 {
            let key = miner_key_pem.ok_or_else(|| {
                Error::InvalidArgument("non-genesis blocks require the miner's signing key".into())
            })?;
            block.sign(key)?;
        }
        Ok(block)
    }

    /// Remove every packaged batch from the pool by digest. The returned
    /// count can fall short of the selection when another thread removed a
    /// batch first.
    pub fn finalize(&self, pool: &TransactionPool, package: &BlockPackage) -> Result<usize> {
        let mut removed = 0;
        for batch in &package.batches {
            let digest = batch
                .digest
                .clone()
                .unwrap_or_else(|| batch.compute_digest());
            if pool.remove(&digest)? {
                removed += 1;
            }
        }
        info!(
            removed,
            selected = package.batches.len(),
            "finalized block package"
        );
        Ok(removed)
    }

    /// Summary counters for a package.
    pub fn package_stats(&self, package: &BlockPackage) -> PackageStats {
        PackageStats {
            batch_count: package.batches.len(),
            transaction_count: package.batches.iter().map(MultiTransaction::len).sum(),
            unique_senders: package.sender_addresses.len(),
        }
    }
}

/// Merkle leaf for a batch: its digest, or the hash of its encoding when no
/// digest has been computed.
fn batch_leaf(batch: &MultiTransaction) -> String {
    match &batch.digest {
        Some(digest) => digest.clone(),
        None => sha256_hex(&batch.encode().unwrap_or_default()),
    }
}
