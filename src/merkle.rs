//! Merkle commitments over batch digests.
//!
//! Leaves are SHA-256 hashes of the input payloads; internal nodes hash the
//! concatenation of their children's hex digests. Levels fold pairs front to
//! back, and an odd trailing element is carried to the end of the next level
//! rather than duplicated. Each leaf remembers its position so the tree can
//! emit inclusion proofs of the form
//! `[leaf_hash, sibling_0, parent_0, ..., root]`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::sha256_hex;

#[derive(Clone, Debug)]
struct TreeNode {
    hash: String,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
}

/// Binary hash tree with per-leaf proof emission.
pub struct MerkleTree {
    nodes: Vec<TreeNode>,
    payloads: Vec<Vec<u8>>,
    leaves: Vec<usize>,
    root: usize,
}

impl MerkleTree {
    /// Build a tree over the payloads' SHA-256 leaf hashes.
    #[allow(clippy::indexing_slicing)]
    pub fn new<T: AsRef<[u8]>>(payloads: &[T]) -> Result<Self> {
        let (mut nodes, stored, leaves) = Self::leaf_nodes(payloads)?;

        let mut level: Vec<usize> = leaves.clone();
        while level.len() > 1 {
            let mut next: Vec<usize> = Vec::with_capacity(level.len() / 2 + 1);
            let mut pairs = level.chunks_exact(2);
            for pair in pairs.by_ref() {
                let (l, r) = (pair[0], pair[1]);
                let parent_hash =
                    sha256_hex(format!("{}{}", nodes[l].hash, nodes[r].hash).as_bytes());
                let parent = nodes.len();
                nodes.push(TreeNode {
                    hash: parent_hash,
                    left: Some(l),
                    right: Some(r),
                    parent: None,
                });
                nodes[l].parent = Some(parent);
                nodes[r].parent = Some(parent);
                next.push(parent);
            }
            // Odd trailing element: carried up unpaired, behind the parents.
            if let Some(&leftover) = pairs.remainder().first() {
                next.push(leftover);
            }
            level = next;
        }

        let root = level[0];
        Ok(Self {
            nodes,
            payloads: stored,
            leaves,
            root,
        })
    }

    /// Genesis construction: the first leaf hash is the root, whatever the
    /// payload count.
    #[allow(clippy::indexing_slicing)]
    pub fn genesis<T: AsRef<[u8]>>(payloads: &[T]) -> Result<Self> {
        let (nodes, stored, leaves) = Self::leaf_nodes(payloads)?;
        let root = leaves[0];
        Ok(Self {
            nodes,
            payloads: stored,
            leaves,
            root,
        })
    }

    fn leaf_nodes<T: AsRef<[u8]>>(
        payloads: &[T],
    ) -> Result<(Vec<TreeNode>, Vec<Vec<u8>>, Vec<usize>)> {
        if payloads.is_empty() {
            return Err(Error::InvalidArgument(
                "merkle tree requires at least one payload".into(),
            ));
        }
        let nodes: Vec<TreeNode> = payloads
            .iter()
            .map(|payload| TreeNode {
                hash: sha256_hex(payload.as_ref()),
                left: None,
                right: None,
                parent: None,
            })
            .collect();
        let stored = payloads.iter().map(|p| p.as_ref().to_vec()).collect();
        let leaves = (0..nodes.len()).collect();
        Ok((nodes, stored, leaves))
    }

    /// Root digest as lowercase hex.
    pub fn root_hash(&self) -> &str {
        &self.nodes[self.root].hash
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Inclusion proof for the leaf at `leaf_index`, or `None` when the
    /// index is out of range.
    pub fn proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        let &leaf = self.leaves.get(leaf_index)?;
        let mut path = vec![self.nodes.get(leaf)?.hash.clone()];
        let mut cursor = leaf;
        while let Some(parent) = self.nodes.get(cursor)?.parent {
            let node = self.nodes.get(parent)?;
            let sibling = if node.left == Some(cursor) {
                node.right
            } else {
                node.left
            }?;
            path.push(self.nodes.get(sibling)?.hash.clone());
            path.push(node.hash.clone());
            cursor = parent;
        }
        Some(MerkleProof { path })
    }

    /// Recompute every node bottom-up and compare with the stored values.
    pub fn check_tree(&self) -> bool {
        let leaves_ok = self.leaves.iter().zip(&self.payloads).all(|(&leaf, payload)| {
            self.nodes
                .get(leaf)
                .is_some_and(|node| node.hash == sha256_hex(payload))
        });
        // Parents always sit behind their children in the arena, so a single
        // forward pass recomputes bottom-up.
        let internal_ok = self.nodes.iter().all(|node| match (node.left, node.right) {
            (Some(l), Some(r)) => {
                let (Some(left), Some(right)) = (self.nodes.get(l), self.nodes.get(r)) else {
                    return false;
                };
                node.hash == sha256_hex(format!("{}{}", left.hash, right.hash).as_bytes())
            }
            _ => true,
        });
        leaves_ok && internal_ok
    }
}

/// Inclusion proof: `[leaf_hash, sibling_0, parent_0, ..., root]` as hex
/// digests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub path: Vec<String>,
}

impl MerkleProof {
    /// Check the proof for `payload` against a claimed root.
    ///
    /// A single-element proof is valid iff leaf, root, and payload hash all
    /// agree. Longer proofs must have odd length, start at the payload's
    /// leaf hash, chain every `(sibling, parent)` step in either
    /// concatenation order, and end at the claimed root. Never errors.
    #[allow(clippy::indexing_slicing)]
    pub fn verify(&self, payload: &[u8], root: &str) -> bool {
        let leaf_hash = sha256_hex(payload);
        match self.path.as_slice() {
            [] => false,
            [only] => only == &leaf_hash && only == root,
            path => {
                if path.len() % 2 == 0 || path[0] != leaf_hash {
                    return false;
                }
                let mut current = path[0].clone();
                for step in path[1..].chunks_exact(2) {
                    let (sibling, parent) = (&step[0], &step[1]);
                    let forward = sha256_hex(format!("{current}{sibling}").as_bytes());
                    let reversed = sha256_hex(format!("{sibling}{current}").as_bytes());
                    if forward != *parent && reversed != *parent {
                        return false;
                    }
                    current = parent.clone();
                }
                current == root
            }
        }
    }
}
