//! Sorted-pair Merkle tree over the pending transfer set
//!
//! Internal nodes hash the concatenation of the smaller child followed by the
//! larger one, so a proof verifies without left/right position bits and does
//! not depend on leaf insertion order. Leaves are sorted before building so
//! the root is stable across map iteration orders. An odd node at any level
//! is promoted unchanged. The tree is ephemeral: every rebuild starts from a
//! fresh snapshot of the pending set.

use crate::hash::keccak256;

/// Merkle proof: sibling hashes from leaf level to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub siblings: Vec<[u8; 32]>,
}

impl MerkleProof {
    pub fn hashes(&self) -> &[[u8; 32]] {
        &self.siblings
    }
}

/// Sorted-pair Merkle tree. Stores every level; level 0 is the sorted leaves.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    levels: Vec<Vec<[u8; 32]>>,
}

/// Hash a sorted pair: `keccak256(min(a,b) || max(a,b))`.
fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    if a <= b {
        data[..32].copy_from_slice(a);
        data[32..].copy_from_slice(b);
    } else {
        data[..32].copy_from_slice(b);
        data[32..].copy_from_slice(a);
    }
    keccak256(&data)
}

impl MerkleTree {
    /// Build a tree from leaves. The input order is irrelevant; leaves are
    /// sorted before hashing.
    pub fn from_leaves(mut leaves: Vec<[u8; 32]>) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }
        leaves.sort_unstable();

        let mut levels = vec![leaves];
        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let prev = levels.last().expect("non-empty levels");
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            for pair in prev.chunks(2) {
                match pair {
                    [a, b] => next.push(hash_pair(a, b)),
                    // Odd node: promoted unchanged.
                    [a] => next.push(*a),
                    _ => unreachable!(),
                }
            }
            levels.push(next);
        }

        Self { levels }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(|l| l.len()).unwrap_or(0)
    }

    /// Root hash. The empty tree's root is 32 zero bytes, matching the
    /// contract's unset `merkleRoot`.
    pub fn root(&self) -> [u8; 32] {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    /// Root as a 0x-prefixed hex string.
    pub fn root_hex(&self) -> String {
        crate::hash::bytes32_to_hex(&self.root())
    }

    /// Generate a membership proof for a leaf, or `None` if absent.
    pub fn proof(&self, leaf: &[u8; 32]) -> Option<MerkleProof> {
        let leaves = self.levels.first()?;
        // Leaves are sorted, so binary search finds the position.
        let mut index = leaves.binary_search(leaf).ok()?;

        let mut siblings = Vec::new();
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = index ^ 1;
            if let Some(sibling) = level.get(sibling_index) {
                siblings.push(*sibling);
            }
            // A promoted odd node keeps its hash and halves its index.
            index /= 2;
        }

        Some(MerkleProof { siblings })
    }

    /// Verify a proof against this tree's root.
    pub fn verify(&self, leaf: &[u8; 32], proof: &MerkleProof) -> bool {
        verify_proof(leaf, proof, &self.root())
    }
}

/// Verify a sorted-pair proof against an arbitrary root.
pub fn verify_proof(leaf: &[u8; 32], proof: &MerkleProof, root: &[u8; 32]) -> bool {
    let mut acc = *leaf;
    for sibling in &proof.siblings {
        acc = hash_pair(&acc, sibling);
    }
    acc == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> [u8; 32] {
        keccak256(&[n])
    }

    #[test]
    fn test_empty_tree_root_is_zero() {
        let tree = MerkleTree::from_leaves(vec![]);
        assert!(tree.is_empty());
        assert_eq!(tree.root(), [0u8; 32]);
        assert_eq!(tree.root_hex(), format!("0x{}", "0".repeat(64)));
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let l = leaf(1);
        let tree = MerkleTree::from_leaves(vec![l]);
        assert_eq!(tree.root(), l);

        let proof = tree.proof(&l).expect("proof for sole leaf");
        assert!(proof.siblings.is_empty());
        assert!(tree.verify(&l, &proof));
    }

    #[test]
    fn test_proof_round_trip_all_leaves() {
        for count in 1..=9usize {
            let leaves: Vec<_> = (0..count as u8).map(leaf).collect();
            let tree = MerkleTree::from_leaves(leaves.clone());
            for l in &leaves {
                let proof = tree.proof(l).expect("leaf must be provable");
                assert!(tree.verify(l, &proof), "count={} leaf failed", count);
            }
        }
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let forward: Vec<_> = (0..7u8).map(leaf).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = MerkleTree::from_leaves(forward);
        let b = MerkleTree::from_leaves(reversed);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_wrong_leaf_fails_verification() {
        let leaves: Vec<_> = (0..4u8).map(leaf).collect();
        let tree = MerkleTree::from_leaves(leaves.clone());

        let proof = tree.proof(&leaves[1]).unwrap();
        let intruder = leaf(99);
        assert!(!tree.verify(&intruder, &proof));
    }

    #[test]
    fn test_wrong_root_fails_verification() {
        let leaves: Vec<_> = (0..4u8).map(leaf).collect();
        let tree = MerkleTree::from_leaves(leaves.clone());
        let proof = tree.proof(&leaves[0]).unwrap();

        assert!(!verify_proof(&leaves[0], &proof, &[0xaa; 32]));
    }

    #[test]
    fn test_absent_leaf_has_no_proof() {
        let tree = MerkleTree::from_leaves((0..4u8).map(leaf).collect());
        assert!(tree.proof(&leaf(200)).is_none());
    }

    #[test]
    fn test_rebuild_after_removal_excludes_leaf() {
        let leaves: Vec<_> = (0..5u8).map(leaf).collect();
        let full = MerkleTree::from_leaves(leaves.clone());
        let removed = leaves[2];
        let proof = full.proof(&removed).unwrap();

        let remaining: Vec<_> = leaves.into_iter().filter(|l| *l != removed).collect();
        let rebuilt = MerkleTree::from_leaves(remaining);

        assert_ne!(full.root(), rebuilt.root());
        assert!(rebuilt.proof(&removed).is_none());
        assert!(!rebuilt.verify(&removed, &proof));
    }

    #[test]
    fn test_large_tree() {
        let leaves: Vec<_> = (0..=255u8).map(leaf).collect();
        let tree = MerkleTree::from_leaves(leaves.clone());
        assert_eq!(tree.leaf_count(), 256);

        let proof = tree.proof(&leaves[137]).unwrap();
        assert_eq!(proof.siblings.len(), 8);
        assert!(tree.verify(&leaves[137], &proof));
    }
}
