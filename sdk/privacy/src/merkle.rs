//! Merkle Tree for Note Commitments
//!
//! Sparse Merkle tree over commitment leaf hashes. The wallet itself only
//! checks paths handed out by the relay; the simulated relay keeps a full tree.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2   C3  (commitment leaf hashes)
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;

/// Tree depth (supports 2^20 notes)
pub const TREE_DEPTH: usize = 20;

pub type Hash32 = [u8; 32];

const NODE_CONTEXT: &str = "cipherpay merkle node v1";

/// Current root as reported by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleRoot {
    #[serde(with = "hex::serde")]
    pub root: Hash32,
    pub leaf_count: u64,
}

impl MerkleRoot {
    pub fn root_hex(&self) -> String {
        hex::encode(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }
}

/// A Merkle path proving inclusion of a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    #[serde(with = "hex_list")]
    pub siblings: Vec<Hash32>,
    /// Position bits (false = left, true = right)
    pub path_bits: Vec<bool>,
    /// The leaf position
    pub position: u64,
    /// Root the path was computed against
    #[serde(with = "hex::serde")]
    pub root: Hash32,
}

impl MerklePath {
    /// Verify that this path proves inclusion of `leaf` in `root`
    pub fn verify(&self, leaf: &Commitment, root: &Hash32) -> bool {
        if self.siblings.len() != self.path_bits.len() {
            return false;
        }
        let hasher = MerkleHasher::new();
        let computed_root =
            hasher.compute_root_from_path(&leaf.leaf_hash(), &self.siblings, &self.path_bits);
        &computed_root == root
    }

    /// Verify against the root carried by the path itself.
    pub fn verify_own_root(&self, leaf: &Commitment) -> bool {
        self.verify(leaf, &self.root)
    }
}

/// BLAKE3-based Merkle hash function
pub struct MerkleHasher {
    /// Precomputed empty subtree roots at each level
    empty_roots: Vec<Hash32>,
}

impl MerkleHasher {
    pub fn new() -> Self {
        let mut empty_roots = Vec::with_capacity(TREE_DEPTH + 1);
        let mut current = [0u8; 32];
        empty_roots.push(current);
        for _ in 0..TREE_DEPTH {
            current = hash_pair(&current, &current);
            empty_roots.push(current);
        }
        Self { empty_roots }
    }

    /// Hash two children to get parent
    pub fn hash_pair(&self, left: &Hash32, right: &Hash32) -> Hash32 {
        hash_pair(left, right)
    }

    /// Get the empty root at a given depth
    pub fn empty_root(&self, depth: usize) -> &Hash32 {
        &self.empty_roots[depth]
    }

    /// Compute root from leaf and authentication path
    pub fn compute_root_from_path(
        &self,
        leaf: &Hash32,
        siblings: &[Hash32],
        path_bits: &[bool],
    ) -> Hash32 {
        let mut current = *leaf;

        for (sibling, is_right) in siblings.iter().zip(path_bits.iter()) {
            current = if *is_right {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            };
        }

        current
    }
}

impl Default for MerkleHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = blake3::Hasher::new_derive_key(NODE_CONTEXT);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Sparse Merkle Tree for note commitments
///
/// Only non-empty nodes are stored.
pub struct MerkleTree {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), Hash32>,
    /// Leaf position of each inserted commitment
    positions: HashMap<Commitment, u64>,
    next_index: u64,
    hasher: MerkleHasher,
    root: Hash32,
}

impl MerkleTree {
    pub fn new() -> Self {
        let hasher = MerkleHasher::new();
        let root = *hasher.empty_root(TREE_DEPTH);

        Self {
            nodes: HashMap::new(),
            positions: HashMap::new(),
            next_index: 0,
            hasher,
            root,
        }
    }

    pub fn root(&self) -> Hash32 {
        self.root
    }

    /// Number of leaves inserted so far
    pub fn leaf_count(&self) -> u64 {
        self.next_index
    }

    pub fn snapshot(&self) -> MerkleRoot {
        MerkleRoot {
            root: self.root,
            leaf_count: self.next_index,
        }
    }

    /// Insert a commitment and return its position.
    ///
    /// Re-inserting a known commitment returns its existing position.
    pub fn insert(&mut self, commitment: &Commitment) -> u64 {
        if let Some(position) = self.positions.get(commitment) {
            return *position;
        }
        let position = self.next_index;
        self.next_index += 1;
        self.positions.insert(commitment.clone(), position);
        self.update_leaf(position, commitment.leaf_hash());
        position
    }

    fn update_leaf(&mut self, position: u64, leaf: Hash32) {
        self.nodes.insert((0, position), leaf);

        let mut current_index = position;
        let mut current_hash = leaf;

        for level in 0..TREE_DEPTH {
            let is_right = current_index & 1 == 1;
            let sibling = self.sibling(level, current_index);

            current_hash = if is_right {
                self.hasher.hash_pair(&sibling, &current_hash)
            } else {
                self.hasher.hash_pair(&current_hash, &sibling)
            };
            current_index /= 2;

            self.nodes.insert((level + 1, current_index), current_hash);
        }

        self.root = current_hash;
    }

    fn sibling(&self, level: usize, index: u64) -> Hash32 {
        let sibling_index = index ^ 1;
        self.nodes
            .get(&(level, sibling_index))
            .copied()
            .unwrap_or_else(|| *self.hasher.empty_root(level))
    }

    pub fn position_of(&self, commitment: &Commitment) -> Option<u64> {
        self.positions.get(commitment).copied()
    }

    /// Get the Merkle path for a commitment, `None` if it was never inserted.
    pub fn path_for(&self, commitment: &Commitment) -> Option<MerklePath> {
        self.path(self.position_of(commitment)?)
    }

    /// Get Merkle path for a position
    pub fn path(&self, position: u64) -> Option<MerklePath> {
        if position >= self.next_index {
            return None;
        }

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut path_bits = Vec::with_capacity(TREE_DEPTH);
        let mut current_index = position;

        for level in 0..TREE_DEPTH {
            path_bits.push(current_index & 1 == 1);
            siblings.push(self.sibling(level, current_index));
            current_index /= 2;
        }

        Some(MerklePath {
            siblings,
            path_bits,
            position,
            root: self.root,
        })
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.positions.contains_key(commitment)
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Root history for Merkle tree
///
/// Stores recent roots so transfers proven against a slightly stale root
/// are still accepted.
#[derive(Debug, Default)]
pub struct RootHistory {
    /// Recent roots (most recent first)
    roots: Vec<Hash32>,
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: Vec::new(),
            max_size,
        }
    }

    pub fn push(&mut self, root: Hash32) {
        self.roots.insert(0, root);
        if self.roots.len() > self.max_size {
            self.roots.pop();
        }
    }

    /// Check if a root is valid (current or recent)
    pub fn is_valid(&self, root: &Hash32) -> bool {
        self.roots.contains(root)
    }

    pub fn current(&self) -> Option<&Hash32> {
        self.roots.first()
    }
}

mod hex_list {
    use serde::de::Error;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Hash32;

    pub fn serialize<S: Serializer>(items: &[Hash32], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&hex::encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Hash32>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| crate::error::decode_hex32(s).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new();
        assert_eq!(tree.leaf_count(), 0);
        let hasher = MerkleHasher::new();
        assert_eq!(tree.root(), *hasher.empty_root(TREE_DEPTH));
        assert!(tree.snapshot().is_empty());
    }

    #[test]
    fn test_insert_and_path() {
        let mut tree = MerkleTree::new();

        let c1 = Commitment::from("0x01");
        let c2 = Commitment::from("0x02");

        assert_eq!(tree.insert(&c1), 0);
        assert_eq!(tree.insert(&c2), 1);

        let path1 = tree.path_for(&c1).unwrap();
        assert!(path1.verify(&c1, &tree.root()));

        let path2 = tree.path(1).unwrap();
        assert!(path2.verify_own_root(&c2));
    }

    #[test]
    fn test_duplicate_insert_keeps_position() {
        let mut tree = MerkleTree::new();
        let c1 = Commitment::from("0x01");
        tree.insert(&c1);
        let root = tree.root();
        assert_eq!(tree.insert(&c1), 0);
        assert_eq!(tree.root(), root);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_path_invalid_commitment() {
        let mut tree = MerkleTree::new();
        let c1 = Commitment::from("0x01");
        tree.insert(&c1);

        let path = tree.path(0).unwrap();
        assert!(!path.verify(&Commitment::from("0x99"), &tree.root()));
        assert!(tree.path_for(&Commitment::from("0xUNKNOWN")).is_none());
    }

    #[test]
    fn test_root_changes() {
        let mut tree = MerkleTree::new();
        let root0 = tree.root();

        tree.insert(&Commitment::from("0x01"));
        let root1 = tree.root();
        assert_ne!(root0, root1, "root should change after insert");

        tree.insert(&Commitment::from("0x02"));
        assert_ne!(root1, tree.root(), "root should change after each insert");
    }

    #[test]
    fn test_old_path_fails_against_new_root() {
        let mut tree = MerkleTree::new();
        let c1 = Commitment::from("0x01");
        tree.insert(&c1);
        let stale = tree.path_for(&c1).unwrap();
        tree.insert(&Commitment::from("0x02"));
        assert!(stale.verify_own_root(&c1));
        assert!(!stale.verify(&c1, &tree.root()));
    }

    #[test]
    fn test_path_json_roundtrip() {
        let mut tree = MerkleTree::new();
        let c1 = Commitment::from("0x01");
        tree.insert(&c1);
        let path = tree.path_for(&c1).unwrap();
        let json = serde_json::to_string(&path).unwrap();
        let back: MerklePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_root_history() {
        let mut history = RootHistory::new(2);

        history.push([1u8; 32]);
        history.push([2u8; 32]);
        history.push([3u8; 32]);

        assert!(!history.is_valid(&[1u8; 32]), "oldest root evicted");
        assert!(history.is_valid(&[2u8; 32]));
        assert!(history.is_valid(&[3u8; 32]));
        assert_eq!(history.current(), Some(&[3u8; 32]));
    }
}
