//! Merkle tree implementation
//!
//! Commits an ordered batch of serialized transactions to a single root.
//! Leaves are `SHA256(data)`, internal nodes `SHA256(left || right)`. A level
//! with an odd number of nodes duplicates its last node before pairing, so a
//! single leaf is paired with itself.

use super::{hash_bytes, hash_pair, Hash};

/// Merkle tree stored level by level, leaves first, root last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree over `data`. Returns `None` for an empty batch.
    pub fn new<T: AsRef<[u8]>>(data: &[T]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        let leaves: Vec<Hash> = data.iter().map(|d| hash_bytes(d.as_ref())).collect();
        let mut levels = vec![leaves];

        loop {
            let current = levels.last_mut()?;

            // If odd number, duplicate last
            if current.len() % 2 == 1 {
                let last = current[current.len() - 1];
                current.push(last);
            }

            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();

            let done = next.len() == 1;
            levels.push(next);
            if done {
                break;
            }
        }

        Some(Self {
            levels,
            leaf_count: data.len(),
        })
    }

    /// Root of the tree
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(Hash::zero)
    }

    /// Number of levels including leaves and root
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Build an inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.levels.len() - 1);
        let mut current_index = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let is_left = current_index % 2 == 1;
            let sibling_index = if is_left { current_index - 1 } else { current_index + 1 };
            siblings.push((level[sibling_index], is_left));
            current_index /= 2;
        }

        Some(MerkleProof { index, siblings })
    }
}

/// Compute the Merkle root of a batch of serialized items
///
/// An empty batch has no tree; its root is the zero hash.
pub fn compute_merkle_root<T: AsRef<[u8]>>(data: &[T]) -> Hash {
    MerkleTree::new(data)
        .map(|tree| tree.root())
        .unwrap_or_else(Hash::zero)
}

/// Merkle proof for a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Index of the transaction in the block
    pub index: usize,
    /// Sibling hashes from leaf to root
    pub siblings: Vec<(Hash, bool)>, // (hash, is_left)
}

impl MerkleProof {
    /// Verify this proof for the serialized item `data` against a root hash
    pub fn verify(&self, data: &[u8], root: &Hash) -> bool {
        let mut current = hash_bytes(data);

        for (sibling, is_left) in &self.siblings {
            current = if *is_left {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            };
        }

        current == *root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_data(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("tx-{i}").into_bytes()).collect()
    }

    #[test]
    fn test_empty_batch_has_no_tree() {
        let empty: Vec<Vec<u8>> = vec![];
        assert!(MerkleTree::new(&empty).is_none());
        assert_eq!(compute_merkle_root(&empty), Hash::zero());
    }

    #[test]
    fn test_single_element_pairs_with_itself() {
        let data = make_data(1);
        let leaf = hash_bytes(&data[0]);
        assert_eq!(compute_merkle_root(&data), hash_pair(&leaf, &leaf));

        let doubled = vec![data[0].clone(), data[0].clone()];
        assert_eq!(compute_merkle_root(&data), compute_merkle_root(&doubled));
    }

    #[test]
    fn test_two_elements() {
        let data = make_data(2);
        let expected = hash_pair(&hash_bytes(&data[0]), &hash_bytes(&data[1]));
        assert_eq!(compute_merkle_root(&data), expected);
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let data = make_data(3);
        let l: Vec<Hash> = data.iter().map(|d| hash_bytes(d)).collect();
        let expected = hash_pair(&hash_pair(&l[0], &l[1]), &hash_pair(&l[2], &l[2]));
        assert_eq!(compute_merkle_root(&data), expected);
    }

    #[test]
    fn test_odd_count_at_inner_level() {
        // 6 leaves -> 3 nodes -> duplicate -> 2 -> 1
        let data = make_data(6);
        let l: Vec<Hash> = data.iter().map(|d| hash_bytes(d)).collect();
        let a = hash_pair(&l[0], &l[1]);
        let b = hash_pair(&l[2], &l[3]);
        let c = hash_pair(&l[4], &l[5]);
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(compute_merkle_root(&data), expected);
    }

    #[test]
    fn test_order_sensitive() {
        let data = make_data(2);
        let swapped = vec![data[1].clone(), data[0].clone()];
        assert_ne!(compute_merkle_root(&data), compute_merkle_root(&swapped));
    }

    #[test]
    fn test_merkle_proof_verification() {
        for n in 1..=9 {
            let data = make_data(n);
            let tree = MerkleTree::new(&data).unwrap();
            let root = tree.root();

            for (i, item) in data.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(item, &root), "n={n} i={i}");
            }
            assert!(tree.proof(n).is_none());
        }
    }

    #[test]
    fn test_merkle_proof_wrong_data_fails() {
        let data = make_data(8);
        let tree = MerkleTree::new(&data).unwrap();
        let proof = tree.proof(0).unwrap();

        assert!(!proof.verify(b"wrong", &tree.root()));
    }
}
