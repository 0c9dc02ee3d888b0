//! Partial merkle trees (BIP37 `merkleblock` proofs).
//!
//! The tree over `n` transactions has height `h` = smallest value with
//! `tree_width(h) == 1`. Nodes are visited depth-first, one flag bit each:
//!
//! - bit `0`: the subtree holds nothing of interest, its hash is the next
//!   pruned hash;
//! - bit `1` at a leaf: the next pruned hash is a matched txid;
//! - bit `1` above the leaves: descend left, then right when a right child
//!   exists (otherwise the left hash is reused), and hash the pair.
//!
//! Node hashes are `sha256d(left || right)`.
use bitcoin::{
    hashes::{sha256d, Hash},
    TxMerkleNode, Txid,
};

use crate::error::ProofError;

/// Upper bound on transactions in one block: max block weight over the
/// minimum transaction weight (4_000_000 / 240).
pub const MAX_TRANSACTIONS: u32 = 16_666;

/// A pruned merkle tree plus the traversal bitmap describing it.
///
/// Flag bits are kept padded to a whole number of bytes, exactly as they
/// travel on the wire, so decode/encode is lossless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMerkleTree {
    transaction_count: u32,
    hashes: Vec<sha256d::Hash>,
    flags: Vec<bool>,
}

/// Outcome of a successful [`PartialMerkleTree::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleMatch {
    /// Matched transaction ids, left to right.
    pub matched: Vec<Txid>,
    /// Root recomputed from the proof.
    pub root: TxMerkleNode,
}

impl PartialMerkleTree {
    /// Build the proof for `txids` where `matches[i]` marks the leaves the
    /// receiver should learn about.
    ///
    /// # Panics
    /// When `txids` and `matches` differ in length.
    pub fn from_txids(txids: &[Txid], matches: &[bool]) -> Self {
        assert_eq!(txids.len(), matches.len(), "one match flag per txid");
        let leaves: Vec<sha256d::Hash> = txids.iter().map(|t| t.to_raw_hash()).collect();

        let mut tree = Self {
            transaction_count: txids.len() as u32,
            hashes: Vec::new(),
            flags: Vec::new(),
        };
        if !leaves.is_empty() {
            let height = tree.height();
            tree.build(height, 0, &leaves, matches);
        }
        pad_to_byte(&mut tree.flags);
        tree
    }

    /// Tree from raw parts; `flags` is padded with zero bits to a byte
    /// boundary.
    pub fn from_parts(transaction_count: u32, hashes: Vec<sha256d::Hash>, mut flags: Vec<bool>) -> Self {
        pad_to_byte(&mut flags);
        Self {
            transaction_count,
            hashes,
            flags,
        }
    }

    pub(crate) fn from_wire(transaction_count: u32, hashes: Vec<sha256d::Hash>, flag_bytes: &[u8]) -> Self {
        let flags = flag_bytes
            .iter()
            .flat_map(|byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
            .collect();
        Self {
            transaction_count,
            hashes,
            flags,
        }
    }

    /// Decompose into `(transaction_count, hashes, flags)`.
    pub fn into_parts(self) -> (u32, Vec<sha256d::Hash>, Vec<bool>) {
        (self.transaction_count, self.hashes, self.flags)
    }

    /// Transactions in the full block.
    pub fn transaction_count(&self) -> u32 {
        self.transaction_count
    }

    /// Pruned hashes in traversal order.
    pub fn hashes(&self) -> &[sha256d::Hash] {
        &self.hashes
    }

    /// Traversal bits, byte-padded.
    pub fn flags(&self) -> &[bool] {
        &self.flags
    }

    /// Flag bits packed LSB-first.
    pub fn flag_bytes(&self) -> Vec<u8> {
        self.flags
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &bit)| acc | ((bit as u8) << i))
            })
            .collect()
    }

    /// Height of the implicit tree; 0 for a single transaction.
    pub fn height(&self) -> u32 {
        let mut height = 0;
        while self.width(height) > 1 {
            height += 1;
        }
        height
    }

    fn width(&self, height: u32) -> u32 {
        let n = self.transaction_count as u64;
        ((n + (1u64 << height) - 1) >> height) as u32
    }

    fn build(&mut self, height: u32, pos: u32, leaves: &[sha256d::Hash], matches: &[bool]) {
        let start = (pos as usize) << height;
        let end = (((pos as usize) + 1) << height).min(leaves.len());
        let interesting = matches[start..end].iter().any(|&m| m);
        self.flags.push(interesting);

        if height == 0 || !interesting {
            let hash = self.subtree_hash(height, pos, leaves);
            self.hashes.push(hash);
        } else {
            self.build(height - 1, pos * 2, leaves, matches);
            if pos * 2 + 1 < self.width(height - 1) {
                self.build(height - 1, pos * 2 + 1, leaves, matches);
            }
        }
    }

    fn subtree_hash(&self, height: u32, pos: u32, leaves: &[sha256d::Hash]) -> sha256d::Hash {
        if height == 0 {
            return leaves[pos as usize];
        }
        let left = self.subtree_hash(height - 1, pos * 2, leaves);
        let right = if pos * 2 + 1 < self.width(height - 1) {
            self.subtree_hash(height - 1, pos * 2 + 1, leaves)
        } else {
            left
        };
        parent_hash(&left, &right)
    }

    /// Walk the tree, check that it is well formed, and compare the
    /// recomputed root against `expected_root`.
    pub fn verify(&self, expected_root: TxMerkleNode) -> Result<MerkleMatch, ProofError> {
        let extracted = self.extract()?;
        if extracted.root != expected_root {
            return Err(ProofError::RootMismatch {
                expected: expected_root,
                computed: extracted.root,
            });
        }
        Ok(extracted)
    }

    /// Walk the tree and return the matched txids and recomputed root
    /// without comparing against a header.
    pub fn extract(&self) -> Result<MerkleMatch, ProofError> {
        if self.transaction_count == 0 {
            return Err(ProofError::EmptyTree);
        }
        if self.transaction_count > MAX_TRANSACTIONS {
            return Err(malformed(format!(
                "{} transactions exceeds block bound of {MAX_TRANSACTIONS}",
                self.transaction_count
            )));
        }
        if self.hashes.len() > self.transaction_count as usize {
            return Err(malformed(format!(
                "{} hashes for {} transactions",
                self.hashes.len(),
                self.transaction_count
            )));
        }
        if self.flags.len() < self.hashes.len() {
            return Err(malformed(format!(
                "{} flag bits cannot describe {} hashes",
                self.flags.len(),
                self.hashes.len()
            )));
        }

        let mut cursor = Cursor::default();
        let mut matched = Vec::new();
        let root = self.traverse(self.height(), 0, &mut cursor, &mut matched)?;

        if cursor.hashes != self.hashes.len() {
            return Err(malformed(format!(
                "{} of {} hashes consumed",
                cursor.hashes,
                self.hashes.len()
            )));
        }
        if cursor.flags.div_ceil(8) != self.flags.len().div_ceil(8) {
            return Err(malformed(format!(
                "{} of {} flag bits consumed",
                cursor.flags,
                self.flags.len()
            )));
        }
        if self.flags[cursor.flags..].iter().any(|&bit| bit) {
            return Err(malformed("non-zero padding bits after traversal"));
        }

        Ok(MerkleMatch {
            matched,
            root: TxMerkleNode::from_raw_hash(root),
        })
    }

    fn traverse(
        &self,
        height: u32,
        pos: u32,
        cursor: &mut Cursor,
        matched: &mut Vec<Txid>,
    ) -> Result<sha256d::Hash, ProofError> {
        let interesting = *self
            .flags
            .get(cursor.flags)
            .ok_or_else(|| malformed("ran out of flag bits"))?;
        cursor.flags += 1;

        if height == 0 || !interesting {
            let hash = *self
                .hashes
                .get(cursor.hashes)
                .ok_or_else(|| malformed("ran out of hashes"))?;
            cursor.hashes += 1;
            if height == 0 && interesting {
                matched.push(Txid::from_raw_hash(hash));
            }
            return Ok(hash);
        }

        let matched_before = matched.len();
        let left = self.traverse(height - 1, pos * 2, cursor, matched)?;
        let right = if pos * 2 + 1 < self.width(height - 1) {
            let right = self.traverse(height - 1, pos * 2 + 1, cursor, matched)?;
            // An existing right sibling equal to its left one lets two trees
            // share a root (CVE-2012-2459).
            if right == left {
                return Err(malformed("duplicate sibling hashes"));
            }
            right
        } else {
            left
        };
        if matched.len() == matched_before {
            return Err(malformed(format!(
                "subtree at height {height}, position {pos} is flagged but matches nothing"
            )));
        }
        Ok(parent_hash(&left, &right))
    }
}

/// Positions of the next unread hash and flag bit.
#[derive(Default)]
struct Cursor {
    hashes: usize,
    flags: usize,
}

/// Merkle root over a full, ordered list of txids.
pub fn merkle_root(txids: &[Txid]) -> Option<TxMerkleNode> {
    let mut level: Vec<sha256d::Hash> = txids.iter().map(|t| t.to_raw_hash()).collect();
    if level.is_empty() {
        return None;
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| parent_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    Some(TxMerkleNode::from_raw_hash(level[0]))
}

fn parent_hash(left: &sha256d::Hash, right: &sha256d::Hash) -> sha256d::Hash {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(left.as_ref());
    data.extend_from_slice(right.as_ref());
    sha256d::Hash::hash(&data)
}

fn pad_to_byte(flags: &mut Vec<bool>) {
    let padded = flags.len().div_ceil(8) * 8;
    flags.resize(padded, false);
}

fn malformed(reason: impl Into<String>) -> ProofError {
    ProofError::MalformedProof(reason.into())
}
