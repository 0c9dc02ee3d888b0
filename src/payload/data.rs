use std::fmt;

use bitcoin::{
    block,
    consensus::encode,
    hashes::{sha256d, Hash},
    BlockHash, Txid,
};

use super::{MAX_HEADERS, MAX_INV_ENTRIES};
use crate::{
    codec::{write_hash, write_var_bytes, Reader},
    compact_size,
    error::WireError,
    merkle::{PartialMerkleTree, MAX_TRANSACTIONS},
};

/// Size of a consensus-encoded block header.
const BLOCK_HEADER_SIZE: usize = 80;

/// Kind of object an [`Inventory`] entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryType {
    /// `ERROR` (0): carries no object.
    Error,
    /// `MSG_TX` (1).
    Tx,
    /// `MSG_BLOCK` (2).
    Block,
    /// `MSG_FILTERED_BLOCK` (3): ask for a `merkleblock`.
    FilteredBlock,
    /// `MSG_CMPCT_BLOCK` (4).
    CompactBlock,
    /// `MSG_WITNESS_TX`.
    WitnessTx,
    /// `MSG_WITNESS_BLOCK`.
    WitnessBlock,
    /// `MSG_FILTERED_WITNESS_BLOCK`.
    FilteredWitnessBlock,
    /// Any other value, kept so the entry re-encodes unchanged.
    Unknown(u32),
}

const WITNESS_FLAG: u32 = 1 << 30;

impl InventoryType {
    /// Map a wire value to its type.
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => InventoryType::Error,
            1 => InventoryType::Tx,
            2 => InventoryType::Block,
            3 => InventoryType::FilteredBlock,
            4 => InventoryType::CompactBlock,
            v if v == WITNESS_FLAG | 1 => InventoryType::WitnessTx,
            v if v == WITNESS_FLAG | 2 => InventoryType::WitnessBlock,
            v if v == WITNESS_FLAG | 3 => InventoryType::FilteredWitnessBlock,
            other => InventoryType::Unknown(other),
        }
    }

    /// Wire value.
    pub fn to_u32(self) -> u32 {
        match self {
            InventoryType::Error => 0,
            InventoryType::Tx => 1,
            InventoryType::Block => 2,
            InventoryType::FilteredBlock => 3,
            InventoryType::CompactBlock => 4,
            InventoryType::WitnessTx => WITNESS_FLAG | 1,
            InventoryType::WitnessBlock => WITNESS_FLAG | 2,
            InventoryType::FilteredWitnessBlock => WITNESS_FLAG | 3,
            InventoryType::Unknown(v) => v,
        }
    }

    /// Entry names a transaction.
    pub fn is_transaction(self) -> bool {
        matches!(self, InventoryType::Tx | InventoryType::WitnessTx)
    }

    /// Entry names a block in any of its forms.
    pub fn is_block(self) -> bool {
        matches!(
            self,
            InventoryType::Block
                | InventoryType::FilteredBlock
                | InventoryType::CompactBlock
                | InventoryType::WitnessBlock
                | InventoryType::FilteredWitnessBlock
        )
    }
}

/// A `(type, hash)` pair: 4-byte LE type followed by the 32-byte hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inventory {
    /// What the hash names.
    pub kind: InventoryType,
    /// Object hash in internal byte order.
    pub hash: sha256d::Hash,
}

impl Inventory {
    /// Wire size of one entry.
    pub const SIZE: usize = 36;

    /// Entry from parts.
    pub fn new(kind: InventoryType, hash: sha256d::Hash) -> Self {
        Self { kind, hash }
    }

    /// `MSG_TX` entry for `txid`.
    pub fn transaction(txid: Txid) -> Self {
        Self::new(InventoryType::Tx, txid.to_raw_hash())
    }

    /// `MSG_FILTERED_BLOCK` entry for `block`.
    pub fn filtered_block(block: BlockHash) -> Self {
        Self::new(InventoryType::FilteredBlock, block.to_raw_hash())
    }

    /// Hash viewed as a transaction id.
    pub fn txid(&self) -> Txid {
        Txid::from_raw_hash(self.hash)
    }

    /// Hash viewed as a block hash.
    pub fn block_hash(&self) -> BlockHash {
        BlockHash::from_raw_hash(self.hash)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let kind = InventoryType::from_u32(r.u32("inventory type")?);
        let hash = r.hash("inventory hash")?;
        Ok(Self { kind, hash })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.kind.to_u32().to_le_bytes());
        write_hash(out, &self.hash);
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.hash)
    }
}

pub(super) fn decode_inventory(r: &mut Reader<'_>) -> Result<Vec<Inventory>, WireError> {
    let n = r.count("inventory count", MAX_INV_ENTRIES, Inventory::SIZE)?;
    (0..n).map(|_| Inventory::decode(r)).collect()
}

pub(super) fn encode_inventory(items: &[Inventory], out: &mut Vec<u8>) {
    compact_size::write(out, items.len() as u64);
    for item in items {
        item.encode(out);
    }
}

/// Body shared by `getblocks` and `getheaders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocatorMessage {
    /// Sender's protocol version.
    pub version: u32,
    /// Known block hashes, newest first.
    pub locator_hashes: Vec<BlockHash>,
    /// Last block wanted, or all zeros for "as many as allowed".
    pub stop_hash: BlockHash,
}

impl BlockLocatorMessage {
    pub(super) fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let version = r.u32("version")?;
        let n = r.count("locator count", MAX_HEADERS, 32)?;
        let locator_hashes = (0..n)
            .map(|_| r.hash("locator hash").map(BlockHash::from_raw_hash))
            .collect::<Result<_, _>>()?;
        let stop_hash = BlockHash::from_raw_hash(r.hash("stop hash")?);
        Ok(Self {
            version,
            locator_hashes,
            stop_hash,
        })
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        compact_size::write(out, self.locator_hashes.len() as u64);
        for hash in &self.locator_hashes {
            out.extend_from_slice(&hash.to_byte_array());
        }
        out.extend_from_slice(&self.stop_hash.to_byte_array());
    }
}

pub(super) fn decode_headers(r: &mut Reader<'_>) -> Result<Vec<block::Header>, WireError> {
    let n = r.count("header count", MAX_HEADERS, BLOCK_HEADER_SIZE + 1)?;
    let mut headers = Vec::with_capacity(n);
    for _ in 0..n {
        headers.push(r.consensus::<block::Header>("header")?);
        let tx_count = r.compact_size("header tx count")?;
        if tx_count != 0 {
            return Err(r.error(format!("header carries tx count {tx_count}, expected 0")));
        }
    }
    Ok(headers)
}

pub(super) fn encode_headers(headers: &[block::Header], out: &mut Vec<u8>) {
    compact_size::write(out, headers.len() as u64);
    for header in headers {
        out.extend(encode::serialize(header));
        out.push(0);
    }
}

/// `merkleblock`: a block header plus the partial merkle tree proving which
/// of its transactions matched the peer's filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlockMessage {
    /// Header whose `merkle_root` the tree must reproduce.
    pub header: block::Header,
    /// Pruned tree; carries the block's transaction count.
    pub tree: PartialMerkleTree,
}

impl MerkleBlockMessage {
    /// Transactions in the full block.
    pub fn transaction_count(&self) -> u32 {
        self.tree.transaction_count()
    }

    pub(super) fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let header = r.consensus::<block::Header>("header")?;
        let transaction_count = r.u32("transaction count")?;
        let n = r.count("hash count", MAX_TRANSACTIONS as usize, 32)?;
        let hashes = (0..n)
            .map(|_| r.hash("tree hash"))
            .collect::<Result<Vec<_>, _>>()?;
        let flag_bytes = r.var_bytes("flag bytes", MAX_TRANSACTIONS as usize)?;
        Ok(Self {
            header,
            tree: PartialMerkleTree::from_wire(transaction_count, hashes, &flag_bytes),
        })
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) {
        out.extend(encode::serialize(&self.header));
        out.extend_from_slice(&self.tree.transaction_count().to_le_bytes());
        compact_size::write(out, self.tree.hashes().len() as u64);
        for hash in self.tree.hashes() {
            write_hash(out, hash);
        }
        write_var_bytes(out, &self.tree.flag_bytes());
    }
}
