//! The payload catalog: one enum variant per command, decoded by an
//! exhaustive match on [`Command`].
use bitcoin::{block, Block, Transaction};

use crate::{
    codec::Reader,
    compact_size::CompactSizeMode,
    error::WireError,
};

mod control;
mod data;

pub use control::{
    BloomFlags, FilterAddMessage, FilterLoadMessage, NetAddress, RejectCode, RejectMessage,
    TimestampedAddress, VersionMessage,
};
pub use data::{BlockLocatorMessage, Inventory, InventoryType, MerkleBlockMessage};

/// Every command name the codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `block`
    Block,
    /// `tx`
    Tx,
    /// `headers`
    Headers,
    /// `inv`
    Inv,
    /// `getdata`
    GetData,
    /// `getblocks`
    GetBlocks,
    /// `getheaders`
    GetHeaders,
    /// `merkleblock`
    MerkleBlock,
    /// `notfound`
    NotFound,
    /// `mempool`
    MemPool,
    /// `version`
    Version,
    /// `verack`
    Verack,
    /// `ping`
    Ping,
    /// `pong`
    Pong,
    /// `addr`
    Addr,
    /// `getaddr`
    GetAddr,
    /// `filteradd`
    FilterAdd,
    /// `filterclear`
    FilterClear,
    /// `filterload`
    FilterLoad,
    /// `reject`
    Reject,
    /// `sendheaders`
    SendHeaders,
}

impl Command {
    /// Resolve a header's command name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "block" => Command::Block,
            "tx" => Command::Tx,
            "headers" => Command::Headers,
            "inv" => Command::Inv,
            "getdata" => Command::GetData,
            "getblocks" => Command::GetBlocks,
            "getheaders" => Command::GetHeaders,
            "merkleblock" => Command::MerkleBlock,
            "notfound" => Command::NotFound,
            "mempool" => Command::MemPool,
            "version" => Command::Version,
            "verack" => Command::Verack,
            "ping" => Command::Ping,
            "pong" => Command::Pong,
            "addr" => Command::Addr,
            "getaddr" => Command::GetAddr,
            "filteradd" => Command::FilterAdd,
            "filterclear" => Command::FilterClear,
            "filterload" => Command::FilterLoad,
            "reject" => Command::Reject,
            "sendheaders" => Command::SendHeaders,
            _ => return None,
        })
    }

    /// Wire name of this command.
    pub fn name(self) -> &'static str {
        match self {
            Command::Block => "block",
            Command::Tx => "tx",
            Command::Headers => "headers",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::GetBlocks => "getblocks",
            Command::GetHeaders => "getheaders",
            Command::MerkleBlock => "merkleblock",
            Command::NotFound => "notfound",
            Command::MemPool => "mempool",
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::Addr => "addr",
            Command::GetAddr => "getaddr",
            Command::FilterAdd => "filteradd",
            Command::FilterClear => "filterclear",
            Command::FilterLoad => "filterload",
            Command::Reject => "reject",
            Command::SendHeaders => "sendheaders",
        }
    }

    /// Control traffic (handshake, liveness, gossip, filters) as opposed to
    /// block and transaction data.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Command::Version
                | Command::Verack
                | Command::Ping
                | Command::Pong
                | Command::Addr
                | Command::GetAddr
                | Command::FilterAdd
                | Command::FilterClear
                | Command::FilterLoad
                | Command::Reject
                | Command::SendHeaders
        )
    }
}

/// Upper bound on inventory entries per message.
pub const MAX_INV_ENTRIES: usize = 50_000;

/// Upper bound on headers per `headers` message.
pub const MAX_HEADERS: usize = 2_000;

/// Upper bound on entries per `addr` message.
pub const MAX_ADDR_ENTRIES: usize = 1_000;

/// A decoded P2P payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkPayload {
    /// Full block.
    Block(Block),
    /// Single transaction.
    Tx(Transaction),
    /// Block headers (each followed on the wire by a zero tx count).
    Headers(Vec<block::Header>),
    /// Inventory announcement.
    Inv(Vec<Inventory>),
    /// Request for announced objects.
    GetData(Vec<Inventory>),
    /// Block inventory request by locator.
    GetBlocks(BlockLocatorMessage),
    /// Header request by locator.
    GetHeaders(BlockLocatorMessage),
    /// Filtered block: header plus partial merkle tree.
    MerkleBlock(MerkleBlockMessage),
    /// Requested objects the peer does not have.
    NotFound(Vec<Inventory>),
    /// Request for the peer's mempool inventory.
    MemPool,
    /// Handshake opener.
    Version(VersionMessage),
    /// Handshake acknowledgement.
    Verack,
    /// Liveness probe carrying a nonce.
    Ping(u64),
    /// Reply to [`NetworkPayload::Ping`] echoing its nonce.
    Pong(u64),
    /// Address gossip.
    Addr(Vec<TimestampedAddress>),
    /// Request for address gossip.
    GetAddr,
    /// Add one element to the loaded bloom filter.
    FilterAdd(FilterAddMessage),
    /// Drop the loaded bloom filter.
    FilterClear,
    /// Install a bloom filter.
    FilterLoad(FilterLoadMessage),
    /// Peer rejected something we sent.
    Reject(RejectMessage),
    /// Ask the peer to announce blocks with `headers`.
    SendHeaders,
}

impl NetworkPayload {
    /// Catalog entry for this payload.
    pub fn kind(&self) -> Command {
        match self {
            NetworkPayload::Block(_) => Command::Block,
            NetworkPayload::Tx(_) => Command::Tx,
            NetworkPayload::Headers(_) => Command::Headers,
            NetworkPayload::Inv(_) => Command::Inv,
            NetworkPayload::GetData(_) => Command::GetData,
            NetworkPayload::GetBlocks(_) => Command::GetBlocks,
            NetworkPayload::GetHeaders(_) => Command::GetHeaders,
            NetworkPayload::MerkleBlock(_) => Command::MerkleBlock,
            NetworkPayload::NotFound(_) => Command::NotFound,
            NetworkPayload::MemPool => Command::MemPool,
            NetworkPayload::Version(_) => Command::Version,
            NetworkPayload::Verack => Command::Verack,
            NetworkPayload::Ping(_) => Command::Ping,
            NetworkPayload::Pong(_) => Command::Pong,
            NetworkPayload::Addr(_) => Command::Addr,
            NetworkPayload::GetAddr => Command::GetAddr,
            NetworkPayload::FilterAdd(_) => Command::FilterAdd,
            NetworkPayload::FilterClear => Command::FilterClear,
            NetworkPayload::FilterLoad(_) => Command::FilterLoad,
            NetworkPayload::Reject(_) => Command::Reject,
            NetworkPayload::SendHeaders => Command::SendHeaders,
        }
    }

    /// Wire command name.
    pub fn command(&self) -> &'static str {
        self.kind().name()
    }

    /// See [`Command::is_control`].
    pub fn is_control(&self) -> bool {
        self.kind().is_control()
    }

    pub(crate) fn decode(
        name: &str,
        bytes: &[u8],
        mode: CompactSizeMode,
    ) -> Result<Self, WireError> {
        let command = Command::from_name(name)
            .ok_or_else(|| WireError::UnknownCommand(name.to_owned()))?;
        let mut r = Reader::new(bytes, mode, command.name());

        let payload = match command {
            Command::Block => NetworkPayload::Block(r.consensus("block")?),
            Command::Tx => NetworkPayload::Tx(r.consensus("transaction")?),
            Command::Headers => NetworkPayload::Headers(data::decode_headers(&mut r)?),
            Command::Inv => NetworkPayload::Inv(data::decode_inventory(&mut r)?),
            Command::GetData => NetworkPayload::GetData(data::decode_inventory(&mut r)?),
            Command::NotFound => NetworkPayload::NotFound(data::decode_inventory(&mut r)?),
            Command::GetBlocks => NetworkPayload::GetBlocks(BlockLocatorMessage::decode(&mut r)?),
            Command::GetHeaders => NetworkPayload::GetHeaders(BlockLocatorMessage::decode(&mut r)?),
            Command::MerkleBlock => NetworkPayload::MerkleBlock(MerkleBlockMessage::decode(&mut r)?),
            Command::MemPool => NetworkPayload::MemPool,
            Command::Version => NetworkPayload::Version(VersionMessage::decode(&mut r)?),
            Command::Verack => NetworkPayload::Verack,
            Command::Ping => NetworkPayload::Ping(r.u64("nonce")?),
            Command::Pong => NetworkPayload::Pong(r.u64("nonce")?),
            Command::Addr => NetworkPayload::Addr(control::decode_addr(&mut r)?),
            Command::GetAddr => NetworkPayload::GetAddr,
            Command::FilterAdd => NetworkPayload::FilterAdd(FilterAddMessage::decode(&mut r)?),
            Command::FilterClear => NetworkPayload::FilterClear,
            Command::FilterLoad => NetworkPayload::FilterLoad(FilterLoadMessage::decode(&mut r)?),
            Command::Reject => NetworkPayload::Reject(RejectMessage::decode(&mut r)?),
            Command::SendHeaders => NetworkPayload::SendHeaders,
        };
        r.finish()?;
        Ok(payload)
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            NetworkPayload::Block(block) => {
                out.extend(bitcoin::consensus::encode::serialize(block))
            }
            NetworkPayload::Tx(tx) => out.extend(bitcoin::consensus::encode::serialize(tx)),
            NetworkPayload::Headers(headers) => data::encode_headers(headers, out),
            NetworkPayload::Inv(items)
            | NetworkPayload::GetData(items)
            | NetworkPayload::NotFound(items) => data::encode_inventory(items, out),
            NetworkPayload::GetBlocks(msg) | NetworkPayload::GetHeaders(msg) => msg.encode(out),
            NetworkPayload::MerkleBlock(msg) => msg.encode(out),
            NetworkPayload::Version(msg) => msg.encode(out),
            NetworkPayload::Ping(nonce) | NetworkPayload::Pong(nonce) => {
                out.extend_from_slice(&nonce.to_le_bytes())
            }
            NetworkPayload::Addr(entries) => control::encode_addr(entries, out),
            NetworkPayload::FilterAdd(msg) => msg.encode(out),
            NetworkPayload::FilterLoad(msg) => msg.encode(out),
            NetworkPayload::Reject(msg) => msg.encode(out),
            NetworkPayload::MemPool
            | NetworkPayload::Verack
            | NetworkPayload::GetAddr
            | NetworkPayload::FilterClear
            | NetworkPayload::SendHeaders => {}
        }
    }
}
