use std::net::{IpAddr, Ipv6Addr};

use super::MAX_ADDR_ENTRIES;
use crate::{
    codec::{write_var_bytes, Reader},
    compact_size,
    error::WireError,
};

/// Longest user agent accepted in `version`.
const MAX_USER_AGENT_LEN: usize = 256;

/// BIP37 bounds on `filterload` / `filteradd`.
const MAX_BLOOM_FILTER_SIZE: usize = 36_000;
const MAX_HASH_FUNCS: u32 = 50;
const MAX_FILTERADD_DATA: usize = 520;

/// Longest `message` / `reason` string accepted in `reject`.
const MAX_REJECT_STRING: usize = 111;

/// Network address as carried in `version` and `addr`:
/// `services(u64 LE) | ip(16 bytes) | port(u16 BE)`.
///
/// The address is kept as the 16 wire bytes; IPv4 is held IPv4-mapped
/// (`::ffff:a.b.c.d`). Use [`NetAddress::new`] and [`NetAddress::ip_addr`]
/// to work with [`IpAddr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    /// Service bits the node advertises.
    pub services: u64,
    /// Node address in its wire form.
    pub ip: Ipv6Addr,
    /// TCP port.
    pub port: u16,
}

impl NetAddress {
    /// Wire size without timestamp.
    pub const SIZE: usize = 26;

    /// Address for `ip`, mapping IPv4 into the IPv6 wire form.
    pub fn new(services: u64, ip: IpAddr, port: u16) -> Self {
        let ip = match ip {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self { services, ip, port }
    }

    /// The address with IPv4-mapped values unwrapped to [`IpAddr::V4`].
    pub fn ip_addr(&self) -> IpAddr {
        match self.ip.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(self.ip),
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let services = r.u64("services")?;
        let ip = Ipv6Addr::from(r.array::<16>("ip")?);
        let port = u16::from_be_bytes(r.array("port")?);
        Ok(Self { services, ip, port })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.ip.octets());
        out.extend_from_slice(&self.port.to_be_bytes());
    }
}

/// One `addr` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedAddress {
    /// Last-seen time, seconds since the epoch.
    pub timestamp: u32,
    /// The advertised address.
    pub address: NetAddress,
}

pub(super) fn decode_addr(r: &mut Reader<'_>) -> Result<Vec<TimestampedAddress>, WireError> {
    let n = r.count("address count", MAX_ADDR_ENTRIES, 4 + NetAddress::SIZE)?;
    (0..n)
        .map(|_| {
            let timestamp = r.u32("timestamp")?;
            let address = NetAddress::decode(r)?;
            Ok::<_, WireError>(TimestampedAddress { timestamp, address })
        })
        .collect()
}

pub(super) fn encode_addr(entries: &[TimestampedAddress], out: &mut Vec<u8>) {
    compact_size::write(out, entries.len() as u64);
    for entry in entries {
        out.extend_from_slice(&entry.timestamp.to_le_bytes());
        entry.address.encode(out);
    }
}

/// `version`: the handshake opener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    /// Protocol version.
    pub version: i32,
    /// Sender's service bits.
    pub services: u64,
    /// Sender's clock, seconds since the epoch.
    pub timestamp: i64,
    /// Address of the receiving node as seen by the sender.
    pub receiver: NetAddress,
    /// Sender's own address.
    pub sender: NetAddress,
    /// Random nonce for self-connection detection.
    pub nonce: u64,
    /// Software identifier, e.g. `/spv-watch:0.1.0/`.
    pub user_agent: String,
    /// Sender's best height.
    pub start_height: i32,
    /// BIP37 relay flag; absent on the wire means `true`.
    pub relay: bool,
}

impl VersionMessage {
    pub(super) fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let version = r.i32("version")?;
        let services = r.u64("services")?;
        let timestamp = r.i64("timestamp")?;
        let receiver = NetAddress::decode(r)?;
        let sender = NetAddress::decode(r)?;
        let nonce = r.u64("nonce")?;
        let user_agent = r.var_str("user agent", MAX_USER_AGENT_LEN)?;
        let start_height = r.i32("start height")?;
        let relay = match r.remaining() {
            0 => true,
            _ => r.u8("relay")? != 0,
        };
        Ok(Self {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        self.receiver.encode(out);
        self.sender.encode(out);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        write_var_bytes(out, self.user_agent.as_bytes());
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out.push(self.relay as u8);
    }
}

/// BIP37 filter update policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomFlags {
    /// `BLOOM_UPDATE_NONE`
    None,
    /// `BLOOM_UPDATE_ALL`
    All,
    /// `BLOOM_UPDATE_P2PUBKEY_ONLY`
    PubkeyOnly,
}

impl BloomFlags {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(BloomFlags::None),
            1 => Some(BloomFlags::All),
            2 => Some(BloomFlags::PubkeyOnly),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            BloomFlags::None => 0,
            BloomFlags::All => 1,
            BloomFlags::PubkeyOnly => 2,
        }
    }
}

/// `filterload`: install a bloom filter on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLoadMessage {
    /// Filter bit field.
    pub filter: Vec<u8>,
    /// Number of hash functions.
    pub hash_funcs: u32,
    /// Seed added to every hash function.
    pub tweak: u32,
    /// Update policy on match.
    pub flags: BloomFlags,
}

impl FilterLoadMessage {
    pub(super) fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let filter = r.var_bytes("filter", MAX_BLOOM_FILTER_SIZE)?;
        let hash_funcs = r.u32("hash funcs")?;
        if hash_funcs > MAX_HASH_FUNCS {
            return Err(r.error(format!("{hash_funcs} hash functions exceeds {MAX_HASH_FUNCS}")));
        }
        let tweak = r.u32("tweak")?;
        let raw = r.u8("flags")?;
        let flags = BloomFlags::from_u8(raw).ok_or_else(|| r.error(format!("unknown flags {raw}")))?;
        Ok(Self {
            filter,
            hash_funcs,
            tweak,
            flags,
        })
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) {
        write_var_bytes(out, &self.filter);
        out.extend_from_slice(&self.hash_funcs.to_le_bytes());
        out.extend_from_slice(&self.tweak.to_le_bytes());
        out.push(self.flags.to_u8());
    }
}

/// `filteradd`: one data element to add to the loaded filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterAddMessage {
    /// Element, at most 520 bytes.
    pub data: Vec<u8>,
}

impl FilterAddMessage {
    pub(super) fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            data: r.var_bytes("data", MAX_FILTERADD_DATA)?,
        })
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) {
        write_var_bytes(out, &self.data);
    }
}

/// Reason code carried by `reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
    /// `0x01`
    Malformed,
    /// `0x10`
    Invalid,
    /// `0x11`
    Obsolete,
    /// `0x12`
    Duplicate,
    /// `0x40`
    NonStandard,
    /// `0x41`
    Dust,
    /// `0x42`
    InsufficientFee,
    /// `0x43`
    Checkpoint,
    /// Any other code.
    Other(u8),
}

impl RejectCode {
    fn from_u8(v: u8) -> Self {
        match v {
            0x01 => RejectCode::Malformed,
            0x10 => RejectCode::Invalid,
            0x11 => RejectCode::Obsolete,
            0x12 => RejectCode::Duplicate,
            0x40 => RejectCode::NonStandard,
            0x41 => RejectCode::Dust,
            0x42 => RejectCode::InsufficientFee,
            0x43 => RejectCode::Checkpoint,
            other => RejectCode::Other(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            RejectCode::Malformed => 0x01,
            RejectCode::Invalid => 0x10,
            RejectCode::Obsolete => 0x11,
            RejectCode::Duplicate => 0x12,
            RejectCode::NonStandard => 0x40,
            RejectCode::Dust => 0x41,
            RejectCode::InsufficientFee => 0x42,
            RejectCode::Checkpoint => 0x43,
            RejectCode::Other(v) => v,
        }
    }
}

/// `reject`: the peer refused one of our messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectMessage {
    /// Command of the rejected message.
    pub message: String,
    /// Reason code.
    pub code: RejectCode,
    /// Human-readable reason.
    pub reason: String,
    /// Extra data, usually the 32-byte hash of the rejected tx or block.
    pub data: Vec<u8>,
}

impl RejectMessage {
    pub(super) fn decode(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let message = r.var_str("message", MAX_REJECT_STRING)?;
        let code = RejectCode::from_u8(r.u8("code")?);
        let reason = r.var_str("reason", MAX_REJECT_STRING)?;
        let data = r.rest().to_vec();
        Ok(Self {
            message,
            code,
            reason,
            data,
        })
    }

    pub(super) fn encode(&self, out: &mut Vec<u8>) {
        write_var_bytes(out, self.message.as_bytes());
        out.push(self.code.to_u8());
        write_var_bytes(out, self.reason.as_bytes());
        out.extend_from_slice(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact_size::CompactSizeMode;
    use std::net::Ipv4Addr;

    fn reader(bytes: &[u8]) -> Reader<'_> {
        Reader::new(bytes, CompactSizeMode::Lenient, "addr")
    }

    #[test]
    fn ipv4_is_written_ipv4_mapped() {
        let addr = NetAddress::new(1, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8333);
        let mut out = Vec::new();
        addr.encode(&mut out);
        assert_eq!(out.len(), NetAddress::SIZE);
        assert_eq!(&out[8..18], &[0u8; 10]);
        assert_eq!(&out[18..20], &[0xff, 0xff]);
        assert_eq!(&out[20..24], &[10, 0, 0, 1]);
        assert_eq!(&out[24..26], &8333u16.to_be_bytes());
        let decoded = NetAddress::decode(&mut reader(&out)).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(decoded.ip_addr(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn mapped_ipv6_survives_a_round_trip() {
        let mapped: Ipv6Addr = "::ffff:10.0.0.1".parse().unwrap();
        let addr = NetAddress::new(0, IpAddr::V6(mapped), 8333);
        let mut out = Vec::new();
        addr.encode(&mut out);
        let decoded = NetAddress::decode(&mut reader(&out)).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(decoded.ip, mapped);
        assert_eq!(
            decoded,
            NetAddress::new(0, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8333)
        );
    }

    #[test]
    fn ipv6_passes_through_unchanged() {
        let v6: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let addr = NetAddress::new(0, IpAddr::V6(v6), 18444);
        let mut out = Vec::new();
        addr.encode(&mut out);
        assert_eq!(&out[8..24], &v6.octets());
        let decoded = NetAddress::decode(&mut reader(&out)).unwrap();
        assert_eq!(decoded, addr);
        assert_eq!(decoded.ip_addr(), IpAddr::V6(v6));
    }

    #[test]
    fn version_without_relay_byte_defaults_to_relay() {
        let local = NetAddress::new(0, IpAddr::V4(Ipv4Addr::LOCALHOST), 8333);
        let msg = VersionMessage {
            version: 70016,
            services: 0,
            timestamp: 1_700_000_000,
            receiver: local,
            sender: local,
            nonce: 42,
            user_agent: "/spv-watch:0.1.0/".into(),
            start_height: 0,
            relay: false,
        };
        let mut out = Vec::new();
        msg.encode(&mut out);
        out.pop();
        let decoded = VersionMessage::decode(&mut reader(&out)).unwrap();
        assert!(decoded.relay);
        assert_eq!(decoded.user_agent, msg.user_agent);
    }

    #[test]
    fn filterload_rejects_too_many_hash_funcs() {
        let msg = FilterLoadMessage {
            filter: vec![0xff; 8],
            hash_funcs: MAX_HASH_FUNCS + 1,
            tweak: 0,
            flags: BloomFlags::None,
        };
        let mut out = Vec::new();
        msg.encode(&mut out);
        assert!(FilterLoadMessage::decode(&mut reader(&out)).is_err());
    }

    #[test]
    fn reject_keeps_trailing_hash() {
        let msg = RejectMessage {
            message: "tx".into(),
            code: RejectCode::InsufficientFee,
            reason: "min relay fee not met".into(),
            data: vec![7; 32],
        };
        let mut out = Vec::new();
        msg.encode(&mut out);
        assert_eq!(RejectMessage::decode(&mut reader(&out)).unwrap(), msg);
    }
}
