//! Payload encode/decode entry points and the bounds-checked reader every
//! per-variant decoder is written against.
use bitcoin::{
    consensus::encode::{self, Decodable},
    hashes::{sha256d, Hash},
    Network,
};

use crate::{
    compact_size::{self, CompactSizeError, CompactSizeMode},
    config::WatchConfig,
    error::WireError,
    frame::NetworkMessage,
    headers::{NetworkHeader, MAX_PAYLOAD_LEN},
    payload::NetworkPayload,
};

/// Turns payloads into bytes and back for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    magic: [u8; 4],
    mode: CompactSizeMode,
    max_payload_len: u32,
}

impl WireCodec {
    /// Codec for `network` with lenient CompactSize decoding.
    pub fn new(network: Network) -> Self {
        Self {
            magic: network.magic().to_bytes(),
            mode: CompactSizeMode::Lenient,
            max_payload_len: MAX_PAYLOAD_LEN,
        }
    }

    /// Codec configured from a [`WatchConfig`].
    pub fn from_config(cfg: &WatchConfig) -> Self {
        Self {
            magic: cfg.network.magic().to_bytes(),
            mode: cfg.compact_size,
            max_payload_len: cfg.max_payload_len,
        }
    }

    /// Override the CompactSize strictness.
    pub fn with_compact_size_mode(mut self, mode: CompactSizeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Network magic stamped on outbound headers.
    pub fn magic(&self) -> [u8; 4] {
        self.magic
    }

    /// Largest payload this codec will decode.
    pub fn max_payload_len(&self) -> u32 {
        self.max_payload_len
    }

    /// Decode `payload` according to the command named in `header`.
    pub fn decode(&self, header: &NetworkHeader, payload: &[u8]) -> Result<NetworkPayload, WireError> {
        if header.payload_len > self.max_payload_len {
            return Err(WireError::PayloadTooLarge {
                len: header.payload_len,
                max: self.max_payload_len,
            });
        }
        let command = header.command_name()?;
        if payload.len() != header.payload_len as usize {
            return Err(WireError::MalformedPayload {
                command: "header",
                reason: format!(
                    "header declares {} bytes, got {}",
                    header.payload_len,
                    payload.len()
                ),
            });
        }
        NetworkPayload::decode(command, payload, self.mode)
    }

    /// Decode a framed message.
    pub fn decode_message(&self, msg: &NetworkMessage) -> Result<NetworkPayload, WireError> {
        self.decode(&msg.header, &msg.payload)
    }

    /// Canonical payload bytes (no header).
    pub fn encode(&self, payload: &NetworkPayload) -> Vec<u8> {
        let mut out = Vec::new();
        payload.encode_into(&mut out);
        out
    }

    /// Header + payload ready to hand to a transport.
    pub fn message(&self, payload: &NetworkPayload) -> NetworkMessage {
        let bytes = self.encode(payload);
        NetworkMessage {
            header: NetworkHeader::for_payload(self.magic, payload.command(), &bytes),
            payload: bytes,
        }
    }

    /// Complete wire bytes for `payload`.
    pub fn frame(&self, payload: &NetworkPayload) -> Vec<u8> {
        self.message(payload).to_bytes()
    }
}

/// Forward-only reader over one payload; every short read is a
/// [`WireError::MalformedPayload`] tagged with the command being decoded.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    mode: CompactSizeMode,
    command: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], mode: CompactSizeMode, command: &'static str) -> Self {
        Self {
            buf,
            pos: 0,
            mode,
            command,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> WireError {
        WireError::malformed(self.command, reason)
    }

    pub(crate) fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(self.error(format!(
                "{what}: need {n} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8, WireError> {
        Ok(self.array::<1>(what)?[0])
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn i32(&mut self, what: &str) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn i64(&mut self, what: &str) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.array(what)?))
    }

    pub(crate) fn hash(&mut self, what: &str) -> Result<sha256d::Hash, WireError> {
        Ok(sha256d::Hash::from_byte_array(self.array(what)?))
    }

    pub(crate) fn compact_size(&mut self, what: &str) -> Result<u64, WireError> {
        match compact_size::read(&self.buf[self.pos..], self.mode) {
            Ok((value, used)) => {
                self.pos += used;
                Ok(value)
            }
            Err(CompactSizeError::Truncated { needed }) => {
                Err(self.error(format!("{what}: truncated CompactSize ({needed} bytes)")))
            }
            Err(CompactSizeError::NonMinimal(v)) => {
                Err(self.error(format!("{what}: non-minimal CompactSize for {v}")))
            }
        }
    }

    /// Element count bounded by `max` and by what the remaining bytes could
    /// possibly hold at `min_item` bytes per element.
    pub(crate) fn count(&mut self, what: &str, max: usize, min_item: usize) -> Result<usize, WireError> {
        let n = self.compact_size(what)?;
        if n > max as u64 {
            return Err(self.error(format!("{what}: {n} entries exceeds limit of {max}")));
        }
        let n = n as usize;
        if n.saturating_mul(min_item) > self.remaining() {
            return Err(self.error(format!(
                "{what}: {n} entries declared but only {} bytes left",
                self.remaining()
            )));
        }
        Ok(n)
    }

    pub(crate) fn var_bytes(&mut self, what: &str, max: usize) -> Result<Vec<u8>, WireError> {
        let n = self.count(what, max, 1)?;
        Ok(self.take(n, what)?.to_vec())
    }

    pub(crate) fn var_str(&mut self, what: &str, max: usize) -> Result<String, WireError> {
        let bytes = self.var_bytes(what, max)?;
        String::from_utf8(bytes).map_err(|e| self.error(format!("{what}: {e}")))
    }

    /// Decode a consensus-encoded `bitcoin` type from the current position.
    pub(crate) fn consensus<T: Decodable>(&mut self, what: &str) -> Result<T, WireError> {
        let (value, used) = encode::deserialize_partial::<T>(&self.buf[self.pos..])
            .map_err(|e| self.error(format!("{what}: {e}")))?;
        self.pos += used;
        Ok(value)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    pub(crate) fn finish(self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(self.error(format!("{n} trailing bytes"))),
        }
    }
}

pub(crate) fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    compact_size::write(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub(crate) fn write_hash(out: &mut Vec<u8>, hash: &sha256d::Hash) {
    out.extend_from_slice(&hash.to_byte_array());
}
