//! Splits a byte stream into whole P2P messages.
//!
//! [`split`] is pure: it peels complete, checksum-valid messages off the front
//! of a buffer and hands back the untouched remainder. [`FrameBuffer`] keeps
//! that remainder between reads for one connection.
use tracing::trace;

use crate::{
    error::WireError,
    headers::{checksum, NetworkHeader, HEADER_SIZE, MAX_PAYLOAD_LEN},
};

/// One framed message: header plus its raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMessage {
    /// Parsed 24-byte header.
    pub header: NetworkHeader,
    /// Exactly `header.payload_len` bytes, checksum verified.
    pub payload: Vec<u8>,
}

impl NetworkMessage {
    /// Decode one message from the front of `buf`.
    ///
    /// Returns the message and the number of bytes it occupied, or
    /// [`WireError::FramingIncomplete`] when more bytes are needed and
    /// [`WireError::ChecksumMismatch`] when the payload does not hash to the
    /// header's checksum.
    pub fn decode_one(buf: &[u8]) -> Result<(Self, usize), WireError> {
        let header = NetworkHeader::parse(buf)?;
        let total = HEADER_SIZE + header.payload_len as usize;
        let Some(payload) = buf.get(HEADER_SIZE..total) else {
            return Err(WireError::FramingIncomplete {
                needed: total - buf.len(),
            });
        };

        let actual = checksum(payload);
        if actual != header.checksum {
            return Err(WireError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        Ok((
            Self {
                header,
                payload: payload.to_vec(),
            },
            total,
        ))
    }

    /// Header followed by payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Decode as many whole messages as `buf` holds.
///
/// Stops at the first frame that is short or fails its checksum and returns
/// everything from that frame onward unmodified. Nothing is skipped to
/// resynchronise.
pub fn split(buf: &[u8]) -> (Vec<NetworkMessage>, &[u8]) {
    let mut messages = Vec::new();
    let mut rest = buf;
    loop {
        match NetworkMessage::decode_one(rest) {
            Ok((msg, used)) => {
                messages.push(msg);
                rest = &rest[used..];
            }
            Err(err) => {
                if !rest.is_empty() {
                    trace!(error = %err, remaining = rest.len(), "split stopped");
                }
                break;
            }
        }
    }
    (messages, rest)
}

/// Per-connection reassembly buffer.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    max_payload_len: u32,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_LEN)
    }
}

impl FrameBuffer {
    /// Empty buffer; headers declaring more than `max_payload_len` are
    /// reported by [`FrameBuffer::stall`].
    pub fn new(max_payload_len: u32) -> Self {
        Self {
            pending: Vec::new(),
            max_payload_len,
        }
    }

    /// Append freshly read bytes and return every message now complete.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<NetworkMessage> {
        self.pending.extend_from_slice(bytes);
        let (messages, rest) = split(&self.pending);
        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        messages
    }

    /// Bytes received but not yet part of a complete message.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Why the front of the buffer can never become a message, if that is
    /// already known. A short buffer is not a stall.
    pub fn stall(&self) -> Option<WireError> {
        let header = NetworkHeader::parse(&self.pending).ok()?;
        if header.payload_len > self.max_payload_len {
            return Some(WireError::PayloadTooLarge {
                len: header.payload_len,
                max: self.max_payload_len,
            });
        }
        match NetworkMessage::decode_one(&self.pending) {
            Err(err @ WireError::ChecksumMismatch { .. }) => Some(err),
            _ => None,
        }
    }
}
