use bitcoin::hashes::{sha256d, Hash};

use crate::error::WireError;

/// Size of the fixed message header on the wire.
pub const HEADER_SIZE: usize = 24;

/// Width of the null-padded command field.
pub const COMMAND_SIZE: usize = 12;

/// Largest payload the codec accepts (32 MiB, matching deployed nodes).
pub const MAX_PAYLOAD_LEN: u32 = 32 * 1024 * 1024;

/// The 24-byte header preceding every P2P message:
/// `magic(4) | command(12, null-padded ASCII) | payload_len(u32 LE) | checksum(4)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkHeader {
    /// Network identifier.
    pub magic: [u8; 4],
    /// Raw null-padded command bytes.
    pub command: [u8; COMMAND_SIZE],
    /// Length of the payload that follows.
    pub payload_len: u32,
    /// First four bytes of sha256d(payload).
    pub checksum: [u8; 4],
}

impl NetworkHeader {
    /// Build the header for `payload` under `command`.
    ///
    /// `command` must be ASCII and at most 12 bytes; every name in the
    /// payload catalog satisfies this.
    pub fn for_payload(magic: [u8; 4], command: &str, payload: &[u8]) -> Self {
        debug_assert!(command.is_ascii() && command.len() <= COMMAND_SIZE);
        let mut raw = [0u8; COMMAND_SIZE];
        let n = command.len().min(COMMAND_SIZE);
        raw[..n].copy_from_slice(&command.as_bytes()[..n]);
        Self {
            magic,
            command: raw,
            payload_len: payload.len() as u32,
            checksum: checksum(payload),
        }
    }

    /// Command name with the null padding stripped.
    ///
    /// Returns [`WireError::UnknownCommand`] for non-ASCII bytes or for
    /// non-null bytes after the first null.
    pub fn command_name(&self) -> Result<&str, WireError> {
        let end = self
            .command
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMMAND_SIZE);
        let (name, padding) = self.command.split_at(end);
        if padding.iter().any(|&b| b != 0) || !name.is_ascii() {
            return Err(WireError::UnknownCommand(
                String::from_utf8_lossy(&self.command).into_owned(),
            ));
        }
        std::str::from_utf8(name)
            .map_err(|_| WireError::UnknownCommand(hex::encode(self.command)))
    }

    /// Parse a header from the first 24 bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let raw: &[u8; HEADER_SIZE] = buf
            .get(..HEADER_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or(WireError::FramingIncomplete {
                needed: HEADER_SIZE - buf.len().min(HEADER_SIZE),
            })?;

        let mut magic = [0u8; 4];
        let mut command = [0u8; COMMAND_SIZE];
        let mut len = [0u8; 4];
        let mut checksum = [0u8; 4];
        magic.copy_from_slice(&raw[0..4]);
        command.copy_from_slice(&raw[4..16]);
        len.copy_from_slice(&raw[16..20]);
        checksum.copy_from_slice(&raw[20..24]);

        Ok(Self {
            magic,
            command,
            payload_len: u32::from_le_bytes(len),
            checksum,
        })
    }

    /// Serialize to the 24-byte wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic);
        out[4..16].copy_from_slice(&self.command);
        out[16..20].copy_from_slice(&self.payload_len.to_le_bytes());
        out[20..24].copy_from_slice(&self.checksum);
        out
    }
}

/// First four bytes of sha256d(`payload`).
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = sha256d::Hash::hash(payload).to_byte_array();
    [digest[0], digest[1], digest[2], digest[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAINNET: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

    #[test]
    fn empty_payload_checksum_is_well_known() {
        // sha256d("") = 5df6e0e2...
        assert_eq!(checksum(&[]), [0x5d, 0xf6, 0xe0, 0xe2]);
    }

    #[test]
    fn verack_header_matches_reference_bytes() {
        let header = NetworkHeader::for_payload(MAINNET, "verack", &[]);
        let bytes = header.to_bytes();
        assert_eq!(
            hex::encode(bytes),
            "f9beb4d976657261636b000000000000000000005df6e0e2"
        );
        assert_eq!(NetworkHeader::parse(&bytes), Ok(header));
        assert_eq!(header.command_name(), Ok("verack"));
    }

    #[test]
    fn short_buffer_reports_missing_bytes() {
        assert_eq!(
            NetworkHeader::parse(&[0u8; 10]),
            Err(WireError::FramingIncomplete { needed: 14 })
        );
    }

    #[test]
    fn garbage_after_padding_is_rejected() {
        let mut header = NetworkHeader::for_payload(MAINNET, "tx", &[]);
        header.command[5] = b'x';
        assert!(matches!(
            header.command_name(),
            Err(WireError::UnknownCommand(_))
        ));
    }
}
