//! CompactSize: the variable-length integer that prefixes every variable-length
//! field on the wire.
//!
//! | value               | encoding              |
//! |---------------------|-----------------------|
//! | `< 0xfd`            | 1 byte                |
//! | `0xfd ..= 0xffff`   | `0xfd` + u16 LE       |
//! | `..= 0xffff_ffff`   | `0xfe` + u32 LE       |
//! | larger              | `0xff` + u64 LE       |
use serde::{Deserialize, Serialize};

/// How strictly decoders treat non-minimal CompactSize encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactSizeMode {
    /// Accept any well-formed encoding, e.g. `fd 01 00` for 1.
    #[default]
    Lenient,
    /// Reject a marker-prefixed value that would fit a shorter encoding.
    Strict,
}

/// Reasons a CompactSize could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactSizeError {
    /// Ran out of bytes; `needed` is the full encoded width.
    Truncated {
        /// Width implied by the marker byte.
        needed: usize,
    },
    /// Strict mode saw a longer encoding than the value required.
    NonMinimal(u64),
}

/// Number of bytes `value` occupies when encoded.
pub fn encoded_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Append the minimal encoding of `value` to `out`.
pub fn write(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read a CompactSize from the front of `buf`, returning the value and the
/// number of bytes consumed.
pub fn read(buf: &[u8], mode: CompactSizeMode) -> Result<(u64, usize), CompactSizeError> {
    let marker = *buf.first().ok_or(CompactSizeError::Truncated { needed: 1 })?;
    let (value, width, floor) = match marker {
        0xfd => (u16::from_le_bytes(fixed(buf)?) as u64, 3, 0xfd),
        0xfe => (u32::from_le_bytes(fixed(buf)?) as u64, 5, 0x1_0000),
        0xff => (u64::from_le_bytes(fixed(buf)?), 9, 0x1_0000_0000),
        n => return Ok((n as u64, 1)),
    };
    if mode == CompactSizeMode::Strict && value < floor {
        return Err(CompactSizeError::NonMinimal(value));
    }
    Ok((value, width))
}

fn fixed<const N: usize>(buf: &[u8]) -> Result<[u8; N], CompactSizeError> {
    buf.get(1..1 + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(CompactSizeError::Truncated { needed: 1 + N })
}
