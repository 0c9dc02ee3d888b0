//! Typed errors for the wire codec, partial merkle proofs, and payment verdicts.
use bitcoin::TxMerkleNode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Framing and payload decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Not enough bytes buffered yet. A retry signal, not a failure.
    #[error("incomplete frame: {needed} more bytes needed")]
    FramingIncomplete {
        /// Bytes still missing before the frame can be decoded.
        needed: usize,
    },

    /// The header checksum does not match the payload.
    #[error("checksum mismatch: header says {}, payload hashes to {}", hex::encode(expected), hex::encode(actual))]
    ChecksumMismatch {
        /// Checksum carried by the header.
        expected: [u8; 4],
        /// First four bytes of sha256d(payload).
        actual: [u8; 4],
    },

    /// Command name outside the payload catalog.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// Payload bytes do not match the variant's layout.
    #[error("malformed {command} payload: {reason}")]
    MalformedPayload {
        /// Command whose decoder rejected the bytes.
        command: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// Declared payload length exceeds the configured limit.
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Declared length.
        len: u32,
        /// Configured maximum.
        max: u32,
    },
}

impl WireError {
    pub(crate) fn malformed(command: &'static str, reason: impl Into<String>) -> Self {
        WireError::MalformedPayload {
            command,
            reason: reason.into(),
        }
    }
}

/// Partial merkle tree verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    /// A tree over zero transactions proves nothing.
    #[error("partial merkle tree has no transactions")]
    EmptyTree,

    /// Flags and hashes do not describe a consistent traversal.
    #[error("malformed partial merkle tree: {0}")]
    MalformedProof(String),

    /// The traversal is consistent but commits to a different root.
    #[error("merkle root mismatch: expected {expected}, computed {computed}")]
    RootMismatch {
        /// Root claimed by the block header.
        expected: TxMerkleNode,
        /// Root recomputed from the proof.
        computed: TxMerkleNode,
    },
}

/// Why a watch ended without proving the payment.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The merkle block carried an inconsistent partial tree.
    #[error("malformed merkle proof: {0}")]
    MalformedProof(String),

    /// The proof does not hash to the header's merkle root.
    #[error("merkle root mismatch")]
    RootMismatch,

    /// The proof verifies but does not include the expected transaction.
    #[error("payment not found in merkle block")]
    PaymentNotFound,

    /// The caller's deadline expired first.
    #[error("timed out waiting for payment")]
    Timeout,

    /// The watch was cancelled externally.
    #[error("watch cancelled")]
    Cancelled,

    /// The peer connection ended before a verdict.
    #[error("transport closed")]
    TransportClosed,
}

impl From<ProofError> for FailureReason {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::EmptyTree => FailureReason::MalformedProof(err.to_string()),
            ProofError::MalformedProof(reason) => FailureReason::MalformedProof(reason),
            ProofError::RootMismatch { .. } => FailureReason::RootMismatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    #[test]
    fn checksum_mismatch_renders_hex() {
        let err = WireError::ChecksumMismatch {
            expected: [0xde, 0xad, 0xbe, 0xef],
            actual: [0, 1, 2, 3],
        };
        let msg = err.to_string();
        assert!(msg.contains("deadbeef"));
        assert!(msg.contains("00010203"));
    }

    #[test]
    fn proof_errors_map_to_failure_reasons() {
        let root = TxMerkleNode::all_zeros();
        let mismatch = ProofError::RootMismatch {
            expected: root,
            computed: root,
        };
        assert_eq!(FailureReason::from(mismatch), FailureReason::RootMismatch);
        assert!(matches!(
            FailureReason::from(ProofError::EmptyTree),
            FailureReason::MalformedProof(_)
        ));
    }
}
