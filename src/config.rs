//! Watcher configuration.
use std::time::Duration;

use anyhow::Context;
use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::{compact_size::CompactSizeMode, headers::MAX_PAYLOAD_LEN, monitor::MatchPolicy};

/// Settings shared by the codec, the framed transport, and the watcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Network whose magic stamps outbound messages and filters inbound ones.
    pub network: Network,

    /// CompactSize strictness for inbound payloads.
    pub compact_size: CompactSizeMode,

    /// Only accept the transaction whose id was announced in the mempool
    /// `inv`, instead of any transaction paying the address.
    pub require_announced_txid: bool,

    /// Give up on a watch after this many seconds without a verdict.
    pub watch_timeout_secs: u64,

    /// Largest payload accepted from a peer.
    pub max_payload_len: u32,

    /// Bytes requested from the stream per read.
    pub read_chunk_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            compact_size: CompactSizeMode::Lenient,
            require_announced_txid: false,
            watch_timeout_secs: 3_600,
            max_payload_len: MAX_PAYLOAD_LEN,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl WatchConfig {
    /// Small timeouts and regtest magic, for tests.
    pub fn for_testing() -> Self {
        Self {
            network: Network::Regtest,
            watch_timeout_secs: 5,
            read_chunk_size: 512,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parse watch config")
    }

    /// Deadline for one watch.
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_timeout_secs)
    }

    /// Matching rule the monitor applies to delivered transactions.
    pub fn match_policy(&self) -> MatchPolicy {
        if self.require_announced_txid {
            MatchPolicy::AnnouncedTxid
        } else {
            MatchPolicy::AnyOutput
        }
    }
}
