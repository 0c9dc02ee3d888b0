#![forbid(unsafe_code)]
#![deny(missing_docs)]
//! spv-watch: watch a Bitcoin address for a payment and prove it landed in a
//! block, from P2P messages and a BIP-37 partial merkle tree.
//!
//! ## What you implement
//! - [`PeerTransport`]: hand over decoded payloads from a connected peer and
//!   send requests back. [`FramedTransport`] does this over any tokio byte
//!   stream once the handshake is done.
//! - [`PaymentHooks`]: receive the verdict for each watch.
//! - [`VerdictStore`]: remember verdicts ([`SqliteStore`] ships in-tree).
//!
//! ## What the watcher does
//! - Waits for the payment to be announced in the mempool and requests it.
//! - Checks that the delivered transaction pays the watched script.
//! - Requests the filtered block once a block is announced and verifies the
//!   partial merkle tree against the header's merkle root.
//! - Reports `SuccessfulPayment` or `FailedPayment`, with a deadline.
//!
//! ## Minimal usage
//! ```rust,ignore
//! use spv_watch::prelude::*;
//! use async_trait::async_trait;
//!
//! struct PrintHooks;
//! #[async_trait]
//! impl PaymentHooks for PrintHooks {
//!     async fn on_verdict(&self, address: &WatchedAddress, verdict: &Verdict) -> anyhow::Result<()> {
//!         println!("{address}: {verdict:?}");
//!         Ok(())
//!     }
//! }
//!
//! async fn run(stream: tokio::net::TcpStream, pkh: bitcoin::PubkeyHash) -> anyhow::Result<()> {
//!     let config = WatchConfig::default();
//!     let transport = FramedTransport::new(stream, &config);
//!     let store = SqliteStore::new("verdicts.sqlite")?;
//!     let mut watcher = PaymentWatcher::new(transport, PrintHooks, store, config);
//!     let verdict = watcher.watch(WatchedAddress::from_pubkey_hash(pkh)).await?;
//!     assert!(verdict.is_success());
//!     Ok(())
//! }
//! ```

/// Payload encode/decode entry points.
pub mod codec;

/// CompactSize variable-length integers.
pub mod compact_size;

/// Watcher settings.
pub mod config;

/// Driver tying a transport to a payment monitor.
pub mod engine;

/// Typed errors.
pub mod error;

/// Splitting byte streams into whole messages.
pub mod frame;

/// The 24-byte message header.
pub mod headers;

/// Application callbacks.
pub mod hooks;

/// Matching transaction outputs against a watched address.
pub mod matcher;

/// Partial merkle tree construction and verification.
pub mod merkle;

/// The payment-monitor state machine.
pub mod monitor;

/// The P2P payload catalog.
pub mod payload;

/// Verdict persistence (traits and SQLite implementation).
pub mod store;

/// Peer transport trait and the framed stream adapter.
pub mod transport;

// Public re-exports
pub use codec::WireCodec;
pub use config::WatchConfig;
pub use engine::PaymentWatcher;
pub use error::{FailureReason, ProofError, WireError};
pub use frame::{split, FrameBuffer, NetworkMessage};
pub use hooks::PaymentHooks;
pub use matcher::WatchedAddress;
pub use merkle::{MerkleMatch, PartialMerkleTree};
pub use monitor::{
    FailedPayment, MatchPolicy, MonitorInput, MonitorState, PaymentMonitor, Step,
    SuccessfulPayment, Verdict,
};
pub use payload::NetworkPayload;
#[cfg(feature = "store-sqlite")]
pub use store::SqliteStore;
pub use store::VerdictStore;
pub use transport::{FramedTransport, PeerTransport};

/// Convenience prelude for end users.
pub mod prelude {
    #[cfg(feature = "store-sqlite")]
    pub use crate::SqliteStore;
    pub use crate::{
        FramedTransport, NetworkPayload, PaymentHooks, PaymentMonitor, PaymentWatcher,
        PeerTransport, Verdict, VerdictStore, WatchConfig, WatchedAddress,
    };
}
