//! Verdict persistence used by the watcher.
use async_trait::async_trait;

use crate::{matcher::WatchedAddress, monitor::Verdict};

/// Remembers the last verdict per watched address. Addresses and headers
/// are not stored beyond what a verdict carries.
#[async_trait]
pub trait VerdictStore: Send + Sync {
    /// Last verdict recorded for `address`.
    async fn load_verdict(&self, address: &WatchedAddress) -> anyhow::Result<Option<Verdict>>;

    /// Record `verdict` for `address`, replacing any earlier one.
    async fn save_verdict(&self, address: &WatchedAddress, verdict: &Verdict)
        -> anyhow::Result<()>;

    /// Forget `address`.
    async fn clear_verdict(&self, _address: &WatchedAddress) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
