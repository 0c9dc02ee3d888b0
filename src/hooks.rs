//! Application glue: receive verdicts and, optionally, state changes.
use async_trait::async_trait;

use crate::{
    matcher::WatchedAddress,
    monitor::{MonitorState, Verdict},
};

#[async_trait]
/// Callbacks the watcher invokes while driving a monitor.
pub trait PaymentHooks: Send + Sync {
    /// Called exactly once per watch with the terminal verdict for `address`.
    async fn on_verdict(&self, address: &WatchedAddress, verdict: &Verdict) -> anyhow::Result<()>;

    /// Called after every transition that changed the monitor's state.
    async fn on_state_change(
        &self,
        _address: &WatchedAddress,
        _state: MonitorState,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
