//! Driver for one payment watch:
//! 1) start a monitor for the address,
//! 2) feed it every payload the transport yields until a verdict or the deadline,
//! 3) send the requests it emits, then persist and report the verdict.
use std::future::Future;

use anyhow::Context;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::{
    config::WatchConfig,
    hooks::PaymentHooks,
    matcher::WatchedAddress,
    monitor::{MonitorInput, PaymentMonitor, Verdict},
    store::VerdictStore,
    transport::PeerTransport,
};

/// Core driver. `T` = peer transport, `H` = verdict hooks, `S` = verdict store.
pub struct PaymentWatcher<T, H, S> {
    transport: T,
    hooks: H,
    store: S,
    config: WatchConfig,
}

impl<T, H, S> PaymentWatcher<T, H, S>
where
    T: PeerTransport,
    H: PaymentHooks,
    S: VerdictStore,
{
    /// Create a watcher over a connected transport.
    pub fn new(transport: T, hooks: H, store: S, config: WatchConfig) -> Self {
        Self {
            transport,
            hooks,
            store,
            config,
        }
    }

    /// Settings in effect.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Give back the transport, hooks, and store.
    pub fn into_parts(self) -> (T, H, S) {
        (self.transport, self.hooks, self.store)
    }

    /// Watch `address` until the payment is proven, disproven, the peer goes
    /// away, or the configured timeout passes.
    ///
    /// A success already recorded in the store is returned without touching
    /// the network.
    ///
    /// # Errors
    /// Sending to the peer, hook, and store failures. Protocol outcomes (bad
    /// proof, timeout, disconnect, an unreadable peer stream) are a
    /// [`Verdict::Failure`], not an error.
    pub async fn watch(&mut self, address: WatchedAddress) -> anyhow::Result<Verdict> {
        self.watch_until(address, std::future::pending()).await
    }

    /// Like [`PaymentWatcher::watch`], but `cancel` completing ends the watch
    /// with a `Cancelled` failure.
    pub async fn watch_until<C>(
        &mut self,
        address: WatchedAddress,
        cancel: C,
    ) -> anyhow::Result<Verdict>
    where
        C: Future<Output = ()> + Send,
    {
        if let Some(previous) = self
            .store
            .load_verdict(&address)
            .await
            .with_context(|| format!("load verdict for {address}"))?
        {
            if previous.is_success() {
                debug!(%address, "payment already proven");
                return Ok(previous);
            }
        }

        let deadline = Instant::now() + self.config.watch_timeout();
        let mut monitor = PaymentMonitor::watching(address.clone(), self.config.match_policy());
        tokio::pin!(cancel);

        let verdict = loop {
            let input = tokio::select! {
                _ = &mut cancel => MonitorInput::Cancel,
                received = timeout_at(deadline, self.transport.recv()) => match received {
                    Err(_elapsed) => MonitorInput::Timeout,
                    Ok(Ok(Some(payload))) => MonitorInput::Payload(payload),
                    Ok(Ok(None)) => MonitorInput::Disconnected,
                    Ok(Err(err)) => {
                        warn!(%address, error = %format!("{err:#}"), "peer stream failed");
                        MonitorInput::Disconnected
                    }
                },
            };

            let before = monitor.state();
            let step = monitor.handle(input);
            for request in step.outbound {
                self.transport
                    .send(request)
                    .await
                    .context("send request to peer")?;
            }
            if step.state != before {
                self.hooks
                    .on_state_change(&address, step.state)
                    .await
                    .context("on_state_change")?;
            }
            if let Some(verdict) = step.verdict {
                break verdict;
            }
        };

        info!(%address, success = verdict.is_success(), "watch finished");
        self.store
            .save_verdict(&address, &verdict)
            .await
            .with_context(|| format!("save verdict for {address}"))?;
        self.hooks
            .on_verdict(&address, &verdict)
            .await
            .context("on_verdict")?;
        Ok(verdict)
    }
}
