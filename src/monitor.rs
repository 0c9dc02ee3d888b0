//! Payment monitor: one state machine per watched address.
//!
//! ```text
//! Idle --Watch--> WatchingForMempoolTx --inv(tx)--> WaitingForTransaction
//!   --tx pays address--> WatchingForBlockAnnouncement --inv(block)-->
//!   WaitingForMerkleBlock --merkleblock--> Succeeded | Failed
//! ```
//!
//! Inputs arrive one at a time through [`PaymentMonitor::handle`]; anything
//! unrelated to the current state is ignored. `Cancel` and `Timeout` end the
//! watch from any non-terminal state.
use bitcoin::{block, Transaction, Txid};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    error::FailureReason,
    matcher::{paying_outputs, WatchedAddress},
    payload::{Inventory, MerkleBlockMessage, NetworkPayload},
};

/// Which delivered transactions count as the payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPolicy {
    /// Any transaction with an output paying the address.
    #[default]
    AnyOutput,
    /// Only the transaction announced in the mempool `inv`, and it must pay
    /// the address.
    AnnouncedTxid,
}

/// Where a monitor is in its watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No address yet.
    Idle,
    /// Waiting for a mempool transaction announcement.
    WatchingForMempoolTx,
    /// Requested the announced transaction, waiting for it.
    WaitingForTransaction,
    /// Payment seen in the mempool, waiting for a block announcement.
    WatchingForBlockAnnouncement,
    /// Requested a filtered block, waiting for the `merkleblock`.
    WaitingForMerkleBlock,
    /// Payment proven.
    Succeeded,
    /// Watch ended without proof.
    Failed,
    /// Watch cancelled externally.
    Cancelled,
}

impl MonitorState {
    /// No further input changes this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MonitorState::Succeeded | MonitorState::Failed | MonitorState::Cancelled
        )
    }
}

/// Everything a monitor reacts to.
#[derive(Debug, Clone)]
pub enum MonitorInput {
    /// Start watching this address.
    Watch(WatchedAddress),
    /// A payload decoded from the peer.
    Payload(NetworkPayload),
    /// Stop watching.
    Cancel,
    /// The caller's deadline expired.
    Timeout,
    /// The peer connection ended.
    Disconnected,
}

impl From<NetworkPayload> for MonitorInput {
    fn from(payload: NetworkPayload) -> Self {
        MonitorInput::Payload(payload)
    }
}

/// Proof that the watched payment is in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulPayment {
    /// Id of the paying transaction.
    pub txid: Txid,
    /// Header of the block that includes it.
    pub block_header: block::Header,
}

/// The watch ended without a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPayment {
    /// What went wrong.
    pub reason: FailureReason,
}

/// Terminal outcome, delivered once per watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verdict {
    /// Payment proven.
    Success(SuccessfulPayment),
    /// Payment not proven.
    Failure(FailedPayment),
}

impl Verdict {
    fn failure(reason: FailureReason) -> Self {
        Verdict::Failure(FailedPayment { reason })
    }

    /// True for [`Verdict::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success(_))
    }
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// State after the input.
    pub state: MonitorState,
    /// Payloads to send to the peer, in order.
    pub outbound: Vec<NetworkPayload>,
    /// Set exactly once, on the transition into a terminal state.
    pub verdict: Option<Verdict>,
}

/// State machine for one watched address.
#[derive(Debug, Clone)]
pub struct PaymentMonitor {
    watched: Option<WatchedAddress>,
    expected_txid: Option<Txid>,
    state: MonitorState,
    pending: Option<Inventory>,
    policy: MatchPolicy,
}

impl Default for PaymentMonitor {
    fn default() -> Self {
        Self::new(MatchPolicy::default())
    }
}

impl PaymentMonitor {
    /// Idle monitor applying `policy` to delivered transactions.
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            watched: None,
            expected_txid: None,
            state: MonitorState::Idle,
            pending: None,
            policy,
        }
    }

    /// Monitor already watching `address`.
    pub fn watching(address: WatchedAddress, policy: MatchPolicy) -> Self {
        let mut monitor = Self::new(policy);
        monitor.handle(MonitorInput::Watch(address));
        monitor
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Address being watched, once set.
    pub fn watched(&self) -> Option<&WatchedAddress> {
        self.watched.as_ref()
    }

    /// Transaction id taken from the mempool announcement.
    pub fn expected_txid(&self) -> Option<Txid> {
        self.expected_txid
    }

    /// Outstanding `getdata` request, if any.
    pub fn pending(&self) -> Option<&Inventory> {
        self.pending.as_ref()
    }

    /// Apply one input and report the resulting state, outbound requests,
    /// and verdict.
    pub fn handle(&mut self, input: impl Into<MonitorInput>) -> Step {
        let input = input.into();
        if self.state.is_terminal() {
            trace!(state = ?self.state, "input after terminal state ignored");
            return self.step(Vec::new(), None);
        }

        match input {
            MonitorInput::Watch(address) => self.on_watch(address),
            MonitorInput::Cancel => {
                info!(address = ?self.watched.as_ref().map(|w| w.key()), "watch cancelled");
                self.state = MonitorState::Cancelled;
                self.step(Vec::new(), Some(Verdict::failure(FailureReason::Cancelled)))
            }
            MonitorInput::Timeout => self.fail(FailureReason::Timeout),
            MonitorInput::Disconnected => self.fail(FailureReason::TransportClosed),
            MonitorInput::Payload(payload) => self.on_payload(payload),
        }
    }

    fn on_watch(&mut self, address: WatchedAddress) -> Step {
        if self.state != MonitorState::Idle {
            debug!(state = ?self.state, "already watching; new address ignored");
            return self.step(Vec::new(), None);
        }
        info!(address = %address, "watching for payment");
        self.watched = Some(address);
        self.state = MonitorState::WatchingForMempoolTx;
        self.step(Vec::new(), None)
    }

    fn on_payload(&mut self, payload: NetworkPayload) -> Step {
        match (self.state, payload) {
            (MonitorState::WatchingForMempoolTx, NetworkPayload::Inv(items)) => {
                self.on_tx_announcement(&items)
            }
            (MonitorState::WaitingForTransaction, NetworkPayload::Tx(tx)) => {
                self.on_transaction(&tx)
            }
            (MonitorState::WatchingForBlockAnnouncement, NetworkPayload::Inv(items)) => {
                self.on_block_announcement(&items)
            }
            (MonitorState::WaitingForMerkleBlock, NetworkPayload::MerkleBlock(mb)) => {
                self.on_merkle_block(&mb)
            }
            (state, other) => {
                trace!(?state, command = other.command(), "payload ignored");
                self.step(Vec::new(), None)
            }
        }
    }

    fn on_tx_announcement(&mut self, items: &[Inventory]) -> Step {
        let Some(entry) = items.iter().find(|inv| inv.kind.is_transaction()) else {
            return self.step(Vec::new(), None);
        };
        let txid = entry.txid();
        debug!(%txid, "mempool transaction announced; requesting it");

        let request = Inventory::transaction(txid);
        self.expected_txid = Some(txid);
        self.pending = Some(request);
        self.state = MonitorState::WaitingForTransaction;
        self.step(vec![NetworkPayload::GetData(vec![request])], None)
    }

    fn on_transaction(&mut self, tx: &Transaction) -> Step {
        let Some(watched) = self.watched.as_ref() else {
            return self.step(Vec::new(), None);
        };
        let txid = tx.compute_txid();
        let outputs = paying_outputs(tx, watched);
        if outputs.is_empty() {
            debug!(%txid, "transaction does not pay the watched address");
            return self.step(Vec::new(), None);
        }
        if self.expected_txid != Some(txid) {
            match self.policy {
                MatchPolicy::AnnouncedTxid => {
                    debug!(%txid, expected = ?self.expected_txid, "paying transaction was not the announced one");
                    return self.step(Vec::new(), None);
                }
                MatchPolicy::AnyOutput => {
                    warn!(%txid, expected = ?self.expected_txid, "accepting paying transaction that differs from the announcement");
                }
            }
        }

        info!(%txid, ?outputs, "payment seen in mempool; waiting for a block");
        self.pending = None;
        self.state = MonitorState::WatchingForBlockAnnouncement;
        self.step(Vec::new(), None)
    }

    fn on_block_announcement(&mut self, items: &[Inventory]) -> Step {
        let Some(entry) = items.iter().find(|inv| inv.kind.is_block()) else {
            return self.step(Vec::new(), None);
        };
        let block_hash = entry.block_hash();
        debug!(%block_hash, "block announced; requesting merkle block");

        let request = Inventory::filtered_block(block_hash);
        self.pending = Some(request);
        self.state = MonitorState::WaitingForMerkleBlock;
        self.step(vec![NetworkPayload::GetData(vec![request])], None)
    }

    fn on_merkle_block(&mut self, mb: &MerkleBlockMessage) -> Step {
        let block_hash = mb.header.block_hash();
        if let Some(requested) = self.pending {
            if requested.block_hash() != block_hash {
                trace!(%block_hash, "merkle block for a block we did not request");
                return self.step(Vec::new(), None);
            }
        }

        let proof = match mb.tree.verify(mb.header.merkle_root) {
            Ok(proof) => proof,
            Err(err) => {
                warn!(%block_hash, error = %err, "merkle proof rejected");
                return self.fail(err.into());
            }
        };

        let found = self
            .expected_txid
            .filter(|expected| proof.matched.contains(expected));
        match found {
            Some(txid) => {
                info!(%txid, %block_hash, "payment confirmed");
                self.pending = None;
                self.state = MonitorState::Succeeded;
                let verdict = Verdict::Success(SuccessfulPayment {
                    txid,
                    block_header: mb.header,
                });
                self.step(Vec::new(), Some(verdict))
            }
            None => {
                warn!(%block_hash, matched = proof.matched.len(), "expected transaction absent from merkle block");
                self.fail(FailureReason::PaymentNotFound)
            }
        }
    }

    fn fail(&mut self, reason: FailureReason) -> Step {
        info!(%reason, "watch failed");
        self.pending = None;
        self.state = MonitorState::Failed;
        self.step(Vec::new(), Some(Verdict::failure(reason)))
    }

    fn step(&self, outbound: Vec<NetworkPayload>, verdict: Option<Verdict>) -> Step {
        Step {
            state: self.state,
            outbound,
            verdict,
        }
    }
}
