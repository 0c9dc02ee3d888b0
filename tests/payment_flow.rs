use async_trait::async_trait;
use bitcoin::{
    absolute::LockTime,
    block::{Header as BlockHeader, Version as BlockVersion},
    hashes::{sha256d, Hash},
    pow::CompactTarget,
    transaction::Version,
    Amount, BlockHash, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use spv_watch::merkle::merkle_root;
use spv_watch::payload::{Inventory, InventoryType, MerkleBlockMessage};
use spv_watch::prelude::*;
use spv_watch::{
    FailedPayment, FailureReason, FrameBuffer, MonitorState, PartialMerkleTree, SuccessfulPayment,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// ------- Minimal in-memory verdict store -------
#[derive(Default, Clone)]
struct MemStore {
    verdicts: Arc<Mutex<HashMap<String, Verdict>>>,
}
#[async_trait]
impl VerdictStore for MemStore {
    async fn load_verdict(&self, address: &WatchedAddress) -> anyhow::Result<Option<Verdict>> {
        Ok(self.verdicts.lock().unwrap().get(&address.key()).cloned())
    }
    async fn save_verdict(&self, address: &WatchedAddress, verdict: &Verdict) -> anyhow::Result<()> {
        self.verdicts
            .lock()
            .unwrap()
            .insert(address.key(), verdict.clone());
        Ok(())
    }
}

/// ------- Hooks: verdict recorder -------
#[derive(Default, Clone)]
struct RecordingHooks {
    verdicts: Arc<Mutex<Vec<Verdict>>>,
    states: Arc<Mutex<Vec<MonitorState>>>,
}
#[async_trait]
impl PaymentHooks for RecordingHooks {
    async fn on_verdict(&self, _address: &WatchedAddress, verdict: &Verdict) -> anyhow::Result<()> {
        self.verdicts.lock().unwrap().push(verdict.clone());
        Ok(())
    }
    async fn on_state_change(
        &self,
        _address: &WatchedAddress,
        state: MonitorState,
    ) -> anyhow::Result<()> {
        self.states.lock().unwrap().push(state);
        Ok(())
    }
}

/// ------- Transport replaying a fixed script of inbound payloads -------
struct ScriptedTransport {
    inbound: VecDeque<NetworkPayload>,
    sent: Arc<Mutex<Vec<NetworkPayload>>>,
    hang_when_empty: bool,
}
impl ScriptedTransport {
    fn new(inbound: Vec<NetworkPayload>) -> Self {
        Self {
            inbound: inbound.into(),
            sent: Arc::default(),
            hang_when_empty: false,
        }
    }
    fn hanging(inbound: Vec<NetworkPayload>) -> Self {
        Self {
            hang_when_empty: true,
            ..Self::new(inbound)
        }
    }
}
#[async_trait]
impl PeerTransport for ScriptedTransport {
    async fn send(&mut self, payload: NetworkPayload) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
    async fn recv(&mut self) -> anyhow::Result<Option<NetworkPayload>> {
        match self.inbound.pop_front() {
            Some(p) => Ok(Some(p)),
            None if self.hang_when_empty => std::future::pending().await,
            None => Ok(None),
        }
    }
}

fn watched() -> WatchedAddress {
    let pkh: PubkeyHash = "415a05d63df2c212e1c750a70eba49d6d8af196d".parse().unwrap();
    WatchedAddress::from_pubkey_hash(pkh)
}

fn paying_tx(to: &WatchedAddress) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_raw_hash(sha256d::Hash::hash(b"prev")), 0),
            script_sig: ScriptBuf::from_bytes(vec![0x51]),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(50_000),
            script_pubkey: to.script_pubkey().clone(),
        }],
    }
}

/// Block of 8 transactions with `tx` at index 5.
fn block_with(tx: &Transaction) -> (BlockHeader, Vec<Txid>) {
    let mut ids: Vec<Txid> = (0u8..8)
        .map(|i| Txid::from_raw_hash(sha256d::Hash::hash(&[i, 0xaa])))
        .collect();
    ids[5] = tx.compute_txid();
    let header = BlockHeader {
        version: BlockVersion::TWO,
        prev_blockhash: BlockHash::all_zeros(),
        merkle_root: merkle_root(&ids).unwrap(),
        time: 1_700_000_000,
        bits: CompactTarget::from_consensus(0x207f_ffff),
        nonce: 42,
    };
    (header, ids)
}

fn script_for(tx: &Transaction, header: BlockHeader, tree: PartialMerkleTree) -> Vec<NetworkPayload> {
    vec![
        NetworkPayload::Verack,
        NetworkPayload::Inv(vec![Inventory::transaction(tx.compute_txid())]),
        NetworkPayload::Ping(1),
        NetworkPayload::Tx(tx.clone()),
        NetworkPayload::Inv(vec![Inventory::new(
            InventoryType::Block,
            header.block_hash().to_raw_hash(),
        )]),
        NetworkPayload::MerkleBlock(MerkleBlockMessage { header, tree }),
    ]
}

fn matching_tree(ids: &[Txid], index: usize) -> PartialMerkleTree {
    let mut matches = vec![false; ids.len()];
    matches[index] = true;
    PartialMerkleTree::from_txids(ids, &matches)
}

/// Route watcher logs to the test output; `RUST_LOG=spv_watch=trace` to see them.
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn proven_payment_is_reported_stored_and_requested_in_order() -> anyhow::Result<()> {
    init_logs();
    let address = watched();
    let tx = paying_tx(&address);
    let (header, ids) = block_with(&tx);

    let transport = ScriptedTransport::new(script_for(&tx, header, matching_tree(&ids, 5)));
    let sent = transport.sent.clone();
    let hooks = RecordingHooks::default();
    let store = MemStore::default();

    let mut watcher =
        PaymentWatcher::new(transport, hooks.clone(), store.clone(), WatchConfig::for_testing());
    let verdict = watcher.watch(address.clone()).await?;

    let expected = Verdict::Success(SuccessfulPayment {
        txid: tx.compute_txid(),
        block_header: header,
    });
    assert_eq!(verdict, expected);
    assert_eq!(*hooks.verdicts.lock().unwrap(), vec![expected.clone()]);
    assert_eq!(store.load_verdict(&address).await?, Some(expected));
    assert_eq!(
        *hooks.states.lock().unwrap(),
        vec![
            MonitorState::WaitingForTransaction,
            MonitorState::WatchingForBlockAnnouncement,
            MonitorState::WaitingForMerkleBlock,
            MonitorState::Succeeded,
        ]
    );
    assert_eq!(
        *sent.lock().unwrap(),
        vec![
            NetworkPayload::GetData(vec![Inventory::transaction(tx.compute_txid())]),
            NetworkPayload::GetData(vec![Inventory::filtered_block(header.block_hash())]),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn proof_against_wrong_root_fails() -> anyhow::Result<()> {
    let address = watched();
    let tx = paying_tx(&address);
    let (mut header, ids) = block_with(&tx);
    header.merkle_root = merkle_root(&ids[..7]).unwrap();

    let transport = ScriptedTransport::new(script_for(&tx, header, matching_tree(&ids, 5)));
    let mut watcher = PaymentWatcher::new(
        transport,
        RecordingHooks::default(),
        MemStore::default(),
        WatchConfig::for_testing(),
    );
    let verdict = watcher.watch(address).await?;
    assert_eq!(
        verdict,
        Verdict::Failure(FailedPayment {
            reason: FailureReason::RootMismatch
        })
    );
    Ok(())
}

#[tokio::test]
async fn proof_without_the_payment_fails() -> anyhow::Result<()> {
    let address = watched();
    let tx = paying_tx(&address);
    let (header, ids) = block_with(&tx);

    let transport = ScriptedTransport::new(script_for(&tx, header, matching_tree(&ids, 2)));
    let mut watcher = PaymentWatcher::new(
        transport,
        RecordingHooks::default(),
        MemStore::default(),
        WatchConfig::for_testing(),
    );
    assert_eq!(
        watcher.watch(address).await?,
        Verdict::Failure(FailedPayment {
            reason: FailureReason::PaymentNotFound
        })
    );
    Ok(())
}

#[tokio::test]
async fn peer_hanging_up_ends_the_watch() -> anyhow::Result<()> {
    let address = watched();
    let tx = paying_tx(&address);
    let transport = ScriptedTransport::new(vec![NetworkPayload::Inv(vec![
        Inventory::transaction(tx.compute_txid()),
    ])]);
    let hooks = RecordingHooks::default();
    let mut watcher = PaymentWatcher::new(
        transport,
        hooks.clone(),
        MemStore::default(),
        WatchConfig::for_testing(),
    );
    let verdict = watcher.watch(address).await?;
    assert_eq!(
        verdict,
        Verdict::Failure(FailedPayment {
            reason: FailureReason::TransportClosed
        })
    );
    assert_eq!(hooks.verdicts.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out() -> anyhow::Result<()> {
    let transport = ScriptedTransport::hanging(vec![NetworkPayload::Ping(3)]);
    let mut watcher = PaymentWatcher::new(
        transport,
        RecordingHooks::default(),
        MemStore::default(),
        WatchConfig::for_testing(),
    );
    let verdict = watcher.watch(watched()).await?;
    assert_eq!(
        verdict,
        Verdict::Failure(FailedPayment {
            reason: FailureReason::Timeout
        })
    );
    Ok(())
}

#[tokio::test]
async fn cancellation_wins_over_a_silent_peer() -> anyhow::Result<()> {
    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
    let transport = ScriptedTransport::hanging(vec![]);
    let mut watcher = PaymentWatcher::new(
        transport,
        RecordingHooks::default(),
        MemStore::default(),
        WatchConfig::for_testing(),
    );
    cancel_tx.send(()).unwrap();
    let verdict = watcher
        .watch_until(watched(), async {
            let _ = cancel_rx.await;
        })
        .await?;
    assert_eq!(
        verdict,
        Verdict::Failure(FailedPayment {
            reason: FailureReason::Cancelled
        })
    );
    Ok(())
}

#[tokio::test]
async fn stored_success_skips_the_network() -> anyhow::Result<()> {
    let address = watched();
    let tx = paying_tx(&address);
    let (header, _) = block_with(&tx);
    let proven = Verdict::Success(SuccessfulPayment {
        txid: tx.compute_txid(),
        block_header: header,
    });
    let store = MemStore::default();
    store.save_verdict(&address, &proven).await?;

    let transport = ScriptedTransport::new(vec![]);
    let sent = transport.sent.clone();
    let hooks = RecordingHooks::default();
    let mut watcher =
        PaymentWatcher::new(transport, hooks.clone(), store, WatchConfig::for_testing());
    assert_eq!(watcher.watch(address).await?, proven);
    assert!(sent.lock().unwrap().is_empty());
    assert!(hooks.verdicts.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn watch_over_a_byte_stream() -> anyhow::Result<()> {
    init_logs();
    let cfg = WatchConfig::for_testing();
    let address = watched();
    let tx = paying_tx(&address);
    let (header, ids) = block_with(&tx);

    let (ours, mut theirs) = tokio::io::duplex(1 << 16);
    let peer_codec = spv_watch::WireCodec::from_config(&cfg);
    let peer = tokio::spawn(async move {
        for payload in script_for(&tx, header, matching_tree(&ids, 5)) {
            theirs.write_all(&peer_codec.frame(&payload)).await?;
        }
        let mut received = Vec::new();
        theirs.read_to_end(&mut received).await?;

        let mut frames = FrameBuffer::default();
        let requests = frames
            .extend(&received)
            .iter()
            .map(|msg| peer_codec.decode_message(msg))
            .collect::<Result<Vec<_>, _>>()?;
        anyhow::Ok(requests)
    });

    let transport = FramedTransport::new(ours, &cfg);
    let mut watcher =
        PaymentWatcher::new(transport, RecordingHooks::default(), MemStore::default(), cfg);
    let verdict = watcher.watch(address).await?;
    assert!(verdict.is_success());

    let (transport, _, _) = watcher.into_parts();
    drop(transport);
    let requests = peer.await??;
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|p| matches!(p, NetworkPayload::GetData(items) if items.len() == 1)));
    Ok(())
}

#[tokio::test]
async fn corrupt_frame_from_peer_still_yields_a_verdict() -> anyhow::Result<()> {
    let cfg = WatchConfig::for_testing();
    let address = watched();

    let (ours, mut theirs) = tokio::io::duplex(1 << 12);
    let mut frame = spv_watch::WireCodec::from_config(&cfg).frame(&NetworkPayload::Ping(7));
    *frame.last_mut().unwrap() ^= 0x01;
    theirs.write_all(&frame).await?;

    let hooks = RecordingHooks::default();
    let store = MemStore::default();
    let mut watcher =
        PaymentWatcher::new(FramedTransport::new(ours, &cfg), hooks.clone(), store.clone(), cfg);
    let verdict = watcher.watch(address.clone()).await?;

    let closed = Verdict::Failure(FailedPayment {
        reason: FailureReason::TransportClosed,
    });
    assert_eq!(verdict, closed);
    assert_eq!(*hooks.verdicts.lock().unwrap(), vec![closed.clone()]);
    assert_eq!(store.load_verdict(&address).await?, Some(closed));
    drop(theirs);
    Ok(())
}
