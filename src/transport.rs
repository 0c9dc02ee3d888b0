//! Peer transport boundary and a framed adapter over any async byte stream.
use std::collections::VecDeque;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::{codec::WireCodec, config::WatchConfig, frame::FrameBuffer, payload::NetworkPayload};

/// Source and sink of decoded payloads for one peer.
///
/// Connection setup and the version handshake happen before a transport is
/// handed to the watcher.
#[async_trait]
pub trait PeerTransport: Send {
    /// Send one payload to the peer.
    async fn send(&mut self, payload: NetworkPayload) -> anyhow::Result<()>;

    /// Next decoded payload in wire order; `None` once the peer is gone.
    async fn recv(&mut self) -> anyhow::Result<Option<NetworkPayload>>;
}

/// [`PeerTransport`] over a raw byte stream (TCP socket, duplex pipe, ...).
///
/// Frames outbound payloads with the configured network magic. Inbound
/// messages that decode badly, or carry another network's magic, are logged
/// and dropped; the stream stays open. A frame that can never complete
/// (checksum mismatch, oversized declaration) is an error.
pub struct FramedTransport<S> {
    stream: S,
    codec: WireCodec,
    frames: FrameBuffer,
    ready: VecDeque<NetworkPayload>,
    chunk_size: usize,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap `stream` using the network and limits in `cfg`.
    pub fn new(stream: S, cfg: &WatchConfig) -> Self {
        let codec = WireCodec::from_config(cfg);
        Self {
            stream,
            frames: FrameBuffer::new(codec.max_payload_len()),
            codec,
            ready: VecDeque::new(),
            chunk_size: cfg.read_chunk_size.max(1),
        }
    }

    /// Codec used for both directions.
    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn accept_frames(&mut self, bytes: &[u8]) {
        for msg in self.frames.extend(bytes) {
            if msg.header.magic != self.codec.magic() {
                warn!(
                    magic = %hex::encode(msg.header.magic),
                    "dropping message for another network"
                );
                continue;
            }
            match self.codec.decode_message(&msg) {
                Ok(payload) => {
                    trace!(command = payload.command(), "received");
                    self.ready.push_back(payload);
                }
                Err(err) => warn!(error = %err, "dropping undecodable message"),
            }
        }
    }
}

#[async_trait]
impl<S> PeerTransport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, payload: NetworkPayload) -> anyhow::Result<()> {
        let bytes = self.codec.frame(&payload);
        trace!(command = payload.command(), len = bytes.len(), "sending");
        self.stream
            .write_all(&bytes)
            .await
            .with_context(|| format!("write {} to peer", payload.command()))?;
        self.stream.flush().await.context("flush peer stream")?;
        Ok(())
    }

    async fn recv(&mut self) -> anyhow::Result<Option<NetworkPayload>> {
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return Ok(Some(payload));
            }
            if let Some(err) = self.frames.stall() {
                return Err(anyhow::Error::new(err).context("peer stream cannot be reframed"));
            }

            let n = self.stream.read(&mut chunk).await.context("read from peer")?;
            if n == 0 {
                if !self.frames.pending().is_empty() {
                    debug!(
                        pending = self.frames.pending().len(),
                        "peer closed mid-message"
                    );
                }
                return Ok(None);
            }
            self.accept_frames(&chunk[..n]);
        }
    }
}
