//! Bidirectional frame transport owned by one connection.
//!
//! Backed by an upgraded WebSocket in production and by a pair of in-memory
//! channels in tests.

use std::pin::Pin;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use super::events::Message;

pub type FrameSink = Pin<Box<dyn Sink<WsMessage, Error = axum::Error> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<WsMessage, axum::Error>> + Send>>;

/// How long a close handshake may take before the transport is just dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

pub struct Transport {
    sink: FrameSink,
    stream: FrameStream,
}

impl Transport {
    pub fn from_socket(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// An in-memory transport and the peer end that drives it.
    ///
    /// Frames written by the server side queue up in a buffer of
    /// `outbound_capacity`; once it is full, writes wait until the peer reads.
    pub fn in_memory(outbound_capacity: usize) -> (Self, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (outbound_tx, outbound_rx) = mpsc::channel::<WsMessage>(outbound_capacity.max(1));

        let sink = futures_util::sink::unfold(outbound_tx, |tx, frame: WsMessage| async move {
            tx.send(frame).await.map_err(axum::Error::new)?;
            Ok::<_, axum::Error>(tx)
        });
        let stream = futures_util::stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Ok(frame), rx))
        });

        let transport = Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        };
        let peer = MemoryPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (transport, peer)
    }

    pub(crate) fn split(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }

    /// Close without ever having read or written a message.
    pub(crate) async fn close(self, code: u16, reason: &str) {
        let (mut sink, _stream) = self.split();
        close_sink(&mut sink, code, reason).await;
    }
}

/// Send a close frame and close the write half, bounded by [`CLOSE_TIMEOUT`].
pub(crate) async fn close_sink(sink: &mut FrameSink, code: u16, reason: &str) {
    let frame = WsMessage::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));

    let closed = time::timeout(CLOSE_TIMEOUT, async {
        sink.send(frame).await?;
        sink.close().await
    })
    .await;

    match closed {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(?e, "error while closing transport"),
        Err(_) => tracing::debug!("timed out closing transport"),
    }
}

/// Test-side end of an in-memory [`Transport`].
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<WsMessage>,
    outbound: mpsc::Receiver<WsMessage>,
}

impl MemoryPeer {
    /// Deliver a raw frame to the server side. Returns `false` once the
    /// server has stopped reading.
    pub fn send(&self, frame: WsMessage) -> bool {
        self.inbound.send(frame).is_ok()
    }

    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send(WsMessage::Text(value.to_string().into()))
    }

    /// Next frame written by the server; `None` once the write half is gone.
    pub async fn recv(&mut self) -> Option<WsMessage> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<WsMessage> {
        self.outbound.try_recv().ok()
    }

    /// Next decoded message, or `None` on a close frame or end of stream.
    pub async fn recv_message(&mut self) -> Option<Message> {
        loop {
            match self.recv().await? {
                WsMessage::Text(text) => return Message::decode(text.as_str().as_bytes()).ok(),
                WsMessage::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// Resolves once the server has dropped the read half.
    pub async fn read_half_dropped(&self) {
        self.inbound.closed().await
    }
}
