//! A single client connection and its read/delivery loops.

use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use futures_util::{SinkExt, StreamExt};
use philote_common::PhiloteId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::AccessKey;

use super::events::Message;
use super::hive::{Inbox, Registration, WeakHive};
use super::transport::{
    close_sink, FrameSink, FrameStream, Transport, CLOSE_NORMAL, CLOSE_TRY_AGAIN_LATER,
};

/// An authenticated connection that has not been admitted yet.
///
/// Handing it to [`Hive::connect`](super::hive::Hive::connect) either starts
/// its loops or closes its transport; a philote is never admitted twice.
pub struct Philote {
    pub id: PhiloteId,
    pub access_key: Arc<AccessKey>,
    transport: Transport,
    inbox_tx: Inbox,
    inbox_rx: mpsc::Receiver<Arc<Message>>,
}

impl Philote {
    pub fn new(access_key: AccessKey, transport: Transport, inbox_capacity: usize) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(inbox_capacity.max(1));
        Self {
            id: PhiloteId::generate(),
            access_key: Arc::new(access_key),
            transport,
            inbox_tx,
            inbox_rx,
        }
    }

    /// Spawn the read and delivery loops. Called by the keeper on admission.
    pub(crate) fn start(self, hive: WeakHive) -> Registration {
        let cancel = CancellationToken::new();
        let (sink, stream) = self.transport.split();

        let registration = Registration {
            access_key: self.access_key.clone(),
            inbox: self.inbox_tx,
            cancel: cancel.clone(),
        };

        let session = Session {
            id: self.id,
            access_key: self.access_key,
            hive,
            cancel,
        };
        tokio::spawn(session.clone().deliver(sink, self.inbox_rx));
        tokio::spawn(session.listen(stream));

        registration
    }

    /// Close the transport of a philote the hive had no room for.
    pub(crate) async fn reject(self) {
        self.transport
            .close(CLOSE_TRY_AGAIN_LATER, "connection limit reached")
            .await;
    }
}

/// State shared by the two loops of an admitted philote.
#[derive(Clone)]
struct Session {
    id: PhiloteId,
    access_key: Arc<AccessKey>,
    hive: WeakHive,
    cancel: CancellationToken,
}

impl Session {
    /// Read loop: decode frames, stamp the issuer, check write access and
    /// publish. Any read or decode failure ends the session.
    async fn listen(self, mut stream: FrameStream) {
        tracing::debug!(philote = %self.id, "listening to philote");

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return,
                frame = stream.next() => frame,
            };

            let decoded = match frame {
                Some(Ok(WsMessage::Text(text))) => Message::decode(text.as_str().as_bytes()),
                Some(Ok(WsMessage::Binary(bytes))) => Message::decode(&bytes),
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::debug!(philote = %self.id, "peer closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        philote = %self.id,
                        error = %e,
                        "error reading from socket, disconnecting"
                    );
                    break;
                }
            };

            let mut message = match decoded {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(philote = %self.id, error = %e, "invalid frame, disconnecting");
                    break;
                }
            };

            // Never trust the wire with the issuer.
            message.issuer_id = self.id.to_string();

            if message.is_close() {
                tracing::debug!(philote = %self.id, "philote asked to close");
                break;
            }

            tracing::debug!(
                philote = %self.id,
                channel = %message.channel,
                "received message from socket"
            );

            if !self.access_key.can_write(&message.channel) {
                tracing::info!(
                    philote = %self.id,
                    channel = %message.channel,
                    data = %message.data,
                    "message dropped due to insufficient write permissions"
                );
                continue;
            }

            let Some(hive) = self.hive.upgrade() else {
                break;
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                published = hive.publish(message) => {
                    if let Err(e) = published {
                        tracing::warn!(philote = %self.id, error = %e, "failed to publish message");
                    }
                }
            }
        }

        self.disconnect().await;
    }

    /// Delivery loop: write inbox messages to the transport in order.
    async fn deliver(self, mut sink: FrameSink, mut inbox: mpsc::Receiver<Arc<Message>>) {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = inbox.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
            };

            let text = match serde_json::to_string(&*message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(philote = %self.id, error = %e, "could not encode message");
                    continue;
                }
            };

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = sink.send(WsMessage::Text(text.into())) => sent,
            };
            if let Err(e) = sent {
                tracing::debug!(
                    philote = %self.id,
                    error = %e,
                    "error writing to socket, disconnecting"
                );
                self.disconnect().await;
                break;
            }
        }

        // Release publishers still waiting on this inbox before the close
        // handshake, which may take a while on a stalled peer.
        drop(inbox);
        close_sink(&mut sink, CLOSE_NORMAL, "disconnected").await;
        tracing::debug!(philote = %self.id, "closed philote");
    }

    async fn disconnect(&self) {
        if let Some(hive) = self.hive.upgrade() {
            if let Err(e) = hive.disconnect(&self.id).await {
                tracing::debug!(philote = %self.id, error = %e, "hive gone while disconnecting");
            }
        }
        // Covers a hive that stopped before it could cancel us.
        self.cancel.cancel();
    }
}
