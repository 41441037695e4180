//! The hive: registry of live connections and the broadcast engine.
//!
//! A single keeper task owns the connection map. Every other task talks to
//! it through [`Hive`], a cloneable handle that sends commands over a
//! channel, so admission, removal and recipient selection are serialized
//! without a shared lock.
//!
//! Fan-out is split in two. The keeper only picks recipients (readers of
//! the channel, minus the issuer) and hands their inbox senders back; the
//! publishing task then enqueues into those inboxes concurrently. A stalled
//! consumer therefore blocks only the publisher that is waiting on its full
//! inbox, never the keeper. A connection removed between selection and
//! enqueue may still get that one message into its inbox, but its delivery
//! loop is already cancelled and will not write it.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use philote_common::PhiloteId;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::auth::AccessKey;
use crate::error::GatewayError;

use super::events::Message;
use super::fanout::{Broker, LocalBroker};
use super::philote::Philote;

/// Pending requests the keeper can queue before callers wait.
const COMMAND_BUFFER: usize = 1024;

/// Sending half of a connection's inbox.
pub(crate) type Inbox = mpsc::Sender<Arc<Message>>;

/// Keeper-side record of an admitted connection.
pub(crate) struct Registration {
    pub access_key: Arc<AccessKey>,
    pub inbox: Inbox,
    pub cancel: CancellationToken,
}

enum Command {
    Connect {
        philote: Philote,
        reply: oneshot::Sender<Result<(), GatewayError>>,
    },
    Disconnect {
        id: PhiloteId,
        reply: oneshot::Sender<bool>,
    },
    DisconnectAll {
        reply: oneshot::Sender<usize>,
    },
    Recipients {
        channel: String,
        issuer_id: String,
        reply: oneshot::Sender<Vec<Inbox>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the hive. Cheap to clone; the keeper stops once every handle
/// is dropped.
#[derive(Clone)]
pub struct Hive {
    commands: mpsc::Sender<Command>,
    broker: Arc<dyn Broker>,
}

/// Non-owning reference held by connections and relays.
#[derive(Clone)]
pub struct WeakHive {
    commands: mpsc::WeakSender<Command>,
    broker: Arc<dyn Broker>,
}

impl WeakHive {
    pub fn upgrade(&self) -> Option<Hive> {
        Some(Hive {
            commands: self.commands.upgrade()?,
            broker: self.broker.clone(),
        })
    }
}

impl Hive {
    /// Start a hive that fans out within this process.
    pub fn new(max_connections: usize) -> Self {
        Self::with_broker(max_connections, Arc::new(LocalBroker))
    }

    pub fn with_broker(max_connections: usize, broker: Arc<dyn Broker>) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let hive = Self { commands, broker };

        let keeper = Keeper {
            philotes: HashMap::new(),
            max_connections,
            commands: rx,
            hive: hive.downgrade(),
        };
        tokio::spawn(keeper.run());

        hive
    }

    pub fn downgrade(&self) -> WeakHive {
        WeakHive {
            commands: self.commands.downgrade(),
            broker: self.broker.clone(),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| GatewayError::HiveClosed)?;
        rx.await.map_err(|_| GatewayError::HiveClosed)
    }

    /// Admit `philote` and start its loops, or close its transport when the
    /// hive is full.
    pub async fn connect(&self, philote: Philote) -> Result<(), GatewayError> {
        self.request(|reply| Command::Connect { philote, reply })
            .await?
    }

    /// Remove a connection and tear it down. Returns `false` if it was not
    /// registered.
    pub async fn disconnect(&self, id: &PhiloteId) -> Result<bool, GatewayError> {
        let id = id.clone();
        self.request(|reply| Command::Disconnect { id, reply }).await
    }

    /// Tear down every live connection. Returns how many there were.
    pub async fn disconnect_all(&self) -> Result<usize, GatewayError> {
        self.request(|reply| Command::DisconnectAll { reply }).await
    }

    /// Number of live connections; `0` once the hive has stopped.
    pub async fn count(&self) -> usize {
        self.request(|reply| Command::Count { reply })
            .await
            .unwrap_or(0)
    }

    /// Publish through the configured broker.
    pub async fn publish(&self, message: Message) -> Result<(), GatewayError> {
        let broker = self.broker.clone();
        broker.publish(self, Arc::new(message)).await
    }

    /// Deliver `message` to every local connection that may read its
    /// channel, except the issuer. Returns the number of inboxes that
    /// accepted it.
    ///
    /// Waits while a recipient's inbox is full.
    pub async fn fan_out(&self, message: Arc<Message>) -> Result<usize, GatewayError> {
        let channel = message.channel.clone();
        let issuer_id = message.issuer_id.clone();
        let inboxes = self
            .request(|reply| Command::Recipients {
                channel,
                issuer_id,
                reply,
            })
            .await?;

        let deliveries = inboxes.iter().map(|inbox| inbox.send(message.clone()));
        let delivered = join_all(deliveries)
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count();

        Ok(delivered)
    }
}

struct Keeper {
    philotes: HashMap<PhiloteId, Registration>,
    max_connections: usize,
    commands: mpsc::Receiver<Command>,
    hive: WeakHive,
}

impl Keeper {
    async fn run(mut self) {
        tracing::debug!(max_connections = self.max_connections, "hive keeper started");

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Connect { philote, reply } => {
                    let _ = reply.send(self.admit(philote));
                }
                Command::Disconnect { id, reply } => {
                    let _ = reply.send(self.remove(&id));
                }
                Command::DisconnectAll { reply } => {
                    let ids: Vec<PhiloteId> = self.philotes.keys().cloned().collect();
                    for id in &ids {
                        self.remove(id);
                    }
                    let _ = reply.send(ids.len());
                }
                Command::Recipients {
                    channel,
                    issuer_id,
                    reply,
                } => {
                    let _ = reply.send(self.recipients(&channel, &issuer_id));
                }
                Command::Count { reply } => {
                    let _ = reply.send(self.philotes.len());
                }
            }
        }

        for (_, registration) in self.philotes.drain() {
            registration.cancel.cancel();
        }
        tracing::debug!("hive keeper stopped");
    }

    fn admit(&mut self, philote: Philote) -> Result<(), GatewayError> {
        if self.philotes.len() >= self.max_connections {
            tracing::warn!(
                philote = %philote.id,
                max_connections = self.max_connections,
                "connection limit reached, dropping new connection"
            );
            tokio::spawn(philote.reject());
            return Err(GatewayError::CapacityExceeded(self.max_connections));
        }

        tracing::debug!(philote = %philote.id, "registering philote");
        let id = philote.id.clone();
        let registration = philote.start(self.hive.clone());
        self.philotes.insert(id, registration);
        Ok(())
    }

    fn remove(&mut self, id: &PhiloteId) -> bool {
        match self.philotes.remove(id) {
            Some(registration) => {
                tracing::debug!(philote = %id, "disconnecting philote");
                registration.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn recipients(&self, channel: &str, issuer_id: &str) -> Vec<Inbox> {
        self.philotes
            .iter()
            .filter(|(id, registration)| {
                id.as_str() != issuer_id && registration.access_key.can_read(channel)
            })
            .map(|(_, registration)| registration.inbox.clone())
            .collect()
    }
}
