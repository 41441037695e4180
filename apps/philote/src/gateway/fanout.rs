//! Publish backends.
//!
//! [`LocalBroker`] fans out straight to this process's connections.
//! [`RedisBroker`] routes every message through Redis pub/sub so that
//! several processes behind a load balancer share channels; a relay task in
//! each process turns what Redis delivers back into a local fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::GatewayError;

use super::events::Message;
use super::hive::{Hive, WeakHive};

/// Redis pub/sub channel prefix; the gateway channel name follows it.
pub const REDIS_CHANNEL_PREFIX: &str = "philote:channel:";

/// Delay before the relay resubscribes after losing Redis.
const RELAY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Where published messages go.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, hive: &Hive, message: Arc<Message>) -> Result<(), GatewayError>;
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

pub struct LocalBroker;

#[async_trait]
impl Broker for LocalBroker {
    async fn publish(&self, hive: &Hive, message: Arc<Message>) -> Result<(), GatewayError> {
        let delivered = hive.fan_out(message.clone()).await?;
        tracing::trace!(channel = %message.channel, delivered, "message fanned out");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

pub fn redis_channel(channel: &str) -> String {
    format!("{REDIS_CHANNEL_PREFIX}{channel}")
}

#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    connection: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, connection })
    }

    /// Subscribe to every gateway channel and fan incoming messages out to
    /// `hive`'s connections. Resubscribes after connection loss and stops
    /// once the hive is gone.
    pub fn spawn_relay(&self, hive: &Hive) -> JoinHandle<()> {
        let client = self.client.clone();
        let hive = hive.downgrade();

        tokio::spawn(async move {
            loop {
                if let Err(e) = relay(&client, &hive).await {
                    tracing::warn!(error = %e, "redis relay failed, resubscribing");
                }
                if hive.upgrade().is_none() {
                    break;
                }
                time::sleep(RELAY_RETRY_DELAY).await;
            }
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, _hive: &Hive, message: Arc<Message>) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(&*message)?;
        let mut connection = self.connection.clone();
        connection
            .publish::<_, _, ()>(redis_channel(&message.channel), payload)
            .await?;
        Ok(())
    }
}

async fn relay(client: &redis::Client, hive: &WeakHive) -> Result<(), GatewayError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(format!("{REDIS_CHANNEL_PREFIX}*")).await?;
    tracing::info!("subscribed to redis fan-out");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: Vec<u8> = msg.get_payload()?;
        if relay_payload(hive, &payload).await?.is_none() {
            return Ok(());
        }
    }

    Ok(())
}

/// Fan one payload received from Redis out to local connections.
///
/// Returns how many connections it reached, zero for a payload that is not a
/// gateway message, and `None` once the hive is gone.
async fn relay_payload(hive: &WeakHive, payload: &[u8]) -> Result<Option<usize>, GatewayError> {
    let Some(hive) = hive.upgrade() else {
        return Ok(None);
    };

    let message = match Message::decode(payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "[security] redis payload is not a gateway message");
            return Ok(Some(0));
        }
    };

    let delivered = hive.fan_out(Arc::new(message)).await?;
    Ok(Some(delivered))
}
