//! Redis-backed fan-out for multi-process deployments.
//!
//! Each process keeps its own `LocalBus` registry for the connections it
//! serves. `publish` goes out over Redis pub/sub on the group-named channel;
//! a relay task subscribes to channels with local members and feeds received
//! payloads back into the local registry. Delivery to this process's own
//! subscribers also loops through Redis, so every process sees one ordered
//! stream per group.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;

use super::bus::{FanoutBus, LocalBus, Subscriber};

enum RelayCommand {
    Subscribe(String),
    Unsubscribe(String),
}

pub struct RedisBus {
    local: Arc<LocalBus>,
    publisher: ConnectionManager,
    relay_tx: mpsc::UnboundedSender<RelayCommand>,
}

impl RedisBus {
    /// Connect to Redis and start the relay task.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let publisher = client.get_connection_manager().await?;
        let pubsub = client.get_async_pubsub().await?;

        let local = Arc::new(LocalBus::new());
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_relay(pubsub, local.clone(), relay_rx));

        Ok(Self {
            local,
            publisher,
            relay_tx,
        })
    }
}

#[async_trait]
impl FanoutBus for RedisBus {
    async fn join(&self, group: &str, connection_id: &str, subscriber: Subscriber) {
        self.local.join(group, connection_id, subscriber).await;
        if self.local.member_count(group) == 1 {
            let _ = self.relay_tx.send(RelayCommand::Subscribe(group.to_string()));
        }
    }

    async fn leave(&self, group: &str, connection_id: &str) {
        self.local.leave(group, connection_id).await;
        if self.local.member_count(group) == 0 {
            let _ = self
                .relay_tx
                .send(RelayCommand::Unsubscribe(group.to_string()));
        }
    }

    async fn publish(&self, group: &str, payload: &str) {
        let mut conn = self.publisher.clone();
        if let Err(err) = redis::AsyncCommands::publish::<_, _, ()>(&mut conn, group, payload).await
        {
            tracing::warn!(?err, group, "redis publish failed");
        }
    }
}

/// Keeps the pub/sub subscription set in step with local membership and
/// relays received payloads to local subscribers.
async fn run_relay(
    pubsub: redis::aio::PubSub,
    local: Arc<LocalBus>,
    mut commands: mpsc::UnboundedReceiver<RelayCommand>,
) {
    let (mut sink, mut stream) = pubsub.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(RelayCommand::Subscribe(group)) => {
                    if let Err(err) = sink.subscribe(&group).await {
                        tracing::warn!(?err, group, "redis subscribe failed");
                    }
                }
                Some(RelayCommand::Unsubscribe(group)) => {
                    if let Err(err) = sink.unsubscribe(&group).await {
                        tracing::warn!(?err, group, "redis unsubscribe failed");
                    }
                }
                None => break,
            },
            message = stream.next() => match message {
                Some(msg) => {
                    let group = msg.get_channel_name().to_string();
                    match msg.get_payload::<String>() {
                        Ok(payload) => local.publish(&group, &payload).await,
                        Err(err) => {
                            tracing::warn!(?err, group, "undecodable pub/sub payload");
                        }
                    }
                }
                None => {
                    tracing::warn!("redis pub/sub stream closed, fan-out relay stopping");
                    break;
                }
            },
        }
    }
}
