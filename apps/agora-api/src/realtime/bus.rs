//! Group fan-out bus.
//!
//! Connections join named groups (`community:<id>`, `thread:<id>`,
//! `user:<id>`) and publishes deliver one payload to every member present at
//! call time. There is no replay or buffering; a subscriber that joins late
//! sees only later publishes. Backed by an in-process registry, with a Redis
//! pub/sub variant for multi-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Per-connection delivery channel. The gateway task owns the receiving end
/// and writes each payload to its WebSocket.
pub type Subscriber = mpsc::UnboundedSender<String>;

#[async_trait]
pub trait FanoutBus: Send + Sync {
    /// Add a connection to a group. Idempotent: re-joining with the same
    /// connection id replaces the delivery channel without growing the
    /// membership.
    async fn join(&self, group: &str, connection_id: &str, subscriber: Subscriber);

    /// Remove a connection from a group. Idempotent; unknown groups and
    /// members are ignored.
    async fn leave(&self, group: &str, connection_id: &str);

    /// Deliver a payload to every current member of a group. Members whose
    /// channel has closed are evicted and delivery continues with the rest.
    async fn publish(&self, group: &str, payload: &str);
}

/// In-process implementation. All membership mutation and publish iteration
/// for one group serializes through the map entry.
#[derive(Default)]
pub struct LocalBus {
    groups: DashMap<String, HashMap<String, Subscriber>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Number of live members in a group.
    pub fn member_count(&self, group: &str) -> usize {
        self.groups.get(group).map(|members| members.len()).unwrap_or(0)
    }
}

#[async_trait]
impl FanoutBus for LocalBus {
    async fn join(&self, group: &str, connection_id: &str, subscriber: Subscriber) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(connection_id.to_string(), subscriber);
    }

    async fn leave(&self, group: &str, connection_id: &str) {
        let mut emptied = false;
        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(connection_id);
            emptied = members.is_empty();
        }
        if emptied {
            self.groups.remove_if(group, |_, members| members.is_empty());
        }
    }

    async fn publish(&self, group: &str, payload: &str) {
        let mut emptied = false;
        if let Some(mut members) = self.groups.get_mut(group) {
            members.retain(|connection_id, subscriber| {
                let delivered = subscriber.send(payload.to_string()).is_ok();
                if !delivered {
                    tracing::debug!(group, connection_id, "evicting closed subscriber");
                }
                delivered
            });
            emptied = members.is_empty();
        }
        if emptied {
            self.groups.remove_if(group, |_, members| members.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> (Subscriber, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let bus = LocalBus::new();
        let (tx_old, mut rx_old) = subscriber();
        let (tx_new, mut rx_new) = subscriber();

        bus.join("community:c1", "conn_a", tx_old).await;
        bus.join("community:c1", "conn_a", tx_new).await;

        assert_eq!(bus.member_count("community:c1"), 1);

        bus.publish("community:c1", "hello").await;
        assert_eq!(rx_new.recv().await.unwrap(), "hello");
        assert!(rx_old.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_reaches_members_present_at_call_time() {
        let bus = LocalBus::new();
        let (tx_a, mut rx_a) = subscriber();

        bus.join("thread:7", "conn_a", tx_a).await;
        bus.publish("thread:7", "first").await;

        let (tx_b, mut rx_b) = subscriber();
        bus.join("thread:7", "conn_b", tx_b).await;
        bus.publish("thread:7", "second").await;

        assert_eq!(rx_a.recv().await.unwrap(), "first");
        assert_eq!(rx_a.recv().await.unwrap(), "second");
        // The late joiner never sees the earlier publish.
        assert_eq!(rx_b.recv().await.unwrap(), "second");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscriber_is_evicted_and_delivery_continues() {
        let bus = LocalBus::new();
        let (tx_a, mut rx_a) = subscriber();
        let (tx_b, rx_b) = subscriber();

        bus.join("community:c1", "conn_a", tx_a).await;
        bus.join("community:c1", "conn_b", tx_b).await;
        drop(rx_b);

        bus.publish("community:c1", "payload").await;

        assert_eq!(rx_a.recv().await.unwrap(), "payload");
        assert_eq!(bus.member_count("community:c1"), 1);
    }

    #[tokio::test]
    async fn leave_is_idempotent_and_drops_empty_groups() {
        let bus = LocalBus::new();
        let (tx, _rx) = subscriber();

        bus.join("user:u1", "conn_a", tx).await;
        bus.leave("user:u1", "conn_a").await;
        bus.leave("user:u1", "conn_a").await;
        bus.leave("user:unknown", "conn_a").await;

        assert_eq!(bus.member_count("user:u1"), 0);
        assert!(bus.groups.is_empty());
    }

    #[tokio::test]
    async fn publish_to_unknown_group_is_a_noop() {
        let bus = LocalBus::new();
        bus.publish("thread:404", "payload").await;
        assert_eq!(bus.member_count("thread:404"), 0);
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let bus = LocalBus::new();
        let (tx_a, mut rx_a) = subscriber();
        let (tx_b, mut rx_b) = subscriber();

        bus.join("thread:1", "conn_a", tx_a).await;
        bus.join("thread:2", "conn_b", tx_b).await;

        bus.publish("thread:1", "only-thread-1").await;

        assert_eq!(rx_a.recv().await.unwrap(), "only-thread-1");
        assert!(rx_b.try_recv().is_err());
    }
}
