//! Commit-gated event dispatch.
//!
//! Write handlers run their transaction, collect `OutboundEvent`s built
//! inside it, and hand the transaction's outcome to `dispatch_after`. Events
//! from a rolled-back transaction never reach the bus because the `Err` arm
//! drops them. Delivery runs on a spawned task so a slow subscriber cannot
//! stall the request.

use std::sync::Arc;

use super::bus::FanoutBus;
use super::events::OutboundEvent;

#[derive(Clone)]
pub struct EventEmitter {
    bus: Arc<dyn FanoutBus>,
}

impl EventEmitter {
    pub fn new(bus: Arc<dyn FanoutBus>) -> Self {
        Self { bus }
    }

    /// Unwrap a transaction outcome, dispatching its events only on `Ok`.
    pub fn dispatch_after<T, E>(
        &self,
        outcome: Result<(T, Vec<OutboundEvent>), E>,
    ) -> Result<T, E> {
        match outcome {
            Ok((value, events)) => {
                self.dispatch(events);
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }

    /// Queue events for delivery, preserving their order within one call.
    pub fn dispatch(&self, events: Vec<OutboundEvent>) {
        if events.is_empty() {
            return;
        }
        let bus = self.bus.clone();
        tokio::spawn(async move {
            for event in events {
                let payload = event.payload.to_string();
                bus.publish(&event.group, &payload).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::bus::LocalBus;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn event(group: &str, marker: &str) -> OutboundEvent {
        OutboundEvent {
            group: group.to_string(),
            payload: json!({ "type": marker }),
        }
    }

    #[tokio::test]
    async fn committed_events_are_delivered_in_order() {
        let bus = Arc::new(LocalBus::new());
        let emitter = EventEmitter::new(bus.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.join("thread:1", "conn_a", tx).await;

        let outcome: Result<(i64, Vec<OutboundEvent>), ()> = Ok((
            42,
            vec![event("thread:1", "first"), event("thread:1", "second")],
        ));
        let value = emitter.dispatch_after(outcome).unwrap();
        assert_eq!(value, 42);

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(first.contains("first"));
        assert!(second.contains("second"));
    }

    #[tokio::test]
    async fn rolled_back_events_never_reach_the_bus() {
        let bus = Arc::new(LocalBus::new());
        let emitter = EventEmitter::new(bus.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.join("thread:1", "conn_a", tx).await;

        let outcome: Result<((), Vec<OutboundEvent>), &str> =
            Err("constraint violation rolled the transaction back");
        assert!(emitter.dispatch_after(outcome).is_err());

        // A marker published afterwards must be the first thing received:
        // nothing from the failed transaction precedes it.
        emitter.dispatch(vec![event("thread:1", "marker")]);
        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert!(first.contains("marker"));
    }

    #[tokio::test]
    async fn empty_dispatch_spawns_nothing() {
        let bus = Arc::new(LocalBus::new());
        let emitter = EventEmitter::new(bus.clone());
        emitter.dispatch(Vec::new());
    }
}
