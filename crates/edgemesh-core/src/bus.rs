//! In-process event bus
//!
//! Publish/subscribe fan-out with a bounded queue per subscriber. A slow
//! subscriber never blocks publishers: on overflow the oldest pending event
//! is dropped and the cumulative drop count rides along with the next
//! delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::trace;

use crate::models::{JobUpdate, NodeUpdate};

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// An event handed to a subscriber, annotated with the number of events
/// dropped for this subscriber so far.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    /// The published event
    pub event: T,
    /// Monotonically increasing count of events this subscriber lost
    pub dropped: u64,
}

struct Slot<T> {
    queue: VecDeque<T>,
    dropped: u64,
    notify: Arc<Notify>,
}

struct Inner<T> {
    next_id: u64,
    slots: HashMap<u64, Slot<T>>,
}

/// A single-topic bus. Publishing walks every subscriber queue under a
/// short lock and never awaits.
pub struct EventBus<T> {
    inner: Arc<Mutex<Inner<T>>>,
    capacity: usize,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> EventBus<T> {
    /// Create a bus with the default per-subscriber capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus with an explicit per-subscriber capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                slots: HashMap::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event to every current subscriber.
    pub fn publish(&self, event: T) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        for slot in inner.slots.values_mut() {
            if slot.queue.len() >= self.capacity {
                slot.queue.pop_front();
                slot.dropped += 1;
                trace!(dropped = slot.dropped, "subscriber queue overflow");
            }
            slot.queue.push_back(event.clone());
            slot.notify.notify_one();
        }
    }

    /// Register a new subscriber. The subscription is removed when the
    /// returned handle is dropped.
    pub fn subscribe(&self) -> Subscription<T> {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.slots.insert(
            id,
            Slot {
                queue: VecDeque::new(),
                dropped: 0,
                notify: Arc::clone(&notify),
            },
        );
        Subscription {
            id,
            inner: Arc::clone(&self.inner),
            notify,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("bus lock poisoned").slots.len()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's end of the bus.
pub struct Subscription<T> {
    id: u64,
    inner: Arc<Mutex<Inner<T>>>,
    notify: Arc<Notify>,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Delivery<T> {
        loop {
            if let Some(delivery) = self.try_recv() {
                return delivery;
            }
            self.notify.notified().await;
        }
    }

    /// Take the next pending event without waiting.
    pub fn try_recv(&mut self) -> Option<Delivery<T>> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        let slot = inner.slots.get_mut(&self.id)?;
        slot.queue.pop_front().map(|event| Delivery {
            event,
            dropped: slot.dropped,
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.slots.remove(&self.id);
        }
    }
}

/// The coordinator's two topics.
#[derive(Clone, Default)]
pub struct EventHub {
    /// `node_update` topic
    pub nodes: EventBus<NodeUpdate>,
    /// `job_update` topic
    pub jobs: EventBus<JobUpdate>,
}

impl EventHub {
    /// Create both topics with default capacities.
    pub fn new() -> Self {
        Self {
            nodes: EventBus::new(),
            jobs: EventBus::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let bus: EventBus<NodeUpdate> = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(NodeUpdate {
            node_id: "n1".to_string(),
        });

        assert_eq!(first.recv().await.event.node_id, "n1");
        assert_eq!(second.recv().await.event.node_id, "n1");
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        let bus: EventBus<JobUpdate> = EventBus::with_capacity(2);
        let mut sub = bus.subscribe();

        for idx in 0..5 {
            bus.publish(JobUpdate {
                job_id: format!("job-{idx}"),
            });
        }

        // Capacity 2: job-0..job-2 were dropped, job-3 and job-4 remain.
        let first = sub.recv().await;
        assert_eq!(first.event.job_id, "job-3");
        assert_eq!(first.dropped, 3);
        let second = sub.recv().await;
        assert_eq!(second.event.job_id, "job-4");
        assert_eq!(second.dropped, 3);
    }

    #[tokio::test]
    async fn drop_count_is_monotonic() {
        let bus: EventBus<JobUpdate> = EventBus::with_capacity(1);
        let mut sub = bus.subscribe();

        bus.publish(JobUpdate {
            job_id: "a".to_string(),
        });
        bus.publish(JobUpdate {
            job_id: "b".to_string(),
        });
        let first = sub.recv().await;
        assert_eq!(first.dropped, 1);

        bus.publish(JobUpdate {
            job_id: "c".to_string(),
        });
        bus.publish(JobUpdate {
            job_id: "d".to_string(),
        });
        let second = sub.recv().await;
        assert_eq!(second.event.job_id, "d");
        assert_eq!(second.dropped, 2);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned() {
        let bus: EventBus<NodeUpdate> = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publish_never_blocks_without_consumers() {
        let bus: EventBus<NodeUpdate> = EventBus::with_capacity(1);
        let mut sub = bus.subscribe();

        // Far more events than capacity; publish must stay non-blocking.
        for idx in 0..1_000 {
            bus.publish(NodeUpdate {
                node_id: format!("n{idx}"),
            });
        }

        let delivery = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("delivery should be immediate");
        assert_eq!(delivery.event.node_id, "n999");
        assert_eq!(delivery.dropped, 999);
    }
}
