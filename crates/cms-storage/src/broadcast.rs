use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use cms_types::{PropertyKey, PropertyUpdateEvent, PropertyValue};

pub const DEFAULT_BROADCAST_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    /// The ring was full; the oldest buffered event was discarded.
    DroppedOldest,
    Closed,
}

struct Ring {
    events: VecDeque<PropertyUpdateEvent>,
    dropped: u64,
    // drops since the ring last ran empty
    burst_dropped: u64,
    closed: bool,
}

impl Ring {
    fn pop(&mut self) -> Option<PropertyUpdateEvent> {
        let event = self.events.pop_front();
        if self.events.is_empty() {
            self.end_burst();
        }
        event
    }

    fn end_burst(&mut self) {
        if self.burst_dropped > 0 {
            tracing::warn!(dropped = self.burst_dropped, "broadcast overflow ended");
            self.burst_dropped = 0;
        }
    }
}

/// Process-wide change feed between the state machine and the agent
/// registry.
///
/// Bounded, drop-oldest, single consumer. Publishing never waits: under
/// overload the oldest buffered events are discarded and counted, so the
/// apply path is never held up by agent delivery. Delivery is at-most-once.
pub struct Broadcaster {
    capacity: usize,
    ring: Mutex<Ring>,
    notify: Notify,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Broadcaster {
            capacity,
            ring: Mutex::new(Ring {
                events: VecDeque::with_capacity(capacity),
                dropped: 0,
                burst_dropped: 0,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn try_publish(&self, event: PropertyUpdateEvent) -> PublishOutcome {
        let outcome = {
            let mut ring = self.ring.lock();
            if ring.closed {
                return PublishOutcome::Closed;
            }
            let outcome = if ring.events.len() >= self.capacity {
                if let Some(lost) = ring.events.pop_front() {
                    if ring.burst_dropped == 0 {
                        tracing::warn!(
                            key = %lost.key,
                            capacity = self.capacity,
                            "broadcast buffer full, dropping oldest updates"
                        );
                    }
                }
                ring.dropped += 1;
                ring.burst_dropped += 1;
                PublishOutcome::DroppedOldest
            } else {
                PublishOutcome::Queued
            };
            tracing::debug!(key = %event.key, deleted = event.value.is_none(), "published update");
            ring.events.push_back(event);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Convenience for the apply path: `value` is `None` on delete.
    pub fn publish_update(
        &self,
        key: PropertyKey,
        value: Option<PropertyValue>,
    ) -> PublishOutcome {
        self.try_publish(PropertyUpdateEvent { key, value })
    }

    /// Wait for the next event. Returns `None` once the broadcaster is closed
    /// and everything buffered before the close has been handed out.
    pub async fn recv(&self) -> Option<PropertyUpdateEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut ring = self.ring.lock();
                if let Some(event) = ring.pop() {
                    return Some(event);
                }
                if ring.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take everything currently buffered, oldest first.
    pub fn drain(&self) -> Vec<PropertyUpdateEvent> {
        let mut ring = self.ring.lock();
        let events = ring.events.drain(..).collect();
        ring.end_burst();
        events
    }

    pub fn len(&self) -> usize {
        self.ring.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total events lost to overflow since start.
    pub fn dropped(&self) -> u64 {
        self.ring.lock().dropped
    }

    /// True while updates are being lost and the consumer has not yet
    /// caught up.
    pub fn overflowing(&self) -> bool {
        self.ring.lock().burst_dropped > 0
    }

    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.notify.notify_one();
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn update(i: usize) -> PropertyUpdateEvent {
        PropertyUpdateEvent {
            key: PropertyKey::new("ns", "svc", "app", format!("k{i}")),
            value: Some(PropertyValue::new(i.to_string(), i as i64)),
        }
    }

    #[test]
    fn burst_keeps_newest_capacity_events_in_order() {
        let b = Broadcaster::default();
        let mut dropped = 0;
        for i in 0..1500 {
            if b.try_publish(update(i)) == PublishOutcome::DroppedOldest {
                dropped += 1;
            }
        }
        assert_eq!(dropped, 500);
        assert_eq!(b.dropped(), 500);

        let kept = b.drain();
        assert_eq!(kept.len(), 1000);
        let expected: Vec<_> = (500..1500).map(update).collect();
        assert_eq!(kept, expected);
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn overflow_burst_ends_when_consumer_catches_up() {
        let b = Broadcaster::new(4);
        for i in 0..4 {
            b.try_publish(update(i));
        }
        assert!(!b.overflowing());

        for i in 4..10 {
            assert_eq!(b.try_publish(update(i)), PublishOutcome::DroppedOldest);
        }
        assert!(b.overflowing());
        assert_eq!(b.dropped(), 6);

        for i in 6..9 {
            assert_eq!(b.recv().await, Some(update(i)));
            assert!(b.overflowing());
        }
        assert_eq!(b.recv().await, Some(update(9)));
        assert!(!b.overflowing());

        // a later burst is tracked on its own
        for i in 0..5 {
            b.try_publish(update(i));
        }
        assert!(b.overflowing());
        assert_eq!(b.drain().len(), 4);
        assert!(!b.overflowing());
        assert_eq!(b.dropped(), 7);
    }

    #[test]
    fn delete_events_carry_no_value() {
        let b = Broadcaster::new(4);
        let key = PropertyKey::new("ns", "svc", "app", "gone");
        assert_eq!(b.publish_update(key.clone(), None), PublishOutcome::Queued);
        assert_eq!(b.drain(), vec![PropertyUpdateEvent { key, value: None }]);
    }

    #[test]
    fn publish_after_close_is_rejected() {
        let b = Broadcaster::new(4);
        b.close();
        assert_eq!(b.try_publish(update(0)), PublishOutcome::Closed);
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn recv_waits_for_publish() {
        let b = Arc::new(Broadcaster::new(8));
        let consumer = {
            let b = b.clone();
            tokio::spawn(async move { b.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        b.try_publish(update(7));
        let got = tokio::time::timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(got, Some(update(7)));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let b = Broadcaster::new(8);
        b.try_publish(update(1));
        b.try_publish(update(2));
        b.close();
        assert_eq!(b.recv().await, Some(update(1)));
        assert_eq!(b.recv().await, Some(update(2)));
        assert_eq!(b.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publishers_never_block_without_consumer() {
        let b = Arc::new(Broadcaster::new(16));
        let mut handles = Vec::new();
        for t in 0..4 {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..1000 {
                    b.try_publish(update(t * 1000 + i));
                }
            }));
        }
        for h in handles {
            tokio::time::timeout(Duration::from_secs(5), h).await.unwrap().unwrap();
        }
        assert_eq!(b.len(), 16);
        assert_eq!(b.dropped(), 4000 - 16);
    }
}
