//! Cache invalidation events
//!
//! A successful restore replaces whole collections, so any cached query
//! result in the application may be stale. The restore engine publishes
//! [`CacheEvent::InvalidateAll`] on an [`EventBus`]; caching layers subscribe
//! to it instead of being called directly.

use std::sync::RwLock;

/// Events published to caching layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// Every cached read is stale
    InvalidateAll,
}

type Subscriber = Box<dyn Fn(&CacheEvent) + Send + Sync>;

/// Synchronous publish/subscribe channel for [`CacheEvent`]s
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; it is called for every later event
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let mut subscribers = match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push(Box::new(subscriber));
    }

    /// Deliver an event to every subscriber, returning how many received it
    pub fn publish(&self, event: &CacheEvent) -> usize {
        let subscribers = match self.subscribers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for subscriber in subscribers.iter() {
            subscriber(event);
        }
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            bus.subscribe(move |event| {
                assert_eq!(*event, CacheEvent::InvalidateAll);
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(bus.publish(&CacheEvent::InvalidateAll), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(&CacheEvent::InvalidateAll), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
