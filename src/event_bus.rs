//! Typed publish/subscribe event bus
//!
//! Owned by the [`World`](crate::world::World); dispatch is synchronous
//! and in-process. Handlers for an event type run in subscription order,
//! and a handler error stops dispatch and propagates to the publisher.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::error::Result;

/// Marker trait for event types
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

type BoxedHandler = Box<dyn FnMut(&dyn Any) -> Result<()> + Send>;

/// Central event bus for pub/sub communication
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<TypeId, Vec<BoxedHandler>>,
    published: u64,
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to an event type; handlers run in subscription order
    pub fn subscribe<E, F>(&mut self, mut handler: F)
    where
        E: Event,
        F: FnMut(&E) -> Result<()> + Send + 'static,
    {
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(move |any| match any.downcast_ref::<E>() {
                Some(event) => handler(event),
                None => Ok(()),
            }));
    }

    /// Publish an event, synchronously invoking every subscriber
    pub fn publish<E: Event>(&mut self, event: &E) -> Result<()> {
        self.published += 1;
        if let Some(handlers) = self.handlers.get_mut(&TypeId::of::<E>()) {
            for handler in handlers.iter_mut() {
                handler(event)?;
            }
        }
        Ok(())
    }

    /// Number of subscribers for an event type
    pub fn subscriber_count(&self, event_type: TypeId) -> usize {
        self.handlers
            .get(&event_type)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    /// Total subscriber count across event types
    pub fn total_subscribers(&self) -> usize {
        self.handlers.values().map(|handlers| handlers.len()).sum()
    }

    /// Total events published so far
    pub fn published_count(&self) -> u64 {
        self.published
    }

    /// Remove all subscribers
    pub fn clear_subscribers(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcsError;
    use std::sync::{Arc, Mutex};

    struct Ping(#[allow(dead_code)] u32);

    #[test]
    fn test_publish_invokes_in_subscription_order() {
        let mut bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe::<Ping, _>(move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }

        bus.publish(&Ping(1)).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(bus.subscriber_count(TypeId::of::<Ping>()), 3);
        assert_eq!(bus.total_subscribers(), 3);

        bus.clear_subscribers();
        assert_eq!(bus.total_subscribers(), 0);
        bus.publish(&Ping(4)).unwrap();
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_handler_error_stops_dispatch() {
        let mut bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.subscribe::<Ping, _>(|_| Err(EcsError::StageError("boom".into())));
        let reached_clone = reached.clone();
        bus.subscribe::<Ping, _>(move |_| {
            *reached_clone.lock().unwrap() = true;
            Ok(())
        });

        assert!(bus.publish(&Ping(2)).is_err());
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn test_events_are_type_segregated() {
        struct Other;

        let mut bus = EventBus::new();
        let count = Arc::new(Mutex::new(0u32));

        let count_clone = count.clone();
        bus.subscribe::<Ping, _>(move |_| {
            *count_clone.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish(&Other).unwrap();
        assert_eq!(*count.lock().unwrap(), 0);

        bus.publish(&Ping(3)).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
