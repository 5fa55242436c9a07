//! Observer subscription and synchronous fan-out.

use std::sync::Arc;

use super::device::DeviceChange;

/// Subscriber notified on every semantic device change.
///
/// Callbacks run synchronously on whichever thread delivered the platform
/// notification; they must not block for long and may re-enter the
/// monitor's read-only accessors.
pub trait DeviceObserver: Send + Sync {
    fn on_device_change(&self, change: &DeviceChange);
}

/// Maintains the subscriber set.
///
/// Set semantics over observer *instances*: subscribing the same `Arc`
/// twice has no additional effect, unsubscribing an unknown observer is a
/// no-op.
#[derive(Default)]
pub struct ObserverHub {
    observers: Vec<Arc<dyn DeviceObserver>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn DeviceObserver>) {
        if !self
            .observers
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &observer))
        {
            self.observers.push(observer);
        }
    }

    pub fn unsubscribe(&mut self, observer: &Arc<dyn DeviceObserver>) {
        self.observers
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    /// Clone of the current subscriber list, for fan-out after the
    /// session lock has been released.
    pub fn snapshot(&self) -> Vec<Arc<dyn DeviceObserver>> {
        self.observers.clone()
    }

    /// Synchronous fan-out on the calling thread, unspecified order.
    pub fn notify_all(&self, change: &DeviceChange) {
        for observer in &self.observers {
            observer.on_device_change(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingObserver {
        seen: AtomicUsize,
    }

    impl DeviceObserver for CountingObserver {
        fn on_device_change(&self, _change: &DeviceChange) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn double_subscribe_notifies_once() {
        let mut hub = ObserverHub::new();
        let observer = Arc::new(CountingObserver::default());

        hub.subscribe(observer.clone());
        hub.subscribe(observer.clone());
        assert_eq!(hub.len(), 1);

        hub.notify_all(&DeviceChange::Discovered {
            pnp_id: "D1".to_string(),
        });
        assert_eq!(observer.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_unknown_is_a_noop() {
        let mut hub = ObserverHub::new();
        let subscribed = Arc::new(CountingObserver::default());
        let stranger: Arc<dyn DeviceObserver> = Arc::new(CountingObserver::default());

        hub.subscribe(subscribed.clone());
        hub.unsubscribe(&stranger);
        assert_eq!(hub.len(), 1);

        let as_dyn: Arc<dyn DeviceObserver> = subscribed.clone();
        hub.unsubscribe(&as_dyn);
        assert!(hub.is_empty());
    }

    #[test]
    fn every_subscriber_gets_every_event() {
        let mut hub = ObserverHub::new();
        let first = Arc::new(CountingObserver::default());
        let second = Arc::new(CountingObserver::default());
        hub.subscribe(first.clone());
        hub.subscribe(second.clone());

        let change = DeviceChange::Detached {
            pnp_id: "D1".to_string(),
        };
        hub.notify_all(&change);
        hub.notify_all(&change);

        assert_eq!(first.seen.load(Ordering::SeqCst), 2);
        assert_eq!(second.seen.load(Ordering::SeqCst), 2);
    }
}
