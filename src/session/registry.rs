//! Subscription registry.
//!
//! Maps each destination to its single live [`Subscription`] and keeps the
//! map consistent with the transport: entries are only added after the
//! transport created the subscription, and an entry is always removed even
//! when closing it fails.
//!
//! # Duplicate Destinations
//!
//! Subscribing to a destination that already has a live subscription
//! replaces it. The previous underlying subscription is closed first, so at
//! most one listener per destination is ever wired.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::message::MessageListener;
use crate::transport::TransportHandle;

// ============================================================================
// Subscription
// ============================================================================

/// One active destination binding.
#[derive(Clone)]
pub struct Subscription {
    destination: String,
    id: SubscriptionId,
    listener: Arc<dyn MessageListener>,
}

impl Subscription {
    pub(crate) fn new(
        destination: impl Into<String>,
        id: SubscriptionId,
        listener: Arc<dyn MessageListener>,
    ) -> Self {
        Self {
            destination: destination.into(),
            id,
            listener,
        }
    }

    /// Returns the destination.
    #[inline]
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Returns the transport-assigned ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Returns the listener given at subscribe time.
    #[inline]
    #[must_use]
    pub fn listener(&self) -> &Arc<dyn MessageListener> {
        &self.listener
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("destination", &self.destination)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TeardownReport
// ============================================================================

/// Outcome of closing every subscription at once.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Destinations whose subscription was closed.
    pub closed: Vec<String>,

    /// Destinations whose close failed; they are removed regardless.
    pub failed: Vec<Error>,
}

impl TeardownReport {
    /// Returns `true` if every close succeeded.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of subscriptions removed.
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.closed.len() + self.failed.len()
    }
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Destination-keyed set of live subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: FxHashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to `destination` through `transport`.
    ///
    /// An existing subscription for the destination is closed first. A
    /// failure to close it is logged and does not stop the replacement.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the new subscription cannot be
    /// created. The destination then has no entry.
    pub fn subscribe(
        &mut self,
        transport: &dyn TransportHandle,
        destination: &str,
        listener: Arc<dyn MessageListener>,
    ) -> Result<Subscription> {
        if let Some(previous) = self.entries.remove(destination) {
            warn!(
                destination,
                previous = %previous.id,
                "Destination already subscribed, replacing"
            );
            if let Err(e) = transport.unsubscribe(&previous.id) {
                warn!(destination, error = %e, "Failed to close replaced subscription");
            }
        }

        let id = transport.subscribe(destination, Arc::clone(&listener))?;
        let subscription = Subscription::new(destination, id, listener);

        debug!(destination, id = %subscription.id, "Subscribed");
        self.entries
            .insert(destination.to_string(), subscription.clone());

        Ok(subscription)
    }

    /// Closes the subscription for `destination`, if any.
    ///
    /// Returns `Ok(false)` when nothing was subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsubscribe`] if the transport fails to close the
    /// subscription. The entry is removed either way.
    pub fn unsubscribe(
        &mut self,
        transport: &dyn TransportHandle,
        destination: &str,
    ) -> Result<bool> {
        let Some(subscription) = self.entries.remove(destination) else {
            return Ok(false);
        };

        Self::close(transport, &subscription)?;
        debug!(destination, id = %subscription.id, "Unsubscribed");
        Ok(true)
    }

    /// Closes every subscription.
    ///
    /// Every entry is attempted even when some fail; the registry is empty
    /// afterward.
    pub fn teardown(&mut self, transport: &dyn TransportHandle) -> TeardownReport {
        let mut report = TeardownReport::default();

        for (destination, subscription) in self.entries.drain() {
            match Self::close(transport, &subscription) {
                Ok(()) => report.closed.push(destination),
                Err(e) => {
                    warn!(destination, error = %e, "Unsubscribe failed during teardown");
                    report.failed.push(e);
                }
            }
        }

        if !report.is_clean() {
            warn!(
                failed = report.failed.len(),
                total = report.total(),
                "Subscription teardown finished with failures"
            );
        }

        report
    }

    /// Drops every entry without contacting the transport.
    ///
    /// Used when the connection is already gone. Returns the count dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Returns the subscription for `destination`.
    #[inline]
    #[must_use]
    pub fn get(&self, destination: &str) -> Option<&Subscription> {
        self.entries.get(destination)
    }

    /// Returns `true` if `destination` has a live subscription.
    #[inline]
    #[must_use]
    pub fn contains(&self, destination: &str) -> bool {
        self.entries.contains_key(destination)
    }

    /// Returns the number of live subscriptions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the subscribed destinations in no particular order.
    #[must_use]
    pub fn destinations(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn close(transport: &dyn TransportHandle, subscription: &Subscription) -> Result<()> {
        transport
            .unsubscribe(&subscription.id)
            .map_err(|e| Error::unsubscribe(&subscription.destination, e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use rustc_hash::FxHashSet;

    use super::*;
    use crate::message::Message;

    /// Records calls and fails unsubscribe for chosen IDs.
    #[derive(Default)]
    struct FakeHandle {
        next: AtomicUsize,
        live: Mutex<FxHashSet<SubscriptionId>>,
        unsubscribed: Mutex<Vec<SubscriptionId>>,
        fail_unsubscribe: Mutex<FxHashSet<SubscriptionId>>,
        fail_subscribe: Mutex<bool>,
    }

    impl TransportHandle for FakeHandle {
        fn disconnect(&self) {}

        fn subscribe(
            &self,
            _destination: &str,
            _listener: Arc<dyn MessageListener>,
        ) -> Result<SubscriptionId> {
            if *self.fail_subscribe.lock() {
                return Err(Error::ConnectionClosed);
            }
            let id = SubscriptionId::new(format!("sub-{}", self.next.fetch_add(1, Ordering::SeqCst)));
            self.live.lock().insert(id.clone());
            Ok(id)
        }

        fn unsubscribe(&self, id: &SubscriptionId) -> Result<()> {
            self.unsubscribed.lock().push(id.clone());
            self.live.lock().remove(id);
            if self.fail_unsubscribe.lock().contains(id) {
                return Err(Error::ConnectionClosed);
            }
            Ok(())
        }

        fn send(&self, _destination: &str, _payload: &str) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    fn listener() -> Arc<dyn MessageListener> {
        Arc::new(|_: Message| {})
    }

    #[test]
    fn test_subscribe_records_entry() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();

        let sub = registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        assert_eq!(sub.destination(), "/topic/a");
        assert_eq!(sub.id().as_str(), "sub-0");
        assert!(registry.contains("/topic/a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_subscribe_closes_previous() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();

        let first = registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        let second = registry.subscribe(&handle, "/topic/a", listener()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("/topic/a").unwrap().id(), second.id());
        assert_eq!(*handle.unsubscribed.lock(), vec![first.id().clone()]);
        assert_eq!(handle.live.lock().len(), 1);
    }

    #[test]
    fn test_replace_survives_failed_close() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();

        let first = registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        handle.fail_unsubscribe.lock().insert(first.id().clone());

        let second = registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        assert_eq!(registry.get("/topic/a").unwrap().id(), second.id());
    }

    #[test]
    fn test_failed_subscribe_leaves_no_entry() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();
        *handle.fail_subscribe.lock() = true;

        assert!(registry.subscribe(&handle, "/topic/a", listener()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unsubscribe_twice() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&handle, "/topic/a", listener()).unwrap();

        assert!(registry.unsubscribe(&handle, "/topic/a").unwrap());
        assert!(!registry.unsubscribe(&handle, "/topic/a").unwrap());
        assert!(registry.is_empty());
        assert_eq!(handle.unsubscribed.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();

        assert!(!registry.unsubscribe(&handle, "/topic/none").unwrap());
        assert!(handle.unsubscribed.lock().is_empty());
    }

    #[test]
    fn test_unsubscribe_failure_still_removes() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();
        let sub = registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        handle.fail_unsubscribe.lock().insert(sub.id().clone());

        let err = registry.unsubscribe(&handle, "/topic/a").unwrap_err();
        assert!(matches!(err, Error::Unsubscribe { ref destination, .. } if destination == "/topic/a"));
        assert!(!registry.contains("/topic/a"));
    }

    #[test]
    fn test_teardown_attempts_all() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        let b = registry.subscribe(&handle, "/topic/b", listener()).unwrap();
        registry.subscribe(&handle, "/topic/c", listener()).unwrap();
        handle.fail_unsubscribe.lock().insert(b.id().clone());

        let report = registry.teardown(&handle);

        assert!(registry.is_empty());
        assert_eq!(handle.unsubscribed.lock().len(), 3);
        assert_eq!(report.total(), 3);
        assert_eq!(report.closed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_clear_skips_transport() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        registry.subscribe(&handle, "/topic/b", listener()).unwrap();

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert!(handle.unsubscribed.lock().is_empty());
    }

    #[test]
    fn test_destinations() {
        let handle = FakeHandle::default();
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(&handle, "/topic/a", listener()).unwrap();
        registry.subscribe(&handle, "/queue/b", listener()).unwrap();

        let mut destinations = registry.destinations();
        destinations.sort();
        assert_eq!(destinations, vec!["/queue/b", "/topic/a"]);
    }
}
