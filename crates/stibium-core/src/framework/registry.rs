//! Handler registry.
//!
//! Maps each reactive [`EventKind`] to the ordered sequence of live handlers.
//! Registration order is dispatch order. Every mutation is a single step under
//! a write lock, and readers iterate over a [`snapshot`](HandlerRegistry::snapshot)
//! so that removals during dispatch never skip or repeat a handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::handler::{BoxedHandler, HandlerId};
use crate::foundation::EventKind;

/// A live registry entry.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Registration id.
    pub id: HandlerId,
    /// The handler.
    pub handler: BoxedHandler,
}

/// Registry of reactive handlers, bucketed by event kind.
#[derive(Default)]
pub struct HandlerRegistry {
    buckets: RwLock<HashMap<EventKind, Vec<RegistryEntry>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh handler id.
    pub fn next_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends a handler to the bucket of `kind`.
    ///
    /// Returns `true` if this is the first handler ever stored under `kind`.
    pub fn insert(&self, kind: EventKind, id: HandlerId, handler: BoxedHandler) -> bool {
        let mut buckets = self.buckets.write();
        let first = !buckets.contains_key(&kind);
        debug!(kind = %kind, handler = %handler.name(), id = %id, "Handler added to registry");
        buckets
            .entry(kind)
            .or_default()
            .push(RegistryEntry { id, handler });
        first
    }

    /// Removes a handler. Returns `false` if it was already gone.
    pub fn remove(&self, kind: &EventKind, id: HandlerId) -> bool {
        let mut buckets = self.buckets.write();
        let Some(bucket) = buckets.get_mut(kind) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|entry| entry.id != id);
        let removed = bucket.len() != before;
        if removed {
            debug!(kind = %kind, id = %id, "Handler removed from registry");
        }
        removed
    }

    /// Returns whether a handler is still registered.
    pub fn contains(&self, kind: &EventKind, id: HandlerId) -> bool {
        self.buckets
            .read()
            .get(kind)
            .is_some_and(|bucket| bucket.iter().any(|entry| entry.id == id))
    }

    /// Returns a copy of the live sequence for `kind`, or an empty one.
    pub fn snapshot(&self, kind: &EventKind) -> Vec<RegistryEntry> {
        let snapshot = self.buckets.read().get(kind).cloned().unwrap_or_default();
        trace!(kind = %kind, handlers = snapshot.len(), "Registry snapshot taken");
        snapshot
    }

    /// Returns the number of live handlers for `kind`.
    pub fn len(&self, kind: &EventKind) -> usize {
        self.buckets.read().get(kind).map_or(0, Vec::len)
    }

    /// Returns `true` if no handler of any kind is registered.
    pub fn is_empty(&self) -> bool {
        self.buckets.read().values().all(Vec::is_empty)
    }

    /// Returns every kind that has ever had a handler.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.buckets.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buckets = self.buckets.read();
        f.debug_map()
            .entries(buckets.iter().map(|(kind, bucket)| (kind.as_str(), bucket.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::handler::Handler;
    use std::sync::Arc;

    struct Named(&'static str);

    impl Handler for Named {
        fn name(&self) -> String {
            self.0.to_string()
        }

        fn event_kind(&self) -> Option<EventKind> {
            Some(EventKind::Message)
        }
    }

    fn names(entries: &[RegistryEntry]) -> Vec<String> {
        entries.iter().map(|entry| entry.handler.name()).collect()
    }

    #[test]
    fn test_insert_preserves_registration_order() {
        let registry = HandlerRegistry::new();
        for name in ["a", "b", "c"] {
            registry.insert(EventKind::Message, registry.next_id(), Arc::new(Named(name)));
        }

        assert_eq!(names(&registry.snapshot(&EventKind::Message)), ["a", "b", "c"]);
    }

    #[test]
    fn test_first_insert_of_kind_is_reported() {
        let registry = HandlerRegistry::new();
        assert!(registry.insert(EventKind::Message, registry.next_id(), Arc::new(Named("a"))));
        assert!(!registry.insert(EventKind::Message, registry.next_id(), Arc::new(Named("b"))));
        assert!(registry.insert(
            EventKind::ReactionAdded,
            registry.next_id(),
            Arc::new(Named("c"))
        ));
    }

    #[test]
    fn test_removal_does_not_disturb_snapshot() {
        let registry = HandlerRegistry::new();
        let ids: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let id = registry.next_id();
                registry.insert(EventKind::Message, id, Arc::new(Named(name)));
                id
            })
            .collect();

        let snapshot = registry.snapshot(&EventKind::Message);
        assert!(registry.remove(&EventKind::Message, ids[1]));
        assert!(!registry.remove(&EventKind::Message, ids[1]));

        assert_eq!(names(&snapshot), ["a", "b", "c"]);
        assert_eq!(names(&registry.snapshot(&EventKind::Message)), ["a", "c"]);
        assert!(!registry.contains(&EventKind::Message, ids[1]));
        assert!(registry.contains(&EventKind::Message, ids[2]));
    }

    #[test]
    fn test_unknown_kind_is_empty() {
        let registry = HandlerRegistry::new();
        assert!(registry.snapshot(&EventKind::ReactionAdded).is_empty());
        assert_eq!(registry.len(&EventKind::ReactionAdded), 0);
        assert!(registry.is_empty());
    }
}
