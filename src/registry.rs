//! Path-keyed subscriptions.
//!
//! Consumers are registered under the serialized form of a [`Path`] and fire only
//! for events whose path serializes identically. The single widening is the
//! event's `container`: element-level array events are also delivered to the
//! consumers of the owning array, which is how list regions hear pushes and pops.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::event::ChangeEvent;
use crate::path::{Key, Path};

pub type Consumer = Rc<dyn Fn(&ChangeEvent)>;

/// Process-unique so ids from different registries never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

static SUBSCRIPTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
    fn next() -> Self {
        SubscriptionId(SUBSCRIPTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RefCell<HashMap<String, Vec<(SubscriptionId, Consumer)>>>,
    keys: RefCell<HashMap<SubscriptionId, String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` once per key, at `path + key`.
    pub fn subscribe(&self, path: &Path, keys: &[Key], consumer: Consumer) -> Vec<SubscriptionId> {
        keys.iter()
            .map(|key| self.subscribe_path(&path.child(key.clone()), consumer.clone()))
            .collect()
    }

    pub fn subscribe_path(&self, path: &Path, consumer: Consumer) -> SubscriptionId {
        let id = SubscriptionId::next();
        let key = path.serialize();
        trace!(path = %path, ?id, "subscribe");
        self.entries
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .push((id, consumer));
        self.keys.borrow_mut().insert(id, key);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some(key) = self.keys.borrow_mut().remove(&id) else {
            return false;
        };
        let mut entries = self.entries.borrow_mut();
        if let Some(consumers) = entries.get_mut(&key) {
            consumers.retain(|(existing, _)| *existing != id);
            if consumers.is_empty() {
                entries.remove(&key);
            }
        }
        true
    }

    pub fn unsubscribe_all(&self, ids: impl IntoIterator<Item = SubscriptionId>) -> usize {
        ids.into_iter().filter(|id| self.unsubscribe(*id)).count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
        self.keys.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.keys.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.borrow().is_empty()
    }

    pub fn consumers_at(&self, path: &Path) -> usize {
        self.entries
            .borrow()
            .get(&path.serialize())
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Invoke every consumer matching the event, in registration order.
    /// Returns the number of invocations.
    pub fn notify(&self, event: &ChangeEvent) -> usize {
        let mut matched: Vec<(SubscriptionId, Consumer)> = Vec::new();
        {
            let entries = self.entries.borrow();
            let mut seen = HashSet::new();
            let container_key = event.container.as_ref().map(Path::serialize);
            let keys = std::iter::once(event.path.serialize()).chain(container_key);
            for key in keys {
                if let Some(consumers) = entries.get(&key) {
                    for (id, consumer) in consumers {
                        if seen.insert(*id) {
                            matched.push((*id, consumer.clone()));
                        }
                    }
                }
            }
        }

        let mut invoked = 0;
        for (id, consumer) in matched {
            // an earlier consumer in this pass may have torn this one down
            if !self.keys.borrow().contains_key(&id) {
                continue;
            }
            consumer(event);
            invoked += 1;
        }
        trace!(path = %event.path, kind = ?event.kind, invoked, "notify");
        invoked
    }
}
