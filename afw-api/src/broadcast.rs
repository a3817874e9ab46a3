//! In-process realtime broadcast
//!
//! Subscribers register a callback under a key (a resource URL such as
//! `/api/rfi/123`). Publishing invokes every callback for that key on the
//! caller's thread. Delivery is best-effort and at-most-once: a failing or
//! panicking callback is logged and skipped, and nothing survives a restart.

use afw_common::events::EntityEvent;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

/// Subscriber callback
pub type Callback = Arc<dyn Fn(&EntityEvent) -> anyhow::Result<()> + Send + Sync>;

type SubscriberMap = HashMap<String, Vec<(u64, Callback)>>;

#[derive(Default)]
struct Registry {
    subscribers: Mutex<SubscriberMap>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, SubscriberMap> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, key: &str, id: u64) {
        let mut subscribers = self.lock();
        if let Some(list) = subscribers.get_mut(key) {
            list.retain(|(sub_id, _)| *sub_id != id);
            if list.is_empty() {
                subscribers.remove(key);
            }
        }
    }
}

/// Key → callbacks map, shared by clone
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `key`
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, key: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&EntityEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .lock()
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        debug!("Subscriber {} registered for {}", id, key);

        Subscription {
            registry: Arc::downgrade(&self.registry),
            key,
            id,
        }
    }

    /// Deliver `event` to every subscriber of `key`
    ///
    /// Returns the number of callbacks that completed without error.
    pub fn publish(&self, key: &str, event: &EntityEvent) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe reentrantly
        let callbacks: Vec<(u64, Callback)> = match self.registry.lock().get(key) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Subscriber {} on {} failed: {:#}", id, key, e),
                Err(_) => warn!("Subscriber {} on {} panicked", id, key),
            }
        }

        debug!("Published {:?} on {} to {} subscribers", event.kind, key, delivered);
        delivered
    }

    /// Subscribers currently registered for `key`
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.registry.lock().get(key).map_or(0, Vec::len)
    }

    /// Drop every subscription
    pub fn clear(&self) {
        let mut subscribers = self.registry.lock();
        let count: usize = subscribers.values().map(Vec::len).sum();
        subscribers.clear();
        info!("Broadcaster cleared ({} subscriptions)", count);
    }
}

/// Registration handle; unsubscribes on drop
pub struct Subscription {
    registry: Weak<Registry>,
    key: String,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
            debug!("Subscriber {} removed from {}", self.id, self.key);
        }
    }
}
