//! Ordered set of listeners notified synchronously.
//!
//! Listeners are tagged with a monotonically increasing id when they
//! subscribe. Notification walks a copy of the list taken up front and
//! re-checks each id before calling it, so a listener removed mid-pass is
//! never invoked again and listeners may freely subscribe or unsubscribe
//! from inside a callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A change listener.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.listeners.iter().any(|(l, _)| *l == id)
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of listeners, cheap to clone (clones share the registry).
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<Mutex<Registry>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is unsubscribed or the notifier is cleared.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe_listener(Arc::new(listener))
    }

    pub fn subscribe_listener(&self, listener: Listener) -> Subscription {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, listener));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Invoke every registered listener in registration order.
    pub fn notify_all(&self) {
        let pass: Vec<(u64, Listener)> = lock(&self.registry).listeners.clone();
        for (id, listener) in pass {
            // Skip anything removed by an earlier listener in this pass.
            if !lock(&self.registry).contains(id) {
                continue;
            }
            listener();
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every listener.
    pub fn clear(&self) {
        lock(&self.registry).listeners.clear();
    }
}

/// Handle returned by [`Notifier::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Safe to call from inside a notification and
    /// after the notifier is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.retain(|(id, _)| *id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| lock(&registry).contains(self.id))
    }
}
