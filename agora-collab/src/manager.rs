//! Live, sorted view over one open store collection.
//!
//! ```text
//! Uninitialized ──bind──► Bound ──close──► Closed
//!                           ▲                 │
//!                           └──────bind───────┘
//! ```
//!
//! Every store change triggers a full re-read: the store's current
//! id → record mapping is decoded, sorted by descending logical clock and
//! swapped in, then listeners are notified. Change callbacks are tagged
//! with the binding they were registered for, so callbacks belonging to a
//! closed binding are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_core::Entry;
use serde_json::Value;

use crate::error::CollabError;
use crate::notifier::{Notifier, Subscription};
use crate::store::{CollectionHandle, WriteOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerPhase {
    Uninitialized,
    Bound,
    Closed,
}

struct ManagerState<T, H> {
    phase: ManagerPhase,
    /// Incremented on every bind and close
    binding: u64,
    handle: Option<Arc<H>>,
    store_subscription: Option<Subscription>,
    entries: Vec<T>,
}

struct ManagerInner<T, H> {
    state: Mutex<ManagerState<T, H>>,
    notifier: Notifier,
}

impl<T: Entry, H: CollectionHandle> ManagerInner<T, H> {
    fn lock(&self) -> MutexGuard<'_, ManagerState<T, H>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_handle(&self) -> Option<Arc<H>> {
        let state = self.lock();
        match state.phase {
            ManagerPhase::Bound => state.handle.clone(),
            _ => None,
        }
    }

    /// Re-materialize the snapshot for `binding` and notify listeners.
    fn refresh(&self, binding: u64) {
        let handle = {
            let state = self.lock();
            if state.phase != ManagerPhase::Bound || state.binding != binding {
                return;
            }
            match &state.handle {
                Some(handle) => handle.clone(),
                None => return,
            }
        };

        let mut entries: Vec<T> = handle
            .all_entries()
            .into_values()
            .filter_map(|value| decode(handle.name(), value))
            .collect();
        entries.sort_by(|a, b| b.clock().cmp(&a.clock()));

        {
            let mut state = self.lock();
            if state.phase != ManagerPhase::Bound || state.binding != binding {
                return;
            }
            state.entries = entries;
        }
        self.notifier.notify_all();
    }
}

fn decode<T: Entry>(collection: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            log::warn!("Skipping undecodable record in {collection}: {e}");
            None
        }
    }
}

/// Typed, subscribable view of one store collection.
///
/// Clones share the same state.
pub struct CollectionManager<T, H> {
    inner: Arc<ManagerInner<T, H>>,
}

impl<T, H> Clone for CollectionManager<T, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Entry, H: CollectionHandle> Default for CollectionManager<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entry, H: CollectionHandle> CollectionManager<T, H> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ManagerState {
                    phase: ManagerPhase::Uninitialized,
                    binding: 0,
                    handle: None,
                    store_subscription: None,
                    entries: Vec::new(),
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Attach to an open store collection and take an initial snapshot.
    ///
    /// Binding an already bound manager is an error; the new handle is
    /// closed and the existing binding is left untouched.
    pub fn bind(&self, handle: H) -> Result<(), CollabError> {
        let handle = Arc::new(handle);
        let binding = {
            let mut state = self.inner.lock();
            if state.phase == ManagerPhase::Bound {
                drop(state);
                handle.close();
                return Err(CollabError::AlreadyBound(handle.name().to_string()));
            }
            state.binding += 1;
            state.phase = ManagerPhase::Bound;
            state.handle = Some(handle.clone());
            state.entries.clear();
            state.binding
        };

        let weak = Arc::downgrade(&self.inner);
        let subscription = handle.on_changed(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.refresh(binding);
            }
        }));

        {
            let mut state = self.inner.lock();
            if state.phase != ManagerPhase::Bound || state.binding != binding {
                drop(state);
                subscription.unsubscribe();
                return Ok(());
            }
            state.store_subscription = Some(subscription);
        }

        log::debug!("Bound {}", handle.name());
        self.inner.refresh(binding);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == ManagerPhase::Bound
    }

    pub fn phase(&self) -> ManagerPhase {
        self.inner.lock().phase
    }

    /// Release the store handle and clear the snapshot. Listeners stay.
    pub fn close(&self) {
        let (handle, subscription) = {
            let mut state = self.inner.lock();
            if state.phase != ManagerPhase::Bound {
                return;
            }
            state.phase = ManagerPhase::Closed;
            state.binding += 1;
            state.entries.clear();
            (state.handle.take(), state.store_subscription.take())
        };

        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        if let Some(handle) = handle {
            log::debug!("Closed {}", handle.name());
            handle.close();
        }
    }

    /// Current snapshot, most recently written first.
    pub fn entries(&self) -> Vec<T> {
        self.inner.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point lookup through the store, not the snapshot.
    pub fn find(&self, id: &str) -> Option<T> {
        let handle = self.inner.current_handle()?;
        let value = handle.find_one(id)?;
        decode(handle.name(), value)
    }

    /// Write `entry` through the store. `Ok(None)` when not bound.
    pub async fn insert(&self, entry: &T) -> Result<Option<WriteOutcome>, CollabError> {
        let Some(handle) = self.inner.current_handle() else {
            log::debug!("Dropping write to an unbound collection");
            return Ok(None);
        };
        let value = serde_json::to_value(entry)?;
        let outcome = handle.insert_one(value).await?;
        Ok(Some(outcome))
    }

    /// Listen for snapshot refreshes.
    pub fn on_updated<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.notifier.len()
    }

    /// Name of the bound collection, if any.
    pub fn collection_name(&self) -> Option<String> {
        self.inner.current_handle().map(|h| h.name().to_string())
    }
}
