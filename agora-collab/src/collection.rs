//! A single global collection bound to one fixed name.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_core::Entry;

use crate::error::CollabError;
use crate::manager::CollectionManager;
use crate::notifier::Subscription;
use crate::store::{CollectionHandle, CollectionOptions, Database, WriteOutcome};
use crate::sub_collection::WritePolicy;

#[derive(Default)]
struct LoadGuard {
    generation: u64,
    loading: bool,
}

/// Global named collection with fixed options.
pub struct Collection<T, D: Database> {
    name: String,
    options: CollectionOptions,
    write_policy: WritePolicy,
    db: Option<Arc<D>>,
    self_public_key: Option<String>,
    manager: CollectionManager<T, D::Handle>,
    guard: Mutex<LoadGuard>,
}

impl<T: Entry, D: Database> Collection<T, D> {
    pub fn new(name: impl Into<String>, options: CollectionOptions) -> Self {
        Self {
            name: name.into(),
            write_policy: WritePolicy::resolve(options.access, false),
            options,
            db: None,
            self_public_key: None,
            manager: CollectionManager::new(),
            guard: Mutex::new(LoadGuard::default()),
        }
    }

    pub fn init(&mut self, db: Arc<D>, self_public_key: impl Into<String>) {
        self.db = Some(db);
        self.self_public_key = Some(self_public_key.into());
    }

    fn lock(&self) -> MutexGuard<'_, LoadGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Open and bind the collection. A no-op without a database, when
    /// already bound, or while a load is in flight.
    pub async fn load(&self) -> Result<(), CollabError> {
        let Some(db) = self.db.clone() else {
            log::debug!("No database yet, skipping load of {}", self.name);
            return Ok(());
        };

        let generation = {
            let mut guard = self.lock();
            if self.manager.is_ready() || guard.loading {
                return Ok(());
            }
            guard.loading = true;
            guard.generation
        };

        let opened = db.open_collection(&self.name, self.options.clone()).await;

        let current = {
            let mut guard = self.lock();
            let current = guard.generation == generation;
            if current {
                guard.loading = false;
            }
            current
        };

        let handle = opened?;
        if !current {
            log::debug!("Discarding stale load of {}", self.name);
            handle.close();
            return Ok(());
        }
        self.manager.bind(handle)
    }

    /// Release the binding. An in-flight load is abandoned; listeners stay.
    pub fn close(&self) {
        {
            let mut guard = self.lock();
            guard.generation += 1;
            guard.loading = false;
        }
        self.manager.close();
    }

    pub fn is_loaded(&self) -> bool {
        self.manager.is_ready()
    }

    /// Snapshot, newest first. Empty when not loaded.
    pub fn entries(&self) -> Vec<T> {
        self.manager.entries()
    }

    pub fn entry(&self, id: &str) -> Option<T> {
        self.manager.find(id)
    }

    /// Write `entry` after applying the collection's [`WritePolicy`].
    /// `Ok(None)` when not loaded.
    pub async fn add_entry(&self, mut entry: T) -> Result<Option<WriteOutcome>, CollabError> {
        self.write_policy.apply(&mut entry, self.self_public_key.as_deref());
        self.manager.insert(&entry).await
    }

    pub fn on_updated<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.manager.on_updated(listener)
    }
}
