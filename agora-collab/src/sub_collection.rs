//! A family of named collections keyed by a parent entity id.
//!
//! Each parent id gets its own [`CollectionManager`], created on first
//! reference and discarded on [`SubCollection::close`]. The concrete store
//! collection opened for a parent is named
//!
//! ```text
//! {family}-{parent_id}-{sub_name}[-{variant}]
//! ```
//!
//! where the optional variant (a debate's start code, for instance) keeps
//! successive activity periods of one parent apart.
//!
//! Loads are guarded by a per-slot generation: `close` retires the slot, so
//! a load that was still waiting on the store finds its generation gone
//! and discards the handle it opened instead of binding it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_core::Entry;

use crate::error::CollabError;
use crate::manager::CollectionManager;
use crate::notifier::Subscription;
use crate::store::{AccessPolicy, CollectionHandle, CollectionOptions, Database, WriteOutcome};

/// Record id used by singular families.
pub const DEFAULT_ENTRY_ID: &str = "default";

/// How a family rewrites the id of an outgoing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Keep the caller's id; the store assigns one when empty
    StoreAssigned,
    /// Force the id to the writer's own public key
    OwnRecord,
    /// Force the id to [`DEFAULT_ENTRY_ID`]
    Singular,
}

impl WritePolicy {
    pub fn resolve(access: AccessPolicy, singular: bool) -> Self {
        if access == AccessPolicy::ReadAnyWriteOwn {
            WritePolicy::OwnRecord
        } else if singular {
            WritePolicy::Singular
        } else {
            WritePolicy::StoreAssigned
        }
    }

    /// Apply the rewrite to an outgoing record.
    pub fn apply<T: Entry>(self, entry: &mut T, self_public_key: Option<&str>) {
        match self {
            WritePolicy::OwnRecord => {
                if let Some(key) = self_public_key {
                    entry.meta_mut().id = key.to_string();
                }
            }
            WritePolicy::Singular => entry.meta_mut().id = DEFAULT_ENTRY_ID.to_string(),
            WritePolicy::StoreAssigned => {}
        }
    }
}

struct Slot<T, H> {
    manager: CollectionManager<T, H>,
    generation: u64,
    loading: bool,
}

struct SlotTable<T, H> {
    slots: HashMap<String, Slot<T, H>>,
    next_generation: u64,
}

impl<T: Entry, H: CollectionHandle> SlotTable<T, H> {
    fn slot(&mut self, parent_id: &str) -> &mut Slot<T, H> {
        let next_generation = &mut self.next_generation;
        self.slots.entry(parent_id.to_string()).or_insert_with(|| {
            *next_generation += 1;
            Slot {
                manager: CollectionManager::new(),
                generation: *next_generation,
                loading: false,
            }
        })
    }

    fn is_current(&self, parent_id: &str, generation: u64) -> bool {
        self.slots
            .get(parent_id)
            .map_or(false, |slot| slot.generation == generation)
    }
}

/// Family of per-parent collections sharing one set of options.
pub struct SubCollection<T, D: Database> {
    family: String,
    sub_name: String,
    options: CollectionOptions,
    write_policy: WritePolicy,
    db: Option<Arc<D>>,
    self_public_key: Option<String>,
    table: Mutex<SlotTable<T, D::Handle>>,
}

impl<T: Entry, D: Database> SubCollection<T, D> {
    pub fn new(family: impl Into<String>, sub_name: impl Into<String>, options: CollectionOptions) -> Self {
        Self::build(family.into(), sub_name.into(), options, false)
    }

    /// A family holding at most one record per parent, under [`DEFAULT_ENTRY_ID`].
    pub fn singular(family: impl Into<String>, sub_name: impl Into<String>, options: CollectionOptions) -> Self {
        Self::build(family.into(), sub_name.into(), options, true)
    }

    fn build(family: String, sub_name: String, options: CollectionOptions, singular: bool) -> Self {
        Self {
            write_policy: WritePolicy::resolve(options.access, singular),
            family,
            sub_name,
            options,
            db: None,
            self_public_key: None,
            table: Mutex::new(SlotTable {
                slots: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    pub fn init(&mut self, db: Arc<D>, self_public_key: impl Into<String>) {
        self.db = Some(db);
        self.self_public_key = Some(self_public_key.into());
    }

    /// A family with the same naming, options and session but an empty
    /// slot table. Loads and closes through it leave this family's parents
    /// untouched.
    pub fn detached(&self) -> Self {
        Self {
            family: self.family.clone(),
            sub_name: self.sub_name.clone(),
            options: self.options.clone(),
            write_policy: self.write_policy,
            db: self.db.clone(),
            self_public_key: self.self_public_key.clone(),
            table: Mutex::new(SlotTable {
                slots: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotTable<T, D::Handle>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn manager(&self, parent_id: &str) -> Option<CollectionManager<T, D::Handle>> {
        self.lock().slots.get(parent_id).map(|slot| slot.manager.clone())
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    /// Store collection name for a parent id and optional variant token.
    pub fn collection_name(&self, parent_id: &str, variant: Option<&str>) -> String {
        let mut name = format!("{}-{}-{}", self.family, parent_id, self.sub_name);
        if let Some(variant) = variant {
            name.push('-');
            name.push_str(variant);
        }
        name
    }

    /// Open and bind the collection for `parent_id`.
    ///
    /// A no-op without a database, when already bound, or while another
    /// load for the same parent is in flight. `creator` is handed to the
    /// store as the collection's authoritative owner.
    pub async fn load(
        &self,
        parent_id: &str,
        variant: Option<&str>,
        creator: Option<&str>,
    ) -> Result<(), CollabError> {
        let Some(db) = self.db.clone() else {
            log::debug!("No database yet, skipping load of {}", self.collection_name(parent_id, variant));
            return Ok(());
        };

        let generation = {
            let mut table = self.lock();
            let slot = table.slot(parent_id);
            if slot.manager.is_ready() || slot.loading {
                return Ok(());
            }
            slot.loading = true;
            slot.generation
        };

        let name = self.collection_name(parent_id, variant);
        let mut options = self.options.clone();
        if let Some(creator) = creator {
            options = options.with_creator(creator);
        }
        let opened = db.open_collection(&name, options).await;

        let manager = {
            let mut table = self.lock();
            match table.slots.get_mut(parent_id) {
                Some(slot) if slot.generation == generation => {
                    slot.loading = false;
                    Some(slot.manager.clone())
                }
                _ => None,
            }
        };

        let handle = opened?;
        let Some(manager) = manager else {
            log::debug!("Discarding stale load of {name}");
            handle.close();
            return Ok(());
        };
        manager.bind(handle)?;

        // A close may have landed while binding.
        if !self.lock().is_current(parent_id, generation) {
            manager.close();
        }
        Ok(())
    }

    /// Close and discard the manager for `parent_id`, including its
    /// listeners. Any load still in flight for it is abandoned.
    pub fn close(&self, parent_id: &str) {
        let removed = self.lock().slots.remove(parent_id);
        if let Some(slot) = removed {
            slot.manager.close();
        }
    }

    /// Close every parent's collection.
    pub fn close_all(&self) {
        let drained: Vec<Slot<T, D::Handle>> = self.lock().slots.drain().map(|(_, slot)| slot).collect();
        for slot in drained {
            slot.manager.close();
        }
    }

    pub fn is_loaded(&self, parent_id: &str) -> bool {
        self.manager(parent_id).map_or(false, |m| m.is_ready())
    }

    /// Parent ids that currently have a manager.
    pub fn parent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().slots.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot for `parent_id`, newest first. Empty when not loaded.
    pub fn entries(&self, parent_id: &str) -> Vec<T> {
        self.manager(parent_id).map(|m| m.entries()).unwrap_or_default()
    }

    /// Point lookup of `sub_id` within `parent_id`'s collection.
    pub fn entry(&self, parent_id: &str, sub_id: &str) -> Option<T> {
        self.manager(parent_id)?.find(sub_id)
    }

    /// The single record of a singular family.
    pub fn singular_entry(&self, parent_id: &str) -> Option<T> {
        self.entry(parent_id, DEFAULT_ENTRY_ID)
    }

    /// Listen for refreshes of `parent_id`'s collection. Registering
    /// before `load` is fine; the manager is created on demand.
    ///
    /// The slot created here holds the listener until `close(parent_id)` or
    /// `close_all`, whether or not the parent is ever loaded. Callers that
    /// subscribe to a parent own closing it.
    pub fn on_updated<F>(&self, parent_id: &str, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let manager = self.lock().slot(parent_id).manager.clone();
        manager.on_updated(listener)
    }

    /// Write `entry` into `parent_id`'s collection after applying the
    /// family's [`WritePolicy`]. `Ok(None)` when not loaded.
    pub async fn add_entry(&self, parent_id: &str, mut entry: T) -> Result<Option<WriteOutcome>, CollabError> {
        let Some(manager) = self.manager(parent_id) else {
            log::debug!("Dropping write to unloaded {}", self.collection_name(parent_id, None));
            return Ok(None);
        };
        self.write_policy.apply(&mut entry, self.self_public_key.as_deref());
        manager.insert(&entry).await
    }
}
