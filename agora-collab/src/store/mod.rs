//! Interface consumed from the replicated store.
//!
//! ```text
//! ┌─────────────┐  open_collection(name, options)  ┌──────────────────┐
//! │  Database   │ ───────────────────────────────► │ CollectionHandle │
//! └─────────────┘                                  └────────┬─────────┘
//!                                                           │
//!                      on_changed / all_entries / find_one / insert_one / close
//! ```
//!
//! Records cross this boundary as JSON objects carrying `_id`, `_clock`
//! and `_identity`; typing happens in the collection layer. The store
//! resolves conflicting writes itself according to [`ConflictPolicy`].
//!
//! [`memory`] provides an in-process implementation.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::notifier::{Listener, Subscription};

pub mod memory;

pub use memory::{MemoryCollection, MemoryDatabase, MemoryPeer, ReplicaNetwork, StoreConfig};

/// Who may write into a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessPolicy {
    /// Everyone reads; only the creator writes
    Read,
    /// Everyone reads and writes any id
    ReadWrite,
    /// Everyone reads; each writer may only write the record keyed by
    /// their own public key
    ReadAnyWriteOwn,
}

/// How the store resolves two writes to the same record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Later writes to an existing id are ignored
    FirstWriteWins,
    /// A later write supersedes the earlier one
    LastWriteWins,
}

/// Options passed when opening a named collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
    pub access: AccessPolicy,
    pub conflict: ConflictPolicy,
    /// Hide records written below this logical clock
    pub lower_clock_bound: Option<u64>,
    /// Authoritative creator for access control
    pub creator_public_key: Option<String>,
}

impl CollectionOptions {
    pub const fn new(access: AccessPolicy, conflict: ConflictPolicy) -> Self {
        Self {
            access,
            conflict,
            lower_clock_bound: None,
            creator_public_key: None,
        }
    }

    /// Anyone appends; records are immutable by id.
    pub const fn everyone_append() -> Self {
        Self::new(AccessPolicy::ReadWrite, ConflictPolicy::FirstWriteWins)
    }

    /// Each writer owns and replaces one record.
    pub const fn everyone_update_own() -> Self {
        Self::new(AccessPolicy::ReadAnyWriteOwn, ConflictPolicy::LastWriteWins)
    }

    /// Only the creator writes, once per id.
    pub const fn self_write_once() -> Self {
        Self::new(AccessPolicy::Read, ConflictPolicy::FirstWriteWins)
    }

    pub fn with_creator(mut self, public_key: impl Into<String>) -> Self {
        self.creator_public_key = Some(public_key.into());
        self
    }

    pub fn with_lower_clock_bound(mut self, clock: u64) -> Self {
        self.lower_clock_bound = Some(clock);
        self
    }
}

/// Result of an accepted insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record was stored under this id
    Applied(String),
    /// A record with this id already existed and won
    Ignored(String),
}

impl WriteOutcome {
    pub fn id(&self) -> &str {
        match self {
            WriteOutcome::Applied(id) | WriteOutcome::Ignored(id) => id,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }
}

/// A database session able to open named collections.
pub trait Database: Send + Sync + 'static {
    type Handle: CollectionHandle;

    fn open_collection(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> impl Future<Output = Result<Self::Handle, StoreError>> + Send;
}

/// One open, named collection.
pub trait CollectionHandle: Send + Sync + 'static {
    /// Full name the collection was opened under.
    fn name(&self) -> &str;

    /// Register a callback fired after every change to the collection.
    fn on_changed(&self, callback: Listener) -> Subscription;

    /// Current id → record mapping.
    fn all_entries(&self) -> HashMap<String, Value>;

    /// Point lookup by record id.
    fn find_one(&self, id: &str) -> Option<Value>;

    /// Insert a record. An empty or missing `_id` lets the store pick one.
    fn insert_one(&self, record: Value) -> impl Future<Output = Result<WriteOutcome, StoreError>> + Send;

    /// Release the handle. Its callbacks stop firing.
    fn close(&self);
}
