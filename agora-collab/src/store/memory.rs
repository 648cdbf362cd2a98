//! In-process replicated store.
//!
//! Every peer attached to the same [`ReplicaNetwork`] sees the same named
//! collections, so a write by one peer is immediately visible to, and
//! announced to, every other peer's open handles:
//!
//! ```text
//! MemoryPeer (alice) ──┐                       ┌── MemoryCollection (alice)
//!                      ├── ReplicaNetwork ─────┤
//! MemoryPeer (bob)   ──┘   name → Shared       └── MemoryCollection (bob)
//!                          (records, Notifier, broadcast)
//! ```
//!
//! Access and conflict policies are fixed by whoever opens a collection
//! first and enforced on every write. Logical clocks come from one
//! network-wide counter, so they are strictly increasing per write.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::notifier::{Listener, Notifier, Subscription};
use crate::store::{
    AccessPolicy, CollectionHandle, CollectionOptions, ConflictPolicy, Database, WriteOutcome,
};

/// Memory store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Change events buffered per collection for async watchers
    pub change_capacity: usize,
    /// First logical clock handed out
    pub initial_clock: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            change_capacity: 256,
            initial_clock: 1,
        }
    }
}

impl StoreConfig {
    /// Config for testing (small buffers).
    pub fn for_testing() -> Self {
        Self {
            change_capacity: 16,
            initial_clock: 1,
        }
    }
}

/// Announced to async watchers after every applied write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub clock: u64,
    pub writer: String,
}

/// Write statistics for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub writes_applied: u64,
    pub writes_ignored: u64,
    pub writes_rejected: u64,
    pub records: usize,
}

/// Lock-free counters behind [`CollectionStats`].
struct AtomicCollectionStats {
    writes_applied: AtomicU64,
    writes_ignored: AtomicU64,
    writes_rejected: AtomicU64,
}

impl AtomicCollectionStats {
    fn new() -> Self {
        Self {
            writes_applied: AtomicU64::new(0),
            writes_ignored: AtomicU64::new(0),
            writes_rejected: AtomicU64::new(0),
        }
    }
}

/// State of one named collection shared by all peers.
struct SharedCollection {
    name: String,
    access: AccessPolicy,
    conflict: ConflictPolicy,
    creator: String,
    records: Mutex<HashMap<String, Value>>,
    notifier: Notifier,
    changes: broadcast::Sender<ChangeEvent>,
    stats: AtomicCollectionStats,
}

impl SharedCollection {
    fn new(name: String, options: &CollectionOptions, opener: &str, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            name,
            access: options.access,
            conflict: options.conflict,
            creator: options
                .creator_public_key
                .clone()
                .unwrap_or_else(|| opener.to_string()),
            records: Mutex::new(HashMap::new()),
            notifier: Notifier::new(),
            changes,
            stats: AtomicCollectionStats::new(),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_access(&self, writer: &str, id: &str) -> Result<(), StoreError> {
        let allowed = match self.access {
            AccessPolicy::ReadWrite => true,
            AccessPolicy::Read => writer == self.creator,
            AccessPolicy::ReadAnyWriteOwn => writer == id,
        };
        if allowed {
            Ok(())
        } else {
            Err(StoreError::AccessDenied {
                collection: self.name.clone(),
                writer: writer.to_string(),
                id: id.to_string(),
            })
        }
    }
}

/// The set of collections visible to every attached peer.
pub struct ReplicaNetwork {
    collections: RwLock<HashMap<String, Arc<SharedCollection>>>,
    clock: AtomicU64,
    config: StoreConfig,
}

impl Default for ReplicaNetwork {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl ReplicaNetwork {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(config.initial_clock),
            config,
        }
    }

    /// Next logical clock value.
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Get or create the shared state for `name`.
    async fn get_or_create(
        &self,
        name: &str,
        options: &CollectionOptions,
        opener: &str,
    ) -> Arc<SharedCollection> {
        // Fast path: read lock
        {
            let collections = self.collections.read().await;
            if let Some(shared) = collections.get(name) {
                return shared.clone();
            }
        }

        // Slow path: write lock to create
        let mut collections = self.collections.write().await;
        if let Some(shared) = collections.get(name) {
            return shared.clone();
        }

        log::debug!("Creating collection {name} ({:?}, {:?})", options.access, options.conflict);
        let shared = Arc::new(SharedCollection::new(
            name.to_string(),
            options,
            opener,
            self.config.change_capacity,
        ));
        collections.insert(name.to_string(), shared.clone());
        shared
    }

    /// Names of every collection created so far.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn collection_count(&self) -> usize {
        self.collections.read().await.len()
    }
}

/// A peer identity attached to a network.
pub struct MemoryPeer {
    network: Arc<ReplicaNetwork>,
    public_key: String,
    connected: AtomicBool,
}

impl MemoryPeer {
    pub fn new(network: Arc<ReplicaNetwork>, public_key: impl Into<String>) -> Self {
        Self {
            network,
            public_key: public_key.into(),
            connected: AtomicBool::new(false),
        }
    }

    /// A peer with a random identity.
    pub fn generate(network: Arc<ReplicaNetwork>) -> Self {
        Self::new(network, Uuid::new_v4().simple().to_string())
    }

    pub fn connect(&self) -> bool {
        self.connected.store(true, Ordering::SeqCst);
        log::debug!("Peer {} connected", self.public_key);
        true
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The peer's public key, once connected.
    pub fn public_identity(&self) -> Option<String> {
        self.is_connected().then(|| self.public_key.clone())
    }

    /// Open a named database, once connected.
    pub fn open_database(&self, name: impl Into<String>) -> Option<MemoryDatabase> {
        if !self.is_connected() {
            return None;
        }
        Some(MemoryDatabase {
            network: self.network.clone(),
            name: name.into(),
            public_key: self.public_key.clone(),
        })
    }
}

/// A peer's session on one named database.
#[derive(Clone)]
pub struct MemoryDatabase {
    network: Arc<ReplicaNetwork>,
    name: String,
    public_key: String,
}

impl MemoryDatabase {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }
}

impl Database for MemoryDatabase {
    type Handle = MemoryCollection;

    fn open_collection(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> impl Future<Output = Result<MemoryCollection, StoreError>> + Send {
        let network = self.network.clone();
        let full_name = format!("{}/{}", self.name, name);
        let writer = self.public_key.clone();
        async move {
            let shared = network.get_or_create(&full_name, &options, &writer).await;
            Ok(MemoryCollection {
                shared,
                network,
                writer,
                lower_clock_bound: options.lower_clock_bound,
                closed: Arc::new(AtomicBool::new(false)),
            })
        }
    }
}

/// One peer's handle on a shared collection.
#[derive(Clone)]
pub struct MemoryCollection {
    shared: Arc<SharedCollection>,
    network: Arc<ReplicaNetwork>,
    writer: String,
    lower_clock_bound: Option<u64>,
    closed: Arc<AtomicBool>,
}

impl MemoryCollection {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn visible(&self, record: &Value) -> bool {
        match self.lower_clock_bound {
            Some(bound) => record.get("_clock").and_then(Value::as_u64).unwrap_or(0) >= bound,
            None => true,
        }
    }

    /// Async feed of applied writes.
    pub fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.shared.changes.subscribe()
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            writes_applied: self.shared.stats.writes_applied.load(Ordering::Relaxed),
            writes_ignored: self.shared.stats.writes_ignored.load(Ordering::Relaxed),
            writes_rejected: self.shared.stats.writes_rejected.load(Ordering::Relaxed),
            records: self.shared.records().len(),
        }
    }

    /// Public key the collection treats as its creator.
    pub fn creator(&self) -> &str {
        &self.shared.creator
    }

    fn apply_write(&self, record: Value) -> Result<WriteOutcome, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed(self.shared.name.clone()));
        }
        let Value::Object(mut fields) = record else {
            return Err(StoreError::InvalidRecord(format!(
                "expected an object in {}",
                self.shared.name
            )));
        };

        let id = match fields.get("_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        if let Err(e) = self.shared.check_access(&self.writer, &id) {
            self.shared.stats.writes_rejected.fetch_add(1, Ordering::Relaxed);
            log::warn!("{e}");
            return Err(e);
        }

        let clock = {
            let mut records = self.shared.records();
            if self.shared.conflict == ConflictPolicy::FirstWriteWins && records.contains_key(&id) {
                self.shared.stats.writes_ignored.fetch_add(1, Ordering::Relaxed);
                log::debug!("Ignoring rewrite of {id} in {}", self.shared.name);
                return Ok(WriteOutcome::Ignored(id));
            }
            let clock = self.network.tick();
            fields.insert("_id".into(), Value::String(id.clone()));
            fields.insert("_clock".into(), json!(clock));
            fields.insert("_identity".into(), json!({ "publicKey": self.writer }));
            records.insert(id.clone(), Value::Object(fields));
            clock
        };

        self.shared.stats.writes_applied.fetch_add(1, Ordering::Relaxed);
        log::trace!("Applied {id}@{clock} in {}", self.shared.name);

        // Callbacks run with no store lock held.
        self.shared.notifier.notify_all();
        let _ = self.shared.changes.send(ChangeEvent {
            collection: self.shared.name.clone(),
            id: id.clone(),
            clock,
            writer: self.writer.clone(),
        });

        Ok(WriteOutcome::Applied(id))
    }
}

impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn on_changed(&self, callback: Listener) -> Subscription {
        let closed = self.closed.clone();
        self.shared.notifier.subscribe(move || {
            if !closed.load(Ordering::SeqCst) {
                callback();
            }
        })
    }

    fn all_entries(&self) -> HashMap<String, Value> {
        if self.is_closed() {
            return HashMap::new();
        }
        self.shared
            .records()
            .iter()
            .filter(|(_, record)| self.visible(record))
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    fn find_one(&self, id: &str) -> Option<Value> {
        if self.is_closed() {
            return None;
        }
        self.shared
            .records()
            .get(id)
            .filter(|record| self.visible(record))
            .cloned()
    }

    fn insert_one(&self, record: Value) -> impl Future<Output = Result<WriteOutcome, StoreError>> + Send {
        std::future::ready(self.apply_write(record))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("Closed handle on {} for {}", self.shared.name, self.writer);
        }
    }
}
