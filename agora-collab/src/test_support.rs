//! Fixtures shared by the unit tests.

use std::future::Future;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::memory::{MemoryCollection, MemoryDatabase, MemoryPeer, ReplicaNetwork, StoreConfig};
use crate::store::{CollectionOptions, Database};

pub fn network() -> Arc<ReplicaNetwork> {
    Arc::new(ReplicaNetwork::new(StoreConfig::for_testing()))
}

/// A connected peer's database session.
pub fn database(network: &Arc<ReplicaNetwork>, key: &str) -> Arc<MemoryDatabase> {
    let peer = MemoryPeer::new(network.clone(), key);
    peer.connect();
    Arc::new(peer.open_database("agora").unwrap())
}

/// Yields once before opening, so a load can be interleaved with a close.
pub struct YieldingDatabase(pub MemoryDatabase);

impl YieldingDatabase {
    pub fn connect(network: &Arc<ReplicaNetwork>, key: &str) -> Arc<Self> {
        Arc::new(Self(database(network, key).as_ref().clone()))
    }
}

impl Database for YieldingDatabase {
    type Handle = MemoryCollection;

    fn open_collection(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> impl Future<Output = Result<MemoryCollection, StoreError>> + Send {
        let open = self.0.open_collection(name, options);
        async move {
            tokio::task::yield_now().await;
            open.await
        }
    }
}

/// Fails every open whose collection name contains `fail_on`.
pub struct FailingDatabase {
    inner: MemoryDatabase,
    fail_on: String,
}

impl FailingDatabase {
    pub fn connect(network: &Arc<ReplicaNetwork>, key: &str, fail_on: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: database(network, key).as_ref().clone(),
            fail_on: fail_on.to_string(),
        })
    }
}

impl Database for FailingDatabase {
    type Handle = MemoryCollection;

    fn open_collection(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> impl Future<Output = Result<MemoryCollection, StoreError>> + Send {
        let open = (!name.contains(&self.fail_on)).then(|| self.inner.open_collection(name, options));
        async move {
            match open {
                Some(open) => open.await,
                None => Err(StoreError::NotConnected),
            }
        }
    }
}
