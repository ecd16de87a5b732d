//! Cache Server
//!
//! Serves objects from a local cache filled from the backing store, and
//! takes part in write transactions as a resource manager.
//!
//! Local readers never modify entries; every change arrives through the
//! coordinator. Each entry is locked on its own: a read waits while the
//! entry is locked by a transaction, and queued transactions on the same
//! entry run before a read that arrived after them.
//!
//! All replicas update their cache on `apply`; only the elected leader
//! writes the change through to the backing store.

use std::collections::HashMap;
use std::sync::Arc;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};

use super::entry_lock::EntryLock;
use super::resource::{ResourceManager, OP_PUT};
use super::store::BackingStore;
use crate::coordinator::TransactionCoordinator;
use crate::election::LeaderElection;
use crate::error::{Error, Result};

/// Releases an anonymous read reservation when dropped
struct ReadReservation<'a> {
    locks: &'a EntryLock,
    key: &'a str,
}

impl Drop for ReadReservation<'_> {
    fn drop(&mut self) {
        self.locks.release_anonymous(self.key);
    }
}

/// Cache node and transaction participant
pub struct CacheServer {
    /// Cached content by object key
    cache: RwLock<HashMap<String, Bytes>>,
    /// Content before the in-flight transaction; `None` if the key was absent
    rollback_log: Mutex<HashMap<String, Option<Bytes>>>,
    /// Per-entry locks
    locks: EntryLock,
    /// Durable object storage
    store: Arc<dyn BackingStore>,
    /// Decides whether this node writes to the backing store
    election: Arc<dyn LeaderElection>,
    /// Runs writes as transactions
    coordinator: Arc<dyn TransactionCoordinator>,
}

impl CacheServer {
    /// Create a cache server and register it with `coordinator`
    pub async fn new(
        store: Arc<dyn BackingStore>,
        election: Arc<dyn LeaderElection>,
        coordinator: Arc<dyn TransactionCoordinator>,
    ) -> Arc<Self> {
        let server = Arc::new(Self {
            cache: RwLock::new(HashMap::new()),
            rollback_log: Mutex::new(HashMap::new()),
            locks: EntryLock::new(),
            store,
            election,
            coordinator: Arc::clone(&coordinator),
        });

        let manager = Arc::downgrade(&server);
        coordinator.set_resource_manager(manager).await;

        server
    }

    /// Content of `key`, read through to the backing store on a miss
    pub async fn get_content(&self, key: &str) -> Result<Bytes> {
        self.locks.reserve_anonymous(key).await;
        let _reservation = ReadReservation {
            locks: &self.locks,
            key,
        };

        let cached = self.cache.read().await.get(key).cloned();
        if let Some(content) = cached {
            tracing::trace!("GET {}: cache hit", key);
            return Ok(content);
        }

        let content = self.store.get(key).await?;
        self.cache
            .write()
            .await
            .insert(key.to_string(), content.clone());
        tracing::debug!("GET {}: filled from backing store", key);

        Ok(content)
    }

    /// Replace the content of `key` through a transaction
    pub async fn put_content(&self, key: &str, content: Bytes) -> Result<()> {
        match self.coordinator.execute_transaction(key, OP_PUT, content).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::TransactionFailed(format!("PUT {} was not executed", key))),
            Err(e) => Err(Error::TransactionFailed(format!("PUT {}: {}", key, e))),
        }
    }

    /// Deleting objects is not supported
    pub async fn delete_content(&self, key: &str) -> Result<()> {
        Err(Error::Unsupported(format!("DELETE {}", key)))
    }

    /// Cached content of `key`, without reading through
    pub async fn cached(&self, key: &str) -> Option<Bytes> {
        self.cache.read().await.get(key).cloned()
    }

    /// Number of cached objects
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Whether the cache holds no objects
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Whether `key` is currently locked
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks.is_held(key)
    }

    /// Write restored content back to the backing store if this node leads
    async fn propagate_restore(&self, resource: &str, restored: Option<Bytes>) -> bool {
        match self.election.is_leader().await {
            Ok(false) => return true,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!("Cannot determine leader while aborting {}: {}", resource, e);
                return false;
            }
        }

        let result = match restored {
            Some(content) => self.store.put(resource, content).await,
            None => match self.store.delete(resource).await {
                Err(e) if e.is_not_found() => Ok(()),
                other => other,
            },
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Unable to restore resource state in abort: {}: {}", resource, e);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl ResourceManager for CacheServer {
    async fn lock(&self, resource: &str, transaction: &str) -> bool {
        self.locks.reserve(resource, transaction).await;
        true
    }

    async fn apply(&self, resource: &str, transaction: &str, operation: &str, data: Bytes) -> bool {
        if operation != OP_PUT {
            tracing::warn!(
                "Rejecting unsupported operation {} on {} ({})",
                operation,
                resource,
                transaction
            );
            return false;
        }

        let previous = self.cache.read().await.get(resource).cloned();
        self.rollback_log
            .lock()
            .await
            .insert(resource.to_string(), previous);

        self.cache
            .write()
            .await
            .insert(resource.to_string(), data.clone());
        tracing::info!("PUT {}: updated local cache ({})", resource, transaction);

        match self.election.is_leader().await {
            Ok(false) => true,
            Ok(true) => match self.store.put(resource, data).await {
                Ok(()) => {
                    tracing::info!("PUT {}: updated backing store", resource);
                    true
                }
                Err(e) => {
                    tracing::warn!("Unable to update resource {}: {}", resource, e);
                    false
                }
            },
            Err(e) => {
                tracing::warn!("Cannot determine leader while applying {}: {}", resource, e);
                false
            }
        }
    }

    async fn commit(&self, resource: &str, transaction: &str) {
        self.rollback_log.lock().await.remove(resource);
        self.unlock(resource, transaction).await;
        tracing::debug!("{}: committed {}", transaction, resource);
    }

    async fn abort(&self, resource: &str, transaction: &str) -> bool {
        let snapshot = self.rollback_log.lock().await.remove(resource);

        let restored = match snapshot {
            Some(previous) => previous,
            None => {
                tracing::debug!("Previous state for resource {} not found in rollback log", resource);
                self.unlock(resource, transaction).await;
                return true;
            }
        };

        {
            let mut cache = self.cache.write().await;
            if let Some(content) = &restored {
                cache.insert(resource.to_string(), content.clone());
            } else {
                cache.remove(resource);
            }
        }

        let propagated = self.propagate_restore(resource, restored).await;
        self.unlock(resource, transaction).await;
        tracing::debug!("{}: aborted {}", transaction, resource);

        propagated
    }

    async fn unlock(&self, resource: &str, transaction: &str) {
        self.locks.release(resource, transaction);
    }
}
