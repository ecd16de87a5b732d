//! Transaction Coordinator
//!
//! The seam through which cache writes are turned into transactions.
//! `LocalCoordinator` drives the single resource manager of a node on its
//! own; a cluster-wide coordinator plugs in through the same trait.
//!
//! A local transaction only runs on the elected leader, so the write
//! always reaches the backing store. Once locked, a transaction runs to
//! commit or abort on its own task even if the caller goes away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::cache::ResourceManager;
use crate::election::LeaderElection;
use crate::error::{Error, Result};

/// Runs a write as a transaction across the registered resource managers
#[async_trait::async_trait]
pub trait TransactionCoordinator: Send + Sync {
    /// Execute `operation` on `key`. `Ok(false)` means a participant refused.
    async fn execute_transaction(&self, key: &str, operation: &str, content: Bytes) -> Result<bool>;

    /// Register the resource manager of this node
    async fn set_resource_manager(&self, manager: Weak<dyn ResourceManager>);
}

/// Coordinator for a node acting as the only participant
pub struct LocalCoordinator {
    manager: RwLock<Option<Weak<dyn ResourceManager>>>,
    election: Arc<dyn LeaderElection>,
    next_txn: AtomicU64,
}

impl LocalCoordinator {
    /// Create a coordinator accepting writes while `election` names this node
    pub fn new(election: Arc<dyn LeaderElection>) -> Self {
        Self {
            manager: RwLock::new(None),
            election,
            next_txn: AtomicU64::new(1),
        }
    }
}

/// Lock, apply, then commit or abort `key` on `manager`
async fn run_transaction(
    manager: Arc<dyn ResourceManager>,
    transaction: String,
    key: String,
    operation: String,
    content: Bytes,
) -> bool {
    if !manager.lock(&key, &transaction).await {
        tracing::warn!("{}: lock on {} refused", transaction, key);
        return false;
    }

    if manager.apply(&key, &transaction, &operation, content).await {
        manager.commit(&key, &transaction).await;
        true
    } else {
        tracing::warn!("{}: apply on {} failed, aborting", transaction, key);
        manager.abort(&key, &transaction).await;
        false
    }
}

#[async_trait::async_trait]
impl TransactionCoordinator for LocalCoordinator {
    async fn execute_transaction(&self, key: &str, operation: &str, content: Bytes) -> Result<bool> {
        let manager = self
            .manager
            .read()
            .await
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::Internal("no resource manager registered".into()))?;

        if !self.election.is_leader().await? {
            let leader = self.election.get_leader().await?;
            return Err(Error::TransactionFailed(format!(
                "{} {} must be sent to the leader {}",
                operation, key, leader
            )));
        }

        let transaction = format!("txn-{}", self.next_txn.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("Executing {} {} as {}", operation, key, transaction);

        let task = tokio::spawn(run_transaction(
            manager,
            transaction,
            key.to_string(),
            operation.to_string(),
            content,
        ));

        task.await
            .map_err(|e| Error::Internal(format!("transaction task failed: {}", e)))
    }

    async fn set_resource_manager(&self, manager: Weak<dyn ResourceManager>) {
        *self.manager.write().await = Some(manager);
    }
}
