//! RingCache - Transactional Object Cache with Ring Leader Election
//!
//! A cluster of cache nodes fronting a shared data server. Writes run as
//! transactions against every node's cache, and a leader chosen by a ring
//! election writes committed changes through to the data server.
//!
//! # Architecture
//!
//! Each node runs a single election dispatcher fed by the network server
//! and its retry timers. Nodes form a logical ring ordered by identifier;
//! election requests travel around it carrying the highest identifier seen
//! and the node whose identifier comes back to it becomes leader.
//!
//! The cache serializes readers and transactions per entry, keeps a
//! rollback snapshot of the entry under change, and restores it on abort.

pub mod config;
pub mod error;
pub mod cluster;
pub mod election;
pub mod network;
pub mod cache;
pub mod coordinator;
pub mod api;

#[cfg(test)]
mod testing;

pub use config::RingCacheConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RingCacheConfig;
    pub use crate::error::{Error, Result};
    pub use crate::cluster::{Membership, NodeAddress, StaticMembership};
    pub use crate::election::{ElectionDriver, LeaderElection, Message, RingElection};
    pub use crate::cache::{BackingStore, CacheServer, EntryLock, ResourceManager};
    pub use crate::coordinator::{LocalCoordinator, TransactionCoordinator};
}
