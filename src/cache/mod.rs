//! Cache Module
//!
//! The transactional object cache: per-entry locks, the resource manager
//! contract, the backing store and the cache server tying them together.

mod entry_lock;
mod resource;
mod server;
pub mod store;

pub use entry_lock::{EntryLock, ANONYMOUS_OWNER};
pub use resource::{ResourceManager, OP_PUT};
pub use server::CacheServer;
pub use store::{BackingStore, HttpDataStore};
