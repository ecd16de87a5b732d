//! Resource Manager Contract
//!
//! The participant side of a transaction: the coordinator locks every
//! participant's resource, applies the operation, then commits or aborts.

/// The only operation cache resources accept
pub const OP_PUT: &str = "PUT";

/// A transactional participant driven by a coordinator
#[async_trait::async_trait]
pub trait ResourceManager: Send + Sync {
    /// Hold `resource` exclusively for `transaction`, waiting if needed
    async fn lock(&self, resource: &str, transaction: &str) -> bool;

    /// Apply `operation` with `data` to a locked resource
    async fn apply(&self, resource: &str, transaction: &str, operation: &str, data: bytes::Bytes) -> bool;

    /// Make an applied change final and release the resource
    async fn commit(&self, resource: &str, transaction: &str);

    /// Undo an applied change and release the resource
    async fn abort(&self, resource: &str, transaction: &str) -> bool;

    /// Release the resource without committing or aborting
    async fn unlock(&self, resource: &str, transaction: &str);
}
