//! Cluster Module
//!
//! Node addressing and membership for the election ring.

mod address;
mod membership;

pub use address::{compare_ids, max_id, NodeAddress};
pub use membership::{next_neighbor, Membership, StaticMembership};
