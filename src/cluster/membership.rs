//! Cluster Membership
//!
//! Supplies the set of known nodes the ring is built from.

use std::collections::BTreeSet;
use std::ops::Bound;
use tokio::sync::RwLock;

use super::NodeAddress;
use crate::config::RingCacheConfig;

/// Source of the currently known cluster members
#[async_trait::async_trait]
pub trait Membership: Send + Sync {
    /// All known nodes, including this one, in ring order
    async fn known_nodes(&self) -> BTreeSet<NodeAddress>;

    /// Look a node up by its location
    async fn resolve(&self, location: &str) -> Option<NodeAddress> {
        self.known_nodes()
            .await
            .into_iter()
            .find(|n| n.location() == location)
    }
}

/// Successor of `base` on the ring: the first node strictly greater than
/// `base`, wrapping around to the smallest node.
pub fn next_neighbor(nodes: &BTreeSet<NodeAddress>, base: &NodeAddress) -> Option<NodeAddress> {
    nodes
        .range((Bound::Excluded(base), Bound::Unbounded))
        .next()
        .or_else(|| nodes.iter().next())
        .cloned()
}

/// Membership fixed at startup, with manual add/remove
pub struct StaticMembership {
    /// This node
    local: NodeAddress,
    /// All known nodes (including self)
    nodes: RwLock<BTreeSet<NodeAddress>>,
}

impl StaticMembership {
    /// Create a membership containing only this node
    pub fn new(local: NodeAddress) -> Self {
        let mut nodes = BTreeSet::new();
        nodes.insert(local.clone());
        Self {
            local,
            nodes: RwLock::new(nodes),
        }
    }

    /// Create a membership with this node and a set of peers
    pub fn with_peers(local: NodeAddress, peers: impl IntoIterator<Item = NodeAddress>) -> Self {
        let mut nodes: BTreeSet<NodeAddress> = peers.into_iter().collect();
        nodes.insert(local.clone());
        Self {
            local,
            nodes: RwLock::new(nodes),
        }
    }

    /// Build the membership described by a configuration file
    pub fn from_config(config: &RingCacheConfig) -> Self {
        let local = NodeAddress::new(config.node.id.clone(), config.advertise_address());
        let peers = config
            .cluster
            .peers
            .iter()
            .map(|p| NodeAddress::new(p.id.clone(), p.address.clone()));
        Self::with_peers(local, peers)
    }

    /// This node's address
    pub fn local(&self) -> &NodeAddress {
        &self.local
    }

    /// Add a peer node
    pub async fn add_node(&self, node: NodeAddress) -> bool {
        self.nodes.write().await.insert(node)
    }

    /// Remove a peer node. The local node cannot be removed.
    pub async fn remove_node(&self, location: &str) -> bool {
        if location == self.local.location() {
            return false;
        }
        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|n| n.location() != location);
        nodes.len() != before
    }

    /// Get the cluster size (total nodes)
    pub async fn size(&self) -> usize {
        self.nodes.read().await.len()
    }
}

#[async_trait::async_trait]
impl Membership for StaticMembership {
    async fn known_nodes(&self) -> BTreeSet<NodeAddress> {
        self.nodes.read().await.clone()
    }
}
