//! Node Addresses
//!
//! A node is identified by its location, which doubles as its election
//! identifier and fixes its position on the ring.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// Address of a node in the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Election identifier and ring key
    location: String,
    /// Socket address election traffic is sent to
    endpoint: String,
}

impl NodeAddress {
    /// Create a new node address
    pub fn new(location: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            endpoint: endpoint.into(),
        }
    }

    /// The election identifier of this node
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The network endpoint of this node
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.location, self.endpoint)
    }
}

impl PartialEq for NodeAddress {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl Eq for NodeAddress {}

impl Hash for NodeAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
    }
}

impl PartialOrd for NodeAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ids(&self.location, &other.location)
    }
}

/// Compare two election identifiers.
///
/// Identifiers that both parse as unsigned integers compare numerically so
/// that "10" sorts after "9"; anything else compares as text. Numerically
/// equal but textually different ids ("07" and "7") fall back to text order
/// to keep the order total.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// The greater of two election identifiers
pub fn max_id<'a>(a: &'a str, b: &'a str) -> &'a str {
    if compare_ids(a, b) == Ordering::Less {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids_sort_numerically() {
        assert_eq!(compare_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_ids("5", "3"), Ordering::Greater);
        assert_eq!(compare_ids("4", "4"), Ordering::Equal);
        assert_eq!(compare_ids("07", "7"), Ordering::Less);
    }

    #[test]
    fn test_textual_ids_sort_lexically() {
        assert_eq!(compare_ids("node-a", "node-b"), Ordering::Less);
        assert_eq!(compare_ids("10.0.0.2:7654", "10.0.0.10:7654"), Ordering::Greater);
    }

    #[test]
    fn test_identity_ignores_endpoint() {
        let a = NodeAddress::new("3", "host-a:7654");
        let b = NodeAddress::new("3", "host-b:7654");
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a.to_string(), "3@host-a:7654");
    }

    #[test]
    fn test_max_id() {
        assert_eq!(max_id("1", "5"), "5");
        assert_eq!(max_id("12", "5"), "12");
    }
}
