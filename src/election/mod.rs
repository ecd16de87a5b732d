//! Leader Election Module
//!
//! Ring-based leader election: requests travel around the ring of known
//! nodes carrying the highest identifier seen, and the node whose own
//! identifier comes back to it announces itself as leader.

pub mod protocol;
mod ring;
mod driver;
mod timer;

pub use protocol::{Event, FrameHeader, Message, MessageId, TimerEvent};
pub use ring::{ElectionConfig, ElectionStatus, RingElection};
pub use driver::ElectionDriver;
pub use timer::{TimerId, TimerService, TokioTimers};

use crate::cluster::NodeAddress;
use crate::error::Result;

/// Access to the elected coordinator of the cluster
#[async_trait::async_trait]
pub trait LeaderElection: Send + Sync {
    /// Current leader, electing one first if none is known
    async fn get_leader(&self) -> Result<NodeAddress>;

    /// Whether this node is the current leader
    async fn is_leader(&self) -> Result<bool>;

    /// Start a new round unless one is running, and wait for its leader
    async fn elect_leader(&self) -> Result<NodeAddress>;
}
