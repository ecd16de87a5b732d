//! Election Protocol
//!
//! Defines the wire protocol and the events consumed by the election
//! dispatcher.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cluster::NodeAddress;

/// Unique identifier of an election message
pub type MessageId = Uuid;

/// Protocol messages exchanged between nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Proposes `candidate` as the highest identifier seen so far
    ElectionRequest {
        id: MessageId,
        sender: NodeAddress,
        candidate: String,
    },

    /// Announces that the sender is the elected leader
    ElectionResult {
        id: MessageId,
        sender: NodeAddress,
    },

    /// Confirms receipt of the message `ack_of`
    Ack {
        id: MessageId,
        sender: NodeAddress,
        ack_of: MessageId,
    },
}

impl Message {
    /// Build a request carrying a fresh message id
    pub fn request(sender: NodeAddress, candidate: impl Into<String>) -> Self {
        Message::ElectionRequest {
            id: Uuid::new_v4(),
            sender,
            candidate: candidate.into(),
        }
    }

    /// Build a leader announcement carrying a fresh message id
    pub fn result(sender: NodeAddress) -> Self {
        Message::ElectionResult {
            id: Uuid::new_v4(),
            sender,
        }
    }

    /// Build an acknowledgement for `ack_of`
    pub fn ack(sender: NodeAddress, ack_of: MessageId) -> Self {
        Message::Ack {
            id: Uuid::new_v4(),
            sender,
            ack_of,
        }
    }

    /// Id of this message
    pub fn id(&self) -> MessageId {
        match self {
            Message::ElectionRequest { id, .. }
            | Message::ElectionResult { id, .. }
            | Message::Ack { id, .. } => *id,
        }
    }

    /// Node that sent this message
    pub fn sender(&self) -> &NodeAddress {
        match self {
            Message::ElectionRequest { sender, .. }
            | Message::ElectionResult { sender, .. }
            | Message::Ack { sender, .. } => sender,
        }
    }

    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::ElectionRequest { .. } => "ElectionRequest",
            Message::ElectionResult { .. } => "ElectionResult",
            Message::Ack { .. } => "Ack",
        }
    }
}

/// Events raised by scheduled timers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// No acknowledgement arrived for `message_id` sent to `target`
    AckTimeout {
        message_id: MessageId,
        target: String,
    },
}

/// Everything the election dispatcher processes, in arrival order
#[derive(Debug)]
pub enum Event {
    /// A message delivered by the transport
    Message(Message),
    /// A timer that fired
    Timer(TimerEvent),
    /// Local request to start a round; `started` is signalled once the
    /// round is running (or was already running)
    Start { started: Option<oneshot::Sender<()>> },
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Message length
    pub length: u32,
    /// Message checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Largest body accepted from the wire
    pub const MAX_BODY: u32 = 64 * 1024;

    /// Create a new frame header
    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}
