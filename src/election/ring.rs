//! Ring Leader Election
//!
//! Elects the node with the greatest identifier. A round starts by sending
//! the node's own identifier to its ring successor; every node forwards the
//! greater of what it received and what it has seen, and the node that gets
//! its own identifier back becomes leader and announces itself to everyone.
//!
//! Every forward is acknowledged. A forward that is not acknowledged in time
//! is retried against the next node on the ring, so unresponsive nodes are
//! skipped without a separate failure detector.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use super::protocol::{Event, Message, MessageId, TimerEvent};
use super::timer::{TimerId, TimerService};
use super::LeaderElection;
use crate::cluster::{compare_ids, max_id, next_neighbor, Membership, NodeAddress};
use crate::error::{Error, Result};
use crate::network::Transport;

/// Election configuration
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// How long a forwarded request may stay unacknowledged
    pub ack_timeout_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 1000,
        }
    }
}

impl ElectionConfig {
    fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Point-in-time view of a node's election state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionStatus {
    pub location: String,
    pub leader: Option<String>,
    pub in_election: bool,
    pub highest_candidate: String,
    pub pending_acks: usize,
    pub elected_at: Option<DateTime<Utc>>,
}

/// A forwarded request still waiting for its acknowledgement
struct PendingAck {
    timer: TimerId,
    target: String,
}

/// Mutable round state, only changed by the dispatcher
struct RoundState {
    /// Greatest identifier seen in the current round
    highest_candidate: String,
    /// Leader resolved by the last round
    current_leader: Option<NodeAddress>,
    /// A round is in progress
    in_election: bool,
    /// Unacknowledged forwards by message id
    pending: HashMap<MessageId, PendingAck>,
    /// When the current leader was resolved
    elected_at: Option<DateTime<Utc>>,
}

/// Ring leader election for one node
pub struct RingElection {
    /// This node
    local: NodeAddress,
    /// Known cluster members
    membership: Arc<dyn Membership>,
    /// Outbound messages
    transport: Arc<dyn Transport>,
    /// Retry timers
    timers: Arc<dyn TimerService>,
    /// Election configuration
    config: ElectionConfig,
    /// Round state
    state: Mutex<RoundState>,
    /// Published leader, watched by callers of `elect_leader`
    leader_tx: watch::Sender<Option<NodeAddress>>,
    /// This node's event queue
    events: mpsc::Sender<Event>,
}

impl RingElection {
    /// Create the election for `local`. `events` must feed the
    /// `ElectionDriver` running this election.
    pub fn new(
        local: NodeAddress,
        membership: Arc<dyn Membership>,
        transport: Arc<dyn Transport>,
        timers: Arc<dyn TimerService>,
        config: ElectionConfig,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let (leader_tx, _) = watch::channel(None);

        Self {
            state: Mutex::new(RoundState {
                highest_candidate: local.location().to_string(),
                current_leader: None,
                in_election: false,
                pending: HashMap::new(),
                elected_at: None,
            }),
            local,
            membership,
            transport,
            timers,
            config,
            leader_tx,
            events,
        }
    }

    /// This node's address
    pub fn local(&self) -> &NodeAddress {
        &self.local
    }

    /// Leader known right now, without starting a round
    pub fn current_leader(&self) -> Option<NodeAddress> {
        self.leader_tx.borrow().clone()
    }

    /// Follow leader changes
    pub fn subscribe(&self) -> watch::Receiver<Option<NodeAddress>> {
        self.leader_tx.subscribe()
    }

    /// Whether a round is in progress
    pub async fn in_election(&self) -> bool {
        self.state.lock().await.in_election
    }

    /// Snapshot of the election state
    pub async fn snapshot(&self) -> ElectionStatus {
        let state = self.state.lock().await;
        ElectionStatus {
            location: self.local.location().to_string(),
            leader: state.current_leader.as_ref().map(|l| l.location().to_string()),
            in_election: state.in_election,
            highest_candidate: state.highest_candidate.clone(),
            pending_acks: state.pending.len(),
            elected_at: state.elected_at,
        }
    }

    /// Process one event. Called only by the dispatcher.
    pub async fn handle(&self, event: Event) {
        match event {
            Event::Message(message) => self.handle_message(message).await,
            Event::Timer(TimerEvent::AckTimeout { message_id, target }) => {
                self.handle_ack_timeout(message_id, &target).await
            }
            Event::Start { started } => self.start_election(started).await,
        }
    }

    async fn handle_message(&self, message: Message) {
        tracing::trace!("Received {} from {}", message.type_name(), message.sender());

        match message {
            Message::ElectionRequest { id, sender, candidate } => {
                self.handle_request(id, sender, candidate).await
            }
            Message::ElectionResult { sender, .. } => self.handle_result(sender).await,
            Message::Ack { sender, ack_of, .. } => self.handle_ack(ack_of, &sender).await,
        }
    }

    /// Begin a round by proposing this node to its successor
    async fn start_election(&self, started: Option<oneshot::Sender<()>>) {
        let candidate = {
            let mut state = self.state.lock().await;
            if state.in_election {
                tracing::debug!("Election already in progress");
                None
            } else {
                state.in_election = true;
                state.current_leader = None;
                state.elected_at = None;
                state.highest_candidate = self.local.location().to_string();
                self.leader_tx.send_replace(None);
                Some(state.highest_candidate.clone())
            }
        };

        if let Some(started) = started {
            let _ = started.send(());
        }

        if let Some(candidate) = candidate {
            tracing::info!("Starting election (node: {})", self.local);
            self.forward(&self.local, candidate).await;
        }
    }

    /// Handle a candidate proposal from the previous node on the ring
    async fn handle_request(&self, id: MessageId, sender: NodeAddress, candidate: String) {
        if let Err(e) = self.transport.send(&sender, Message::ack(self.local.clone(), id)).await {
            tracing::warn!("Failed to acknowledge {} from {}: {}", id, sender, e);
        }

        if compare_ids(&candidate, self.local.location()) == Ordering::Equal {
            tracing::info!("Own candidate {} completed the ring", candidate);
            self.declare_self_leader().await;
            return;
        }

        let highest = {
            let mut state = self.state.lock().await;
            let highest = max_id(&state.highest_candidate, &candidate).to_string();
            state.highest_candidate = highest.clone();
            if !state.in_election {
                state.in_election = true;
                state.current_leader = None;
                state.elected_at = None;
                self.leader_tx.send_replace(None);
            }
            highest
        };

        tracing::debug!(
            "Candidate {} from {}, forwarding {}",
            candidate,
            sender,
            highest
        );
        self.forward(&self.local, highest).await;
    }

    /// The announced leader ends the round unconditionally
    async fn handle_result(&self, leader: NodeAddress) {
        {
            let mut state = self.state.lock().await;
            state.current_leader = Some(leader.clone());
            state.in_election = false;
            state.highest_candidate = self.local.location().to_string();
            state.elected_at = Some(Utc::now());
        }
        self.leader_tx.send_replace(Some(leader.clone()));

        tracing::info!("Leader elected: {}", leader);
    }

    async fn handle_ack(&self, ack_of: MessageId, sender: &NodeAddress) {
        let pending = self.state.lock().await.pending.remove(&ack_of);

        match pending {
            Some(pending) => {
                self.timers.cancel(pending.timer).await;
                tracing::trace!("{} acknowledged {}", pending.target, ack_of);
            }
            None => {
                tracing::debug!("Ack from {} for unknown message {}", sender, ack_of);
            }
        }
    }

    /// The target of `message_id` did not acknowledge in time: skip it
    async fn handle_ack_timeout(&self, message_id: MessageId, target: &str) {
        let candidate = {
            let mut state = self.state.lock().await;
            if state.pending.remove(&message_id).is_none() {
                tracing::debug!("Timeout for acknowledged message {}", message_id);
                return;
            }
            if !state.in_election {
                tracing::debug!("Timeout for {} outside of an election", message_id);
                return;
            }
            state.highest_candidate.clone()
        };

        tracing::warn!(
            "No acknowledgement from {} for {}, trying the next node",
            target,
            message_id
        );

        let base = match self.membership.resolve(target).await {
            Some(node) => node,
            None => self.local.clone(),
        };
        self.forward(&base, candidate).await;
    }

    /// Send `candidate` to the first reachable successor of `base`. Reaching
    /// this node again means nobody else is reachable.
    async fn forward(&self, base: &NodeAddress, candidate: String) {
        let nodes = self.membership.known_nodes().await;
        let mut target = next_neighbor(&nodes, base).unwrap_or_else(|| self.local.clone());

        for _ in 0..nodes.len() {
            if target == self.local {
                break;
            }

            let message = Message::request(self.local.clone(), candidate.clone());
            let message_id = message.id();

            match self.transport.send(&target, message).await {
                Ok(()) => {
                    tracing::debug!("Sent candidate {} to {}", candidate, target);
                    self.arm_ack_timer(message_id, &target).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!("Failed to send election request to {}: {}", target, e);
                    target = next_neighbor(&nodes, &target).unwrap_or_else(|| self.local.clone());
                }
            }
        }

        tracing::info!("No other node reachable on the ring");
        self.declare_self_leader().await;
    }

    async fn arm_ack_timer(&self, message_id: MessageId, target: &NodeAddress) {
        let event = TimerEvent::AckTimeout {
            message_id,
            target: target.location().to_string(),
        };
        let timer = self.timers.schedule(self.config.ack_timeout(), event).await;

        self.state.lock().await.pending.insert(
            message_id,
            PendingAck {
                timer,
                target: target.location().to_string(),
            },
        );
    }

    /// Take the leader role and tell every other known node
    async fn declare_self_leader(&self) {
        {
            let mut state = self.state.lock().await;
            state.current_leader = Some(self.local.clone());
            state.in_election = false;
            state.highest_candidate = self.local.location().to_string();
            state.elected_at = Some(Utc::now());
        }
        self.leader_tx.send_replace(Some(self.local.clone()));

        tracing::info!("Elected as LEADER (node: {})", self.local);

        let peers: Vec<NodeAddress> = self
            .membership
            .known_nodes()
            .await
            .into_iter()
            .filter(|n| n != &self.local)
            .collect();

        let announcements = peers.iter().map(|peer| async move {
            if let Err(e) = self.transport.send(peer, Message::result(self.local.clone())).await {
                tracing::warn!("Failed to announce leadership to {}: {}", peer, e);
            }
        });
        futures::future::join_all(announcements).await;
    }
}

#[async_trait::async_trait]
impl LeaderElection for RingElection {
    async fn get_leader(&self) -> Result<NodeAddress> {
        match self.current_leader() {
            Some(leader) => Ok(leader),
            None => self.elect_leader().await,
        }
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(self.get_leader().await? == self.local)
    }

    async fn elect_leader(&self) -> Result<NodeAddress> {
        let mut leader_rx = self.leader_tx.subscribe();

        if !self.in_election().await {
            let (started_tx, started_rx) = oneshot::channel();
            self.events
                .send(Event::Start { started: Some(started_tx) })
                .await
                .map_err(|_| Error::ShuttingDown)?;
            started_rx.await.map_err(|_| Error::ShuttingDown)?;
        }

        let leader = leader_rx
            .wait_for(|leader| leader.is_some())
            .await
            .map_err(|_| Error::ShuttingDown)?
            .clone();

        leader.ok_or(Error::NoLeader)
    }
}
