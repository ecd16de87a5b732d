//! Test doubles shared by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::cache::BackingStore;
use crate::cluster::{NodeAddress, StaticMembership};
use crate::election::{
    ElectionConfig, ElectionDriver, Event, LeaderElection, Message, RingElection, TimerEvent,
    TimerId, TimerService, TokioTimers,
};
use crate::error::{Error, Result};
use crate::network::Transport;

/// Address of test node `id`
pub fn addr(id: &str) -> NodeAddress {
    NodeAddress::new(id, format!("node-{}:7654", id))
}

fn unreachable(to: &NodeAddress) -> Error {
    Error::ConnectionFailed {
        address: to.endpoint().to_string(),
        reason: "node is down".into(),
    }
}

/// Transport that records successful sends
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(NodeAddress, Message)>>,
    unreachable: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(NodeAddress, Message)> {
        self.sent.lock().clone()
    }

    /// Fail every later send to `location`
    pub fn set_unreachable(&self, location: &str) {
        self.unreachable.lock().insert(location.to_string());
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, to: &NodeAddress, message: Message) -> Result<()> {
        if self.unreachable.lock().contains(to.location()) {
            return Err(unreachable(to));
        }
        self.sent.lock().push((to.clone(), message));
        Ok(())
    }
}

/// Timer service that never fires on its own
#[derive(Default)]
pub struct ManualTimers {
    next_id: AtomicU64,
    scheduled: Mutex<Vec<(TimerId, TimerEvent)>>,
    cancelled: Mutex<Vec<TimerId>>,
}

impl ManualTimers {
    pub fn scheduled(&self) -> Vec<(TimerId, TimerEvent)> {
        self.scheduled.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<TimerId> {
        self.cancelled.lock().clone()
    }
}

#[async_trait::async_trait]
impl TimerService for ManualTimers {
    async fn schedule(&self, _after: Duration, event: TimerEvent) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.scheduled.lock().push((id, event));
        id
    }

    async fn cancel(&self, id: TimerId) -> bool {
        self.cancelled.lock().push(id);
        true
    }
}

/// In-process network delivering messages straight onto event queues
#[derive(Default)]
pub struct LoopbackNetwork {
    queues: Mutex<HashMap<String, mpsc::Sender<Event>>>,
    down: Mutex<HashSet<String>>,
    ack_droppers: Mutex<HashSet<String>>,
    delivered: Mutex<Vec<(NodeAddress, Message)>>,
}

impl LoopbackNetwork {
    pub fn register(&self, location: &str, queue: mpsc::Sender<Event>) {
        self.queues.lock().insert(location.to_string(), queue);
    }

    /// Refuse every send to `location`
    pub fn set_down(&self, location: &str) {
        self.down.lock().insert(location.to_string());
    }

    /// Silently lose acknowledgements sent by `location`
    pub fn drop_acks_from(&self, location: &str) {
        self.ack_droppers.lock().insert(location.to_string());
    }

    /// Delivered messages in send order
    pub fn delivered(&self) -> Vec<(NodeAddress, Message)> {
        self.delivered.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackNetwork {
    async fn send(&self, to: &NodeAddress, message: Message) -> Result<()> {
        if self.down.lock().contains(to.location()) {
            return Err(unreachable(to));
        }

        if let Message::Ack { sender, .. } = &message {
            if self.ack_droppers.lock().contains(sender.location()) {
                return Ok(());
            }
        }

        let queue = self.queues.lock().get(to.location()).cloned();
        let queue = queue.ok_or_else(|| unreachable(to))?;

        self.delivered.lock().push((to.clone(), message.clone()));
        queue
            .send(Event::Message(message))
            .await
            .map_err(|_| Error::Network(format!("event queue of {} closed", to)))
    }
}

/// Nodes of a ring running over a `LoopbackNetwork`
pub struct TestRing {
    nodes: HashMap<String, Arc<RingElection>>,
}

impl TestRing {
    pub fn node(&self, id: &str) -> Arc<RingElection> {
        Arc::clone(&self.nodes[id])
    }

    /// Wait until node `id` knows a leader
    pub async fn wait_for_leader(&self, id: &str) -> NodeAddress {
        let mut leader = self.nodes[id].subscribe();
        let known = tokio::time::timeout(Duration::from_secs(5), leader.wait_for(Option::is_some))
            .await
            .expect("no leader within 5s")
            .expect("election stopped")
            .clone();
        known.expect("leader is set")
    }
}

/// Start a full election node with its own dispatcher for each id
pub fn spawn_ring(network: &Arc<LoopbackNetwork>, ids: &[&str], ack_timeout_ms: u64) -> TestRing {
    let mut nodes = HashMap::new();

    for id in ids {
        let membership = Arc::new(StaticMembership::with_peers(
            addr(id),
            ids.iter().map(|peer| addr(peer)),
        ));
        let (tx, rx) = mpsc::channel(1024);
        let timers = Arc::new(TokioTimers::new(tx.clone()));

        let election = Arc::new(RingElection::new(
            addr(id),
            membership,
            network.clone(),
            timers,
            ElectionConfig { ack_timeout_ms },
            tx.clone(),
        ));
        network.register(id, tx);
        ElectionDriver::new(Arc::clone(&election), rx).spawn();

        nodes.insert(id.to_string(), election);
    }

    TestRing { nodes }
}

/// Backing store held in memory, with a log of calls
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Bytes>>,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
    holding_puts: AtomicBool,
    puts_released: Notify,
}

impl MemoryStore {
    pub fn with_object(key: &str, content: &'static str) -> Self {
        let store = Self::default();
        store
            .objects
            .lock()
            .insert(key.to_string(), Bytes::from_static(content.as_bytes()));
        store
    }

    /// Make every later call fail with a store error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make later puts wait until `release_puts`
    pub fn hold_puts(&self) {
        self.holding_puts.store(true, Ordering::SeqCst);
    }

    pub fn release_puts(&self) {
        self.holding_puts.store(false, Ordering::SeqCst);
        self.puts_released.notify_one();
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BackingStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.record(format!("get {}", key))?;
        self.object(key).ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        self.record(format!("put {}", key))?;
        if self.holding_puts.load(Ordering::SeqCst) {
            self.puts_released.notified().await;
        }
        self.objects.lock().insert(key.to_string(), content);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.record(format!("delete {}", key))?;
        match self.objects.lock().remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(key.to_string())),
        }
    }
}

/// Election with a fixed outcome
pub struct FixedElection {
    local: NodeAddress,
    leader: NodeAddress,
}

impl FixedElection {
    /// This node is the leader
    pub fn leading() -> Self {
        Self {
            local: addr("1"),
            leader: addr("1"),
        }
    }

    /// Another node is the leader
    pub fn following() -> Self {
        Self {
            local: addr("1"),
            leader: addr("2"),
        }
    }
}

#[async_trait::async_trait]
impl LeaderElection for FixedElection {
    async fn get_leader(&self) -> Result<NodeAddress> {
        Ok(self.leader.clone())
    }

    async fn is_leader(&self) -> Result<bool> {
        Ok(self.local == self.leader)
    }

    async fn elect_leader(&self) -> Result<NodeAddress> {
        Ok(self.leader.clone())
    }
}
