//! Election Dispatcher
//!
//! Feeds messages, timer events and start requests to the election one at
//! a time.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::Event;
use super::RingElection;

/// Sequential dispatch point of a node's election
pub struct ElectionDriver {
    election: Arc<RingElection>,
    events: mpsc::Receiver<Event>,
}

impl ElectionDriver {
    /// Create a driver for `election` reading from `events`
    pub fn new(election: Arc<RingElection>, events: mpsc::Receiver<Event>) -> Self {
        Self { election, events }
    }

    /// Process events until the queue closes
    pub async fn run(mut self) {
        tracing::debug!("Election dispatcher running for {}", self.election.local());

        while let Some(event) = self.events.recv().await {
            self.election.handle(event).await;
        }

        tracing::info!("Election dispatcher stopped");
    }

    /// Run the dispatcher on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
