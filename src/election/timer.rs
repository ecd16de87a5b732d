//! Timer Service
//!
//! Schedules timer events onto a node's event queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::protocol::{Event, TimerEvent};

/// Identifier of a scheduled timer
pub type TimerId = u64;

/// Schedules events to fire on the owning node's dispatch point
#[async_trait::async_trait]
pub trait TimerService: Send + Sync {
    /// Fire `event` after `after` has elapsed
    async fn schedule(&self, after: Duration, event: TimerEvent) -> TimerId;

    /// Cancel a timer. Returns false if it already fired or was unknown.
    async fn cancel(&self, id: TimerId) -> bool;
}

/// Timer service backed by sleeping tokio tasks
pub struct TokioTimers {
    /// Queue timer events are delivered to
    events: mpsc::Sender<Event>,
    /// Next timer id
    next_id: AtomicU64,
    /// Timers that have not fired yet
    armed: Arc<Mutex<HashMap<TimerId, AbortHandle>>>,
}

impl TokioTimers {
    /// Create a timer service delivering to `events`
    pub fn new(events: mpsc::Sender<Event>) -> Self {
        Self {
            events,
            next_id: AtomicU64::new(1),
            armed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[cfg(test)]
    fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }
}

#[async_trait::async_trait]
impl TimerService for TokioTimers {
    async fn schedule(&self, after: Duration, event: TimerEvent) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let events = self.events.clone();
        let armed = Arc::clone(&self.armed);

        // Hold the table lock across spawn so the task cannot remove its
        // entry before it is inserted.
        {
            let mut table = self.armed.lock();
            let task = tokio::spawn(async move {
                tokio::time::sleep(after).await;
                armed.lock().remove(&id);
                if events.send(Event::Timer(event)).await.is_err() {
                    tracing::debug!("Timer {} fired after the event queue closed", id);
                }
            });
            table.insert(id, task.abort_handle());
        }

        id
    }

    async fn cancel(&self, id: TimerId) -> bool {
        match self.armed.lock().remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}
