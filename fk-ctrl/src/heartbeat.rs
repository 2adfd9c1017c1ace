use std::cmp::Reverse;
use std::collections::{
    BinaryHeap,
    HashMap,
};
use std::sync::{
    Arc,
    Mutex,
};
use std::time::Duration;

use fk_core::backoff::jittered;
use fk_core::prelude::*;
use tokio::sync::Notify;
use tokio::time::{
    Instant,
    sleep_until,
};
use tokio_util::sync::CancellationToken;
use tracing::*;

// Deadline-driven refresh loop for node status.  A single timer sleeps until
// the earliest deadline; on wake, every node whose deadline has elapsed is
// handed to the submit callback, and the whole batch is re-enqueued before
// the timer sleeps again.  Per-node jitter keeps a large fleet from
// stampeding the apiserver on the same tick.
//
// The `deadlines` map is authoritative; heap entries that disagree with it
// are stale (the node was released or rescheduled) and get discarded on pop.
#[derive(Default)]
struct SchedulerState {
    heap: BinaryHeap<Reverse<(Instant, String)>>,
    deadlines: HashMap<String, Instant>,
    retry_delays: HashMap<String, Duration>,
}

#[derive(Clone)]
pub struct HeartbeatScheduler {
    state: Arc<Mutex<SchedulerState>>,
    notify: Arc<Notify>,
    interval: Duration,
}

impl HeartbeatScheduler {
    pub fn new(interval: Duration) -> HeartbeatScheduler {
        HeartbeatScheduler {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            notify: Arc::new(Notify::new()),
            interval,
        }
    }

    pub fn register(&self, node: &str) {
        self.schedule(node, Instant::now() + jittered(self.interval, HEARTBEAT_JITTER));
    }

    pub fn release(&self, node: &str) {
        let mut state = self.state.lock().unwrap();
        state.deadlines.remove(node);
        state.retry_delays.remove(node);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.state.lock().unwrap().deadlines.contains_key(node)
    }

    // A failed status write brings the node back early, doubling up to the
    // regular interval; success clears the ladder.
    pub fn record_failure(&self, node: &str) {
        let next_delay;
        {
            let mut state = self.state.lock().unwrap();
            // a node with no pending deadline was released mid-write; don't
            // resurrect it
            if !state.deadlines.contains_key(node) {
                return;
            }
            let delay = state.retry_delays.get(node).copied().unwrap_or(HEARTBEAT_RETRY_INITIAL);
            state.retry_delays.insert(node.into(), (delay * 2).min(self.interval));
            next_delay = delay.min(self.interval);
        }
        self.schedule(node, Instant::now() + next_delay);
    }

    pub fn record_success(&self, node: &str) {
        self.state.lock().unwrap().retry_delays.remove(node);
    }

    fn schedule(&self, node: &str, deadline: Instant) {
        let mut state = self.state.lock().unwrap();
        state.deadlines.insert(node.into(), deadline);
        state.heap.push(Reverse((deadline, node.into())));
        drop(state);

        // the new deadline may be earlier than what the timer is sleeping on
        self.notify.notify_one();
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut state = self.state.lock().unwrap();
        while let Some(Reverse((deadline, node))) = state.heap.peek().cloned() {
            if state.deadlines.get(&node) == Some(&deadline) {
                return Some(deadline);
            }
            state.heap.pop();
        }
        None
    }

    fn take_due(&self, now: Instant) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let mut due = vec![];
        while let Some(Reverse((deadline, node))) = state.heap.peek().cloned() {
            if state.deadlines.get(&node) != Some(&deadline) {
                state.heap.pop();
                continue;
            }
            if deadline > now {
                break;
            }
            state.heap.pop();
            state.deadlines.remove(&node);
            due.push(node);
        }
        due
    }

    pub async fn run<F: Fn(String)>(&self, token: CancellationToken, submit: F) {
        debug!("heartbeat scheduler running with interval {:?}", self.interval);
        loop {
            let maybe_deadline = self.next_deadline();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.notify.notified() => (),  // deadlines changed, re-peek
                _ = async {
                    match maybe_deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    // the whole due set is dequeued before any member of it
                    // gets its next deadline
                    let due = self.take_due(Instant::now());
                    for node in &due {
                        submit(node.clone());
                    }
                    for node in due {
                        self.schedule(&node, Instant::now() + jittered(self.interval, HEARTBEAT_JITTER));
                    }
                },
            }
        }
    }
}
