//! Bus implementation
//!
//! Every subscriber owns a bounded queue with an explicit overflow
//! policy. Delivery is per-producer FIFO: one publisher finishing
//! `publish` before its next call guarantees its events arrive in
//! order at every subscriber. A slow subscriber affects nobody but
//! itself (and, under `Block`, the publisher for at most one buffer).

use super::types::HubEvent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::trace;

/// What to do when a subscriber's buffer is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Publisher waits for space
    #[default]
    Block,
    /// Evict the oldest buffered event
    DropOldest,
    /// Discard the incoming event
    DropNewest,
}

struct Shared {
    queue: Mutex<VecDeque<HubEvent>>,
    capacity: usize,
    policy: DropPolicy,
    data: Notify,
    space: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
    bus_alive: Arc<AtomicBool>,
}

/// A subscriber's end of the bus
pub struct Subscription {
    shared: Arc<Shared>,
}

impl Subscription {
    /// Receive the next event.
    ///
    /// Returns `None` once the bus is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            let notified = self.shared.data.notified();
            {
                let mut queue = self
                    .shared
                    .queue
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                if let Some(event) = queue.pop_front() {
                    self.shared.space.notify_one();
                    return Some(event);
                }
            }
            if !self.shared.bus_alive.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        let mut queue = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        let event = queue.pop_front();
        if event.is_some() {
            self.shared.space.notify_one();
        }
        event
    }

    /// Events this subscription has lost to its drop policy
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        // A publisher blocked on this queue must not wait forever.
        self.shared.space.notify_waiters();
    }
}

/// Bounded, typed publish/subscribe bus
pub struct EventBus {
    subscribers: Mutex<Vec<Arc<Shared>>>,
    default_capacity: usize,
    default_policy: DropPolicy,
    alive: Arc<AtomicBool>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber defaults
    #[must_use]
    pub fn new(default_capacity: usize, default_policy: DropPolicy) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            default_capacity: default_capacity.max(1),
            default_policy,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Subscribe with the bus defaults
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with(self.default_capacity, self.default_policy)
    }

    /// Subscribe with an explicit buffer size and drop policy
    pub fn subscribe_with(&self, capacity: usize, policy: DropPolicy) -> Subscription {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            policy,
            data: Notify::new(),
            space: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            bus_alive: Arc::clone(&self.alive),
        });
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&shared));
        Subscription { shared }
    }

    /// Active subscriber count
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| !s.closed.load(Ordering::Acquire))
            .count()
    }

    /// Publish an event to every live subscriber.
    ///
    /// Enqueueing to one subscriber is independent of the others; an
    /// unresponsive subscriber under `Block` delays only until its
    /// buffer has room or it is dropped.
    pub async fn publish(&self, event: HubEvent) {
        let targets: Vec<Arc<Shared>> = {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subscribers.retain(|s| !s.closed.load(Ordering::Acquire));
            subscribers.clone()
        };
        trace!(event_id = %event.id, subscribers = targets.len(), "Publishing event");

        for shared in targets {
            Self::enqueue(&shared, event.clone()).await;
        }
    }

    async fn enqueue(shared: &Arc<Shared>, event: HubEvent) {
        loop {
            let space = shared.space.notified();
            {
                let mut queue = shared.queue.lock().unwrap_or_else(|e| e.into_inner());
                if shared.closed.load(Ordering::Acquire) {
                    return;
                }
                if queue.len() < shared.capacity {
                    queue.push_back(event);
                    shared.data.notify_one();
                    return;
                }
                match shared.policy {
                    DropPolicy::DropOldest => {
                        queue.pop_front();
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                        queue.push_back(event);
                        shared.data.notify_one();
                        return;
                    }
                    DropPolicy::DropNewest => {
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    DropPolicy::Block => {}
                }
            }
            space.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        for shared in self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            shared.data.notify_waiters();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256, DropPolicy::Block)
    }
}
