// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run event substrate (spec.md §4.1).
//!
//! Each subscriber owns a bounded ring buffer behind a `parking_lot::Mutex`
//! rather than sharing a broadcast channel, so a slow subscriber's backlog
//! never forces a drop policy decision onto any other subscriber (Design
//! Note: "written as callbacks and ad-hoc locks ... re-implement as an
//! explicit, tested abstraction with a documented drop policy"). Emitting
//! is fire-and-forget for the default oldest-drop policy; `BlockWithTimeout`
//! is the one policy that can make `emit` wait, by explicit subscriber
//! opt-in.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use warden_core::event::Event;
use warden_core::run::RunId;
use warden_storage::Store;

use crate::error::EngineResult;

/// How a subscriber's ring buffer behaves once it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    /// Discard the oldest buffered event to make room for the new one.
    /// The default for live UI subscribers: recency matters more than
    /// completeness for a tail that's falling behind.
    OldestDrop,
    /// Discard the incoming event, keeping the existing backlog intact.
    NewestDrop,
    /// Wait up to `Duration` for room to free up before falling back to
    /// dropping the incoming event. The one policy that can make `emit`
    /// block; never used by the default daemon wiring.
    BlockWithTimeout(Duration),
}

const DEFAULT_CAPACITY: usize = 100;

struct SubscriberSlot {
    queue: Mutex<VecDeque<Event>>,
    capacity: usize,
    policy: DropPolicy,
    dropped: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriberSlot {
    fn new(capacity: usize, policy: DropPolicy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    async fn deliver(&self, event: Event) {
        match self.policy {
            DropPolicy::OldestDrop => {
                let mut queue = self.queue.lock();
                if queue.len() >= self.capacity {
                    queue.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                queue.push_back(event);
            }
            DropPolicy::NewestDrop => {
                let mut queue = self.queue.lock();
                if queue.len() >= self.capacity {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                queue.push_back(event);
            }
            DropPolicy::BlockWithTimeout(timeout) => {
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    {
                        let mut queue = self.queue.lock();
                        if queue.len() < self.capacity {
                            queue.push_back(event);
                            self.notify.notify_one();
                            return;
                        }
                    }
                    if tokio::time::Instant::now() >= deadline {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

struct BusInner {
    run_id: RunId,
    store: Option<Store>,
    subscribers: Mutex<HashMapU64>,
    next_sub_id: AtomicU64,
    closed: AtomicBool,
    in_memory_sequence: AtomicU64,
}

type HashMapU64 = std::collections::HashMap<u64, Arc<SubscriberSlot>>;

/// A live subscription: a delivery handle plus a cleanup guard. Dropping it
/// deregisters the subscriber from its bus.
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
    slot: Arc<SubscriberSlot>,
}

impl Subscription {
    /// Wait for the next event, or `None` once the bus is closed and the
    /// backlog is drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            if let Some(event) = self.slot.queue.lock().pop_front() {
                return Some(event);
            }
            if self.slot.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.slot.notify.notified().await;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.slot.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.lock().remove(&self.id);
        }
    }
}

/// Per-run event bus: durable append via [`Store`] plus live fan-out to
/// every active [`Subscription`].
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    pub fn new(run_id: RunId, store: Option<Store>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                run_id,
                store,
                subscribers: Mutex::new(HashMapU64::new()),
                next_sub_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                in_memory_sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.inner.run_id
    }

    /// Persist (if a store is configured) and dispatch an event to every
    /// live subscriber. Never fatal: persistence failure is logged and
    /// dispatch proceeds with the in-memory sequence assignment.
    pub async fn emit(&self, mut event: Event) -> Event {
        event.run_id = self.inner.run_id;
        if self.inner.closed.load(Ordering::SeqCst) {
            return event;
        }
        let persisted = match &self.inner.store {
            Some(store) => match store.append_event(event.clone()) {
                Ok(persisted) => persisted,
                Err(err) => {
                    tracing::warn!(run_id = %self.inner.run_id, error = %err, "failed to persist event; dispatching in-memory only");
                    event.sequence = self.inner.in_memory_sequence.fetch_add(1, Ordering::SeqCst) + 1;
                    event
                }
            },
            None => {
                event.sequence = self.inner.in_memory_sequence.fetch_add(1, Ordering::SeqCst) + 1;
                event
            }
        };

        let subs: Vec<Arc<SubscriberSlot>> = self.inner.subscribers.lock().values().cloned().collect();
        for slot in subs {
            slot.deliver(persisted.clone()).await;
        }
        persisted
    }

    /// Subscribe to live events only, starting from whatever is emitted
    /// after this call.
    pub fn subscribe(&self, policy: DropPolicy) -> Subscription {
        self.register(policy)
    }

    /// Subscribe with replay: persisted events with `sequence >= from_seq`
    /// are delivered first (oldest to newest), then live events continue
    /// seamlessly. Registers the live subscription *before* reading
    /// history, then drops any live-delivered duplicate of the historical
    /// tail, so no event is lost or repeated at the handover boundary.
    pub fn subscribe_from(&self, from_seq: u64, policy: DropPolicy) -> EngineResult<Subscription> {
        let subscription = self.register(policy);

        let historical = match &self.inner.store {
            Some(store) => store.list_events_since(self.inner.run_id, from_seq)?,
            None => Vec::new(),
        };

        if !historical.is_empty() {
            let last_historical_seq = historical.last().map(|e| e.sequence).unwrap_or(0);
            let mut queue = subscription.slot.queue.lock();
            queue.retain(|e| e.sequence > last_historical_seq);
            for event in historical.into_iter().rev() {
                queue.push_front(event);
            }
            drop(queue);
            subscription.slot.notify.notify_one();
        }

        Ok(subscription)
    }

    fn register(&self, policy: DropPolicy) -> Subscription {
        let slot = Arc::new(SubscriberSlot::new(DEFAULT_CAPACITY, policy));
        let id = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.lock().insert(id, slot.clone());
        Subscription { bus: Arc::downgrade(&self.inner), id, slot }
    }

    /// Close the bus: every live subscription's `recv()` drains its
    /// backlog then returns `None`. Subsequent `emit` calls are no-ops.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        for slot in self.inner.subscribers.lock().values() {
            slot.close();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
