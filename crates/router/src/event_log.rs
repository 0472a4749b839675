// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The batched, bounded event log behind `monitor:get_events` and
//! `monitor:subscribe_stream`. Durable event history
//! lives in `ksi-state`'s append-only log; this is the router's
//! in-memory read cache plus live-tail broadcast, refreshed on every
//! dispatch.

use async_trait::async_trait;
use ksi_core::Event;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::broadcast;

#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: Event);
    async fn tail(&self, limit: usize) -> Vec<Event>;
}

/// Bounded in-memory ring buffer of recently dispatched events, with a
/// broadcast channel for live tailing. Oldest entries are dropped once
/// `capacity` is exceeded; `monitor:get_events` only ever sees a bounded
/// tail, by design.
pub struct BoundedEventLog {
    buffer: Mutex<VecDeque<Event>>,
    capacity: usize,
    live: broadcast::Sender<Event>,
}

impl BoundedEventLog {
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(capacity.max(16));
        Self { buffer: Mutex::new(VecDeque::with_capacity(capacity)), capacity, live }
    }

    /// Subscribe to the live tail, as used by `monitor:subscribe_stream`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.live.subscribe()
    }
}

#[async_trait]
impl EventLog for BoundedEventLog {
    async fn append(&self, event: Event) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }
        // Best-effort: no live subscribers is not an error.
        let _ = self.live.send(event);
    }

    async fn tail(&self, limit: usize) -> Vec<Event> {
        let buffer = self.buffer.lock();
        buffer.iter().rev().take(limit).rev().cloned().collect()
    }
}
