// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Three bounded priority lanes — high, normal, low — the dispatch loop
//! drains in strict priority order.

use ksi_core::Event;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

pub const DEFAULT_HIGH_CAPACITY: usize = 1_000;
pub const DEFAULT_NORMAL_CAPACITY: usize = 10_000;
pub const DEFAULT_LOW_CAPACITY: usize = 50_000;

/// How long `send` blocks on a full lane before giving up: callers get
/// `error:queue_full` rather than blocking forever.
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum LaneError {
    #[error("lane at capacity after waiting for a free slot")]
    QueueFull,
    #[error("lane receiver has been dropped")]
    Closed,
}

pub struct Lanes {
    high: (mpsc::Sender<Event>, mpsc::Receiver<Event>),
    normal: (mpsc::Sender<Event>, mpsc::Receiver<Event>),
    low: (mpsc::Sender<Event>, mpsc::Receiver<Event>),
    enqueue_timeout: Duration,
}

/// Cloneable handle used by anything that only needs to push events in,
/// e.g. the listener's per-connection tasks and the transformer engine.
#[derive(Clone)]
pub struct LaneSender {
    high: mpsc::Sender<Event>,
    normal: mpsc::Sender<Event>,
    low: mpsc::Sender<Event>,
    enqueue_timeout: Duration,
}

impl Lanes {
    pub fn new(high_capacity: usize, normal_capacity: usize, low_capacity: usize, enqueue_timeout: Duration) -> Self {
        Self {
            high: mpsc::channel(high_capacity),
            normal: mpsc::channel(normal_capacity),
            low: mpsc::channel(low_capacity),
            enqueue_timeout,
        }
    }

    pub fn sender(&self) -> LaneSender {
        LaneSender {
            high: self.high.0.clone(),
            normal: self.normal.0.clone(),
            low: self.low.0.clone(),
            enqueue_timeout: self.enqueue_timeout,
        }
    }

    /// Drain the highest-priority lane with a pending event; `None` once
    /// every lane's sender side has been dropped and all are empty.
    pub async fn recv(&mut self) -> Option<Event> {
        tokio::select! {
            biased;
            Some(ev) = self.high.1.recv() => Some(ev),
            Some(ev) = self.normal.1.recv() => Some(ev),
            Some(ev) = self.low.1.recv() => Some(ev),
            else => None,
        }
    }
}

impl LaneSender {
    pub async fn send(&self, priority: Priority, event: Event) -> Result<(), LaneError> {
        let sender = match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        };
        match timeout(self.enqueue_timeout, sender.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LaneError::Closed),
            Err(_) => Err(LaneError::QueueFull),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksi_core::{Context, Originator};

    fn sample_event(name: &str) -> Event {
        Event::new(name, serde_json::json!({}), Context::root(Originator::system()), 0).unwrap()
    }

    #[tokio::test]
    async fn high_priority_drains_before_normal() {
        let mut lanes = Lanes::new(4, 4, 4, Duration::from_millis(50));
        let sender = lanes.sender();
        sender.send(Priority::Normal, sample_event("ns:a")).await.unwrap();
        sender.send(Priority::High, sample_event("ns:b")).await.unwrap();
        let first = lanes.recv().await.unwrap();
        assert_eq!(first.name, "ns:b");
    }

    #[tokio::test]
    async fn full_lane_times_out_with_queue_full() {
        let mut lanes = Lanes::new(1, 1, 1, Duration::from_millis(20));
        let sender = lanes.sender();
        sender.send(Priority::High, sample_event("ns:a")).await.unwrap();
        let result = sender.send(Priority::High, sample_event("ns:b")).await;
        assert!(matches!(result, Err(LaneError::QueueFull)));
        lanes.recv().await;
    }
}
