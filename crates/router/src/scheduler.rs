// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Single binary-heap-backed timer service. Drives queue TTL
//! expiry, ephemeral-rule expiry, the originator mirror grace period, and
//! the completion queue's delayed retries — all of them reduce to
//! "fire this event at this instant."

use ksi_core::{Event, TimerId};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct Timer {
    id: TimerId,
    at: Instant,
    event: Event,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}
impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    /// Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline.
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

pub enum SchedulerCommand {
    Schedule { id: TimerId, at: Instant, event: Event },
    Cancel { id: TimerId },
}

/// Handle used to schedule or cancel timers from anywhere in the runtime.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn schedule_once(&self, at: Instant, event: Event) -> TimerId {
        let id = TimerId::new();
        let _ = self.commands.send(SchedulerCommand::Schedule { id: id.clone(), at, event });
        id
    }

    pub fn schedule_after(&self, delay: Duration, event: Event) -> TimerId {
        self.schedule_once(Instant::now() + delay, event)
    }

    pub fn cancel(&self, id: TimerId) {
        let _ = self.commands.send(SchedulerCommand::Cancel { id });
    }
}

/// Runs the timer loop. Construct with [`Scheduler::new`], obtain a
/// [`SchedulerHandle`] with [`Scheduler::handle`], then drive with
/// [`Scheduler::run`] on a dedicated task; fired events arrive on `fired`.
pub struct Scheduler {
    heap: BinaryHeap<Timer>,
    cancelled: std::collections::HashSet<TimerId>,
    commands_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
    commands_tx: mpsc::UnboundedSender<SchedulerCommand>,
    fired: mpsc::UnboundedSender<Event>,
}

impl Scheduler {
    pub fn new(fired: mpsc::UnboundedSender<Event>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self { heap: BinaryHeap::new(), cancelled: std::collections::HashSet::new(), commands_rx, commands_tx, fired }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle { commands: self.commands_tx.clone() }
    }

    /// Runs until the command channel closes (all handles dropped).
    pub async fn run(mut self) {
        loop {
            let sleep = match self.heap.peek() {
                Some(next) => tokio::time::sleep_until(tokio::time::Instant::from_std(next.at)),
                None => tokio::time::sleep(Duration::from_secs(3600)),
            };
            tokio::pin!(sleep);

            tokio::select! {
                () = &mut sleep, if self.heap.peek().is_some() => {
                    self.fire_ready();
                }
                cmd = self.commands_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Schedule { id, at, event }) => {
                            self.heap.push(Timer { id, at, event });
                        }
                        Some(SchedulerCommand::Cancel { id }) => {
                            self.cancelled.insert(id);
                        }
                        None => return,
                    }
                }
            }
        }
    }

    fn fire_ready(&mut self) {
        let now = Instant::now();
        while let Some(next) = self.heap.peek() {
            if next.at > now {
                break;
            }
            #[allow(clippy::expect_used)]
            let timer = self.heap.pop().expect("peeked Some above");
            if self.cancelled.remove(&timer.id) {
                continue;
            }
            let _ = self.fired.send(timer.event);
        }
    }
}
