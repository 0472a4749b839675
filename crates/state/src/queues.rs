// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Durable async-state queues: push/pop/peek/expire over
//! [`ksi_core::QueueEntity`], backed by the same WAL-plus-snapshot
//! mechanism as [`crate::entity_store`].

use std::collections::HashMap;

use ksi_core::{QueueEntity, QueueItem};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::StateError;
use crate::snapshot::SnapshotStore;
use crate::wal::Wal;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct QueueState {
    queues: HashMap<String, QueueEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
enum WalRecord {
    Push { queue_id: String, namespace: String, key: String, item: QueueItem, now_ms: u64 },
    Pop { queue_id: String },
    SetTtl { queue_id: String, deadline_ms: Option<u64> },
    Expire { queue_id: String },
}

pub struct QueueStore {
    wal: Wal,
    snapshot: SnapshotStore,
    state: Mutex<QueueState>,
}

impl QueueStore {
    pub fn open(wal_path: impl AsRef<Path>, snapshot_path: impl AsRef<Path>) -> Result<Self, StateError> {
        let wal = Wal::open(wal_path)?;
        let snapshot = SnapshotStore::new(snapshot_path.as_ref().to_path_buf());

        let (mut state, after_seq) = match snapshot.load::<QueueState>()? {
            Some((state, seq)) => (state, seq),
            None => (QueueState::default(), 0),
        };
        for (_, record) in wal.replay_after::<WalRecord>(after_seq)? {
            apply(&mut state, record);
        }
        Ok(Self { wal, snapshot, state: Mutex::new(state) })
    }

    /// Append `data` to the tail of `namespace:key`'s queue, creating it if
    /// absent.
    pub fn push(&self, namespace: &str, key: &str, data: Value, now_ms: u64) -> Result<String, StateError> {
        let queue_id = ksi_core::queue::queue_id(namespace, key);
        let item = QueueItem { data, pushed_at_ms: now_ms };
        self.wal.append(&WalRecord::Push { queue_id: queue_id.clone(), namespace: namespace.to_string(), key: key.to_string(), item: item.clone(), now_ms })?;
        let mut state = self.state.lock();
        let entry = state.queues.entry(queue_id.clone()).or_insert_with(|| QueueEntity::new(namespace, key, now_ms));
        entry.items.push(item);
        Ok(queue_id)
    }

    /// Remove and return the item at the head of the queue, pruning the
    /// entity once it's empty and has no pending TTL.
    pub fn pop(&self, queue_id: &str) -> Result<Option<QueueItem>, StateError> {
        let popped = {
            let mut state = self.state.lock();
            let Some(entry) = state.queues.get_mut(queue_id) else { return Ok(None) };
            let popped = if entry.items.is_empty() { None } else { Some(entry.items.remove(0)) };
            if !entry.should_exist() {
                state.queues.remove(queue_id);
            }
            popped
        };
        if popped.is_some() {
            self.wal.append(&WalRecord::Pop { queue_id: queue_id.to_string() })?;
        }
        Ok(popped)
    }

    pub fn peek(&self, queue_id: &str, limit: usize) -> Vec<QueueItem> {
        self.state.lock().queues.get(queue_id).map(|q| q.items.iter().take(limit).cloned().collect()).unwrap_or_default()
    }

    pub fn set_ttl(&self, namespace: &str, key: &str, deadline_ms: Option<u64>, now_ms: u64) -> Result<(), StateError> {
        let queue_id = ksi_core::queue::queue_id(namespace, key);
        self.wal.append(&WalRecord::SetTtl { queue_id: queue_id.clone(), deadline_ms })?;
        let mut state = self.state.lock();
        let entry = state.queues.entry(queue_id.clone()).or_insert_with(|| QueueEntity::new(namespace, key, now_ms));
        entry.ttl_deadline_ms = deadline_ms;
        if !entry.should_exist() {
            state.queues.remove(&queue_id);
        }
        Ok(())
    }

    /// Drop every queue whose TTL deadline has passed, returning the ids
    /// removed. Intended to run on the same cadence as scheduler ticks.
    pub fn expire_due(&self, now_ms: u64) -> Result<Vec<String>, StateError> {
        let due: Vec<String> = {
            let state = self.state.lock();
            state
                .queues
                .values()
                .filter(|q| q.ttl_deadline_ms.is_some_and(|deadline| deadline <= now_ms))
                .map(|q| q.queue_id.clone())
                .collect()
        };
        for queue_id in &due {
            self.wal.append(&WalRecord::Expire { queue_id: queue_id.clone() })?;
            self.state.lock().queues.remove(queue_id);
        }
        Ok(due)
    }

    pub fn checkpoint(&self) -> Result<(), StateError> {
        let state = self.state.lock().clone();
        let seq = self.wal.current_seq();
        self.snapshot.write(&state, seq)?;
        self.wal.truncate()?;
        Ok(())
    }
}

fn apply(state: &mut QueueState, record: WalRecord) {
    match record {
        WalRecord::Push { queue_id, namespace, key, item, now_ms } => {
            let entry = state.queues.entry(queue_id).or_insert_with(|| QueueEntity::new(namespace, key, now_ms));
            entry.items.push(item);
        }
        WalRecord::Pop { queue_id } => {
            if let Some(entry) = state.queues.get_mut(&queue_id) {
                if !entry.items.is_empty() {
                    entry.items.remove(0);
                }
                if !entry.should_exist() {
                    state.queues.remove(&queue_id);
                }
            }
        }
        WalRecord::SetTtl { queue_id, deadline_ms } => {
            if let Some(entry) = state.queues.get_mut(&queue_id) {
                entry.ttl_deadline_ms = deadline_ms;
                if !entry.should_exist() {
                    state.queues.remove(&queue_id);
                }
            }
        }
        WalRecord::Expire { queue_id } => {
            state.queues.remove(&queue_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn push_then_pop_is_fifo() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path().join("wal.jsonl"), dir.path().join("snap.json")).unwrap();
        let id = store.push("pubsub", "s1", serde_json::json!(1), 0).unwrap();
        store.push("pubsub", "s1", serde_json::json!(2), 1).unwrap();
        assert_eq!(store.pop(&id).unwrap().unwrap().data, serde_json::json!(1));
        assert_eq!(store.pop(&id).unwrap().unwrap().data, serde_json::json!(2));
        assert!(store.pop(&id).unwrap().is_none());
    }

    #[test]
    fn empty_queue_without_ttl_is_pruned_after_pop() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path().join("wal.jsonl"), dir.path().join("snap.json")).unwrap();
        let id = store.push("ns", "k", serde_json::json!(1), 0).unwrap();
        store.pop(&id).unwrap();
        assert!(store.peek(&id, 10).is_empty());
    }

    #[test]
    fn expire_due_removes_only_past_deadline_queues() {
        let dir = tempdir().unwrap();
        let store = QueueStore::open(dir.path().join("wal.jsonl"), dir.path().join("snap.json")).unwrap();
        store.set_ttl("ns", "expiring", Some(100), 0).unwrap();
        store.set_ttl("ns", "fresh", Some(10_000), 0).unwrap();
        let expired = store.expire_due(500).unwrap();
        assert_eq!(expired, vec![ksi_core::queue::queue_id("ns", "expiring")]);
    }

    #[test]
    fn checkpoint_then_reopen_preserves_queue_contents() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("wal.jsonl");
        let snap_path = dir.path().join("snap.json");
        let id;
        {
            let store = QueueStore::open(&wal_path, &snap_path).unwrap();
            id = store.push("ns", "k", serde_json::json!("x"), 0).unwrap();
            store.checkpoint().unwrap();
        }
        let reopened = QueueStore::open(&wal_path, &snap_path).unwrap();
        assert_eq!(reopened.peek(&id, 1)[0].data, serde_json::json!("x"));
    }
}
