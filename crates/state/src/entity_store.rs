// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The durable entity/event tables: `entities(id, type,
//! properties_json, created_at, updated_at)` and an append-only
//! `events(id, chain_id, parent_id, name, payload_json, ts)` log.
//! Materialized in memory, backed by [`crate::wal::Wal`] plus periodic
//! [`crate::snapshot::SnapshotStore`] checkpoints.

use std::collections::HashMap;
use std::path::Path;

use ksi_core::EventId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StateError;
use crate::snapshot::SnapshotStore;
use crate::wal::Wal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub entity_type: String,
    pub properties: Value,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub chain_id: EventId,
    pub parent_id: Option<EventId>,
    pub name: String,
    pub payload: Value,
    pub ts_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MaterializedState {
    entities: HashMap<String, EntityRecord>,
    events: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
enum WalRecord {
    PutEntity { entity: EntityRecord },
    DeleteEntity { id: String },
    AppendEvent { event: EventRecord },
}

/// Bound on in-memory event history kept between snapshots; older events
/// roll off once a checkpoint has durably captured them (the append-only
/// log on disk is unbounded, this cache is not).
const MAX_IN_MEMORY_EVENTS: usize = 50_000;

pub struct EntityStore {
    wal: Wal,
    snapshot: SnapshotStore,
    state: Mutex<MaterializedState>,
}

impl EntityStore {
    /// Recover by loading the last snapshot (if any) and replaying WAL
    /// records written after it.
    pub fn open(wal_path: impl AsRef<Path>, snapshot_path: impl AsRef<Path>) -> Result<Self, StateError> {
        let wal = Wal::open(wal_path)?;
        let snapshot = SnapshotStore::new(snapshot_path.as_ref().to_path_buf());

        let (mut state, after_seq) = match snapshot.load::<MaterializedState>()? {
            Some((state, seq)) => (state, seq),
            None => (MaterializedState::default(), 0),
        };

        for (_, record) in wal.replay_after::<WalRecord>(after_seq)? {
            apply_record(&mut state, record);
        }

        Ok(Self { wal, snapshot, state: Mutex::new(state) })
    }

    pub fn put_entity(&self, entity: EntityRecord) -> Result<(), StateError> {
        self.wal.append(&WalRecord::PutEntity { entity: entity.clone() })?;
        self.state.lock().entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    pub fn delete_entity(&self, id: &str) -> Result<(), StateError> {
        self.wal.append(&WalRecord::DeleteEntity { id: id.to_string() })?;
        self.state.lock().entities.remove(id);
        Ok(())
    }

    pub fn get_entity(&self, id: &str) -> Option<EntityRecord> {
        self.state.lock().entities.get(id).cloned()
    }

    pub fn entities_of_type(&self, entity_type: &str) -> Vec<EntityRecord> {
        self.state.lock().entities.values().filter(|e| e.entity_type == entity_type).cloned().collect()
    }

    pub fn append_event(&self, event: EventRecord) -> Result<(), StateError> {
        self.wal.append(&WalRecord::AppendEvent { event: event.clone() })?;
        let mut state = self.state.lock();
        state.events.push(event);
        if state.events.len() > MAX_IN_MEMORY_EVENTS {
            let overflow = state.events.len() - MAX_IN_MEMORY_EVENTS;
            state.events.drain(0..overflow);
        }
        Ok(())
    }

    pub fn tail_events(&self, limit: usize) -> Vec<EventRecord> {
        let state = self.state.lock();
        state.events.iter().rev().take(limit).rev().cloned().collect()
    }

    /// Snapshot the current materialized state and truncate the WAL,
    /// run periodically by the daemon rather than after every write.
    pub fn checkpoint(&self) -> Result<(), StateError> {
        let state = self.state.lock().clone();
        let seq = self.wal.current_seq();
        self.snapshot.write(&state, seq)?;
        self.wal.truncate()?;
        Ok(())
    }
}

fn apply_record(state: &mut MaterializedState, record: WalRecord) {
    match record {
        WalRecord::PutEntity { entity } => {
            state.entities.insert(entity.id.clone(), entity);
        }
        WalRecord::DeleteEntity { id } => {
            state.entities.remove(&id);
        }
        WalRecord::AppendEvent { event } => state.events.push(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksi_core::{Context, Originator};
    use tempfile::tempdir;

    fn sample_event_record(name: &str) -> EventRecord {
        let ctx = Context::root(Originator::system());
        EventRecord { id: ctx.event_id, chain_id: ctx.chain_id, parent_id: None, name: name.to_string(), payload: serde_json::json!({}), ts_ms: 0 }
    }

    #[test]
    fn put_then_get_entity_round_trips() {
        let dir = tempdir().unwrap();
        let store = EntityStore::open(dir.path().join("wal.jsonl"), dir.path().join("snapshot.json")).unwrap();
        store
            .put_entity(EntityRecord { id: "agt-1".into(), entity_type: "agent".into(), properties: serde_json::json!({"name": "a"}), created_at_ms: 0, updated_at_ms: 0 })
            .unwrap();
        let entity = store.get_entity("agt-1").unwrap();
        assert_eq!(entity.properties["name"], "a");
    }

    #[test]
    fn checkpoint_then_reopen_preserves_state() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("wal.jsonl");
        let snapshot_path = dir.path().join("snapshot.json");
        {
            let store = EntityStore::open(&wal_path, &snapshot_path).unwrap();
            store
                .put_entity(EntityRecord { id: "agt-1".into(), entity_type: "agent".into(), properties: serde_json::json!({}), created_at_ms: 0, updated_at_ms: 0 })
                .unwrap();
            store.checkpoint().unwrap();
        }
        let reopened = EntityStore::open(&wal_path, &snapshot_path).unwrap();
        assert!(reopened.get_entity("agt-1").is_some());
    }

    #[test]
    fn tail_events_returns_most_recent_in_order() {
        let dir = tempdir().unwrap();
        let store = EntityStore::open(dir.path().join("wal.jsonl"), dir.path().join("snapshot.json")).unwrap();
        store.append_event(sample_event_record("ns:a")).unwrap();
        store.append_event(sample_event_record("ns:b")).unwrap();
        let tail = store.tail_events(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].name, "ns:b");
    }

    #[test]
    fn uncheckpointed_writes_survive_reopen_via_wal_replay() {
        let dir = tempdir().unwrap();
        let wal_path = dir.path().join("wal.jsonl");
        let snapshot_path = dir.path().join("snapshot.json");
        {
            let store = EntityStore::open(&wal_path, &snapshot_path).unwrap();
            store.append_event(sample_event_record("ns:a")).unwrap();
        }
        let reopened = EntityStore::open(&wal_path, &snapshot_path).unwrap();
        assert_eq!(reopened.tail_events(10).len(), 1);
    }
}
