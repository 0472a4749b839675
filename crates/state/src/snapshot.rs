// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Periodic snapshot checkpointing: a point-in-time dump of
//! materialized state plus the WAL sequence number it reflects, written
//! atomically (temp file + rename) so a crash mid-write never corrupts
//! the previous good snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StateError;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SnapshotEnvelope<T> {
    wal_seq: u64,
    state: T,
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write `state` atomically, recording `wal_seq` as the point the WAL
    /// can be safely truncated up to.
    pub fn write<T: Serialize>(&self, state: &T, wal_seq: u64) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let envelope = SnapshotEnvelope { wal_seq, state };
        let json = serde_json::to_vec_pretty(&envelope)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Load the last snapshot, if any, and the WAL sequence it reflects.
    /// Recovery replays only WAL records after that sequence.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<(T, u64)>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let envelope: SnapshotEnvelope<T> = serde_json::from_slice(&bytes)?;
        Ok(Some((envelope.state, envelope.wal_seq)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_load_round_trips_state_and_wal_seq() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));
        store.write(&serde_json::json!({"entities": []}), 42).unwrap();
        let (state, seq): (serde_json::Value, u64) = store.load().unwrap().unwrap();
        assert_eq!(seq, 42);
        assert_eq!(state["entities"], serde_json::json!([]));
    }

    #[test]
    fn load_returns_none_when_no_snapshot_exists_yet() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("missing.json"));
        let loaded: Option<(serde_json::Value, u64)> = store.load().unwrap();
        assert!(loaded.is_none());
    }
}
