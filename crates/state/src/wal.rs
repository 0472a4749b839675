// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Append-only, JSON-lines write-ahead log with a separate checkpoint
//! file recording the highest processed sequence number. The daemon's
//! own WAL-plus-snapshot mechanism is reused here for the entity/event
//! tables instead of an external database.
//!
//! Recovery is corruption-tolerant: a truncated or malformed trailing
//! line (the result of a crash mid-write) is logged and dropped rather
//! than failing the whole replay.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::StateError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct WalLine {
    seq: u64,
    record: Value,
}

pub struct Wal {
    path: PathBuf,
    file: Mutex<File>,
    next_seq: AtomicU64,
}

impl Wal {
    /// Open (creating if absent) the log at `path`, replaying existing
    /// lines to determine the next sequence number to assign.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut max_seq = 0u64;
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WalLine>(&line) {
                    Ok(parsed) => max_seq = max_seq.max(parsed.seq),
                    Err(_) => {
                        warn!(line = lineno, path = %path.display(), "skipping corrupt WAL line during recovery");
                    }
                }
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file), next_seq: AtomicU64::new(max_seq + 1) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`, returning the sequence number assigned to it.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<u64, StateError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let line = WalLine { seq, record: serde_json::to_value(record)? };
        let mut json = serde_json::to_string(&line)?;
        json.push('\n');
        let mut file = self.file.lock();
        file.write_all(json.as_bytes())?;
        file.flush()?;
        Ok(seq)
    }

    /// Replay every record with `seq > after_seq`, in order, skipping
    /// unparseable lines rather than aborting.
    pub fn replay_after<T: DeserializeOwned>(&self, after_seq: u64) -> Result<Vec<(u64, T)>, StateError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<WalLine>(&line) else { continue };
            if parsed.seq <= after_seq {
                continue;
            }
            match serde_json::from_value::<T>(parsed.record) {
                Ok(record) => out.push((parsed.seq, record)),
                Err(_) => warn!(seq = parsed.seq, "skipping WAL record with unexpected shape"),
            }
        }
        Ok(out)
    }

    pub fn current_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Truncate the log to empty, used right after a snapshot checkpoint
    /// has durably captured everything written so far.
    pub fn truncate(&self) -> Result<(), StateError> {
        let mut file = self.file.lock();
        *file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        *file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appended_records_replay_in_order() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path().join("log.jsonl")).unwrap();
        wal.append(&serde_json::json!({"a": 1})).unwrap();
        wal.append(&serde_json::json!({"a": 2})).unwrap();
        let replayed: Vec<(u64, Value)> = wal.replay_after(0).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].1["a"], 1);
        assert_eq!(replayed[1].1["a"], 2);
    }

    #[test]
    fn replay_after_skips_already_processed_entries() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path().join("log.jsonl")).unwrap();
        let first_seq = wal.append(&serde_json::json!({"a": 1})).unwrap();
        wal.append(&serde_json::json!({"a": 2})).unwrap();
        let replayed: Vec<(u64, Value)> = wal.replay_after(first_seq).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].1["a"], 2);
    }

    #[test]
    fn reopening_resumes_sequence_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        {
            let wal = Wal::open(&path).unwrap();
            wal.append(&serde_json::json!({"a": 1})).unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        let seq = wal.append(&serde_json::json!({"a": 2})).unwrap();
        assert_eq!(seq, 2);
    }

    #[test]
    fn corrupt_trailing_line_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        {
            let wal = Wal::open(&path).unwrap();
            wal.append(&serde_json::json!({"a": 1})).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{not valid json\n").unwrap();
        }
        let wal = Wal::open(&path).unwrap();
        let seq = wal.append(&serde_json::json!({"a": 2})).unwrap();
        assert_eq!(seq, 2);
    }
}
