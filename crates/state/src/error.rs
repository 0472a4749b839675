// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Error taxonomy for write-ahead logging, snapshotting, and rule-file
//! persistence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse rule file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("record at offset {0} is corrupt and was skipped during recovery")]
    CorruptRecord(u64),
    #[error("no entity found with id {0:?}")]
    UnknownEntity(String),
    #[error("no rule file found for rule id {0:?}")]
    UnknownRule(String),
}
