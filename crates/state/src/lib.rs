// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! ksi-state: durable storage for the event runtime — entity/event
//! tables, async-state queues, and routing-rule persistence, all backed
//! by a hand-rolled write-ahead-log-plus-snapshot mechanism rather than
//! an external database (see DESIGN.md).

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod entity_store;
pub mod error;
pub mod queues;
pub mod rules;
pub mod snapshot;
pub mod wal;

pub use entity_store::{EntityRecord, EntityStore, EventRecord};
pub use error::StateError;
pub use queues::QueueStore;
pub use rules::{LoadedRule, ReloadDiff, RuleStore};
pub use snapshot::SnapshotStore;
pub use wal::Wal;
