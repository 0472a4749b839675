// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! ksid: the KSI event runtime daemon. Wires the pattern-matching router,
//! the transformer engine, the originator streaming layer, the per-agent
//! completion queue, and durable async-state/rule persistence behind one
//! Unix-domain socket.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod api;
pub mod env;
pub mod lifecycle;
pub mod listener;

pub use api::Api;
pub use lifecycle::{Config, LifecycleError};
