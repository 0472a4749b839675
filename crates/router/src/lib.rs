// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! ksi-router: the pattern index, the priority-lane event router, the
//! transformer engine (condition grammar + mapping template grammar),
//! the originator streaming layer, and the timer scheduler.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod event_log;
pub mod handler;
pub mod lanes;
pub mod originator;
pub mod pattern_index;
pub mod router;
pub mod scheduler;
pub mod transformer;

pub use event_log::{BoundedEventLog, EventLog};
pub use handler::{Handler, HandlerError};
pub use lanes::{LaneError, LaneSender, Lanes, Priority};
pub use originator::OriginatorRegistry;
pub use pattern_index::{IndexEntry, PatternIndex};
pub use router::{build, Router, RouterConfig, RouterError, RouterRunner, DEFAULT_HANDLER_TIMEOUT};
pub use scheduler::{Scheduler, SchedulerHandle};
