// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Agent handle as seen by the core runtime.
//!
//! The core treats agents as opaque identities; spawning and terminating
//! them is an external collaborator's job. The router only
//! reacts to `agent:spawned` / `agent:terminated` for scope cleanup.

use crate::ids::AgentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentQuotas {
    #[serde(default)]
    pub max_queue_depth: Option<u32>,
    #[serde(default)]
    pub max_concurrent_calls: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHandle {
    pub id: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_path: Option<String>,
    #[serde(default)]
    pub quotas: AgentQuotas,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AgentId>,
}

impl AgentHandle {
    pub fn new(id: AgentId) -> Self {
        Self { id, return_path: None, quotas: AgentQuotas::default(), parent_id: None }
    }
}
