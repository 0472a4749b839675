// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Correlation context (`_ksi_context`) that propagates with every event.

use crate::ids::{AgentId, EventId};
use serde::{Deserialize, Serialize};

/// Default hop-count cap before an event is dropped with `error:validation`.
pub const DEFAULT_MAX_DEPTH: u32 = 32;

/// Who originated a causal chain, and where downstream events should be
/// mirrored back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginatorKind {
    Agent,
    External,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Originator {
    pub kind: OriginatorKind,
    pub id: String,
    /// Event name to stream chain results to, e.g. `completion:async`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_path: Option<String>,
}

impl Originator {
    pub fn system() -> Self {
        Self { kind: OriginatorKind::System, id: "system".to_string(), return_path: None }
    }

    pub fn external(id: impl Into<String>, return_path: Option<String>) -> Self {
        Self { kind: OriginatorKind::External, id: id.into(), return_path }
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self { kind: OriginatorKind::Agent, id: id.into(), return_path: None }
    }
}

/// One `(event_name, component)` hop recorded for observability and loop
/// prevention. `component` is either `"transformer:{rule_id}"` or
/// `"handler:{handler_id}"`.
pub type TraceEntry = (String, String);

/// Correlation context embedded in every event as `_ksi_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,
    pub chain_id: EventId,
    pub originator: Originator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub depth: u32,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

impl Context {
    /// Start a new chain at the root event. Used when an event arrives
    /// without an existing `_ksi_context`.
    pub fn root(originator: Originator) -> Self {
        let event_id = EventId::new();
        Self { chain_id: event_id, event_id, parent_event_id: None, originator, agent_id: None, depth: 0, trace: Vec::new() }
    }

    /// Derive the context for a new event emitted as a consequence of this
    /// one. Inherits `chain_id` and `originator`, increments `depth`, and
    /// appends `hop` to the trace.
    pub fn child(&self, hop: TraceEntry, agent_id: Option<AgentId>) -> Self {
        let mut trace = self.trace.clone();
        trace.push(hop);
        Self {
            event_id: EventId::new(),
            parent_event_id: Some(self.event_id),
            chain_id: self.chain_id,
            originator: self.originator.clone(),
            agent_id: agent_id.or(self.agent_id),
            depth: self.depth + 1,
            trace,
        }
    }

    /// Has `rule_id` already fired somewhere along this event's causal
    /// history? Used by the transformer engine's trace-based loop guard.
    pub fn rule_already_applied(&self, rule_id: &str) -> bool {
        let needle = format!("transformer:{rule_id}");
        self.trace.iter().any(|(_, component)| component == &needle)
    }

    pub fn exceeds_depth(&self, max_depth: u32) -> bool {
        self.depth > max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_context_has_no_parent_and_is_its_own_chain() {
        let ctx = Context::root(Originator::system());
        assert!(ctx.parent_event_id.is_none());
        assert_eq!(ctx.chain_id, ctx.event_id);
        assert_eq!(ctx.depth, 0);
    }

    #[test]
    fn child_context_inherits_chain_and_increments_depth() {
        let root = Context::root(Originator::external("client-1", Some("stream:c1".into())));
        let child = root.child(("agent:progress".into(), "handler:h1".into()), None);
        assert_eq!(child.chain_id, root.chain_id);
        assert_eq!(child.parent_event_id, Some(root.event_id));
        assert_eq!(child.depth, 1);
        assert_eq!(child.originator, root.originator);
        assert_eq!(child.trace.len(), 1);
    }

    #[test]
    fn rule_already_applied_detects_self_in_trace() {
        let root = Context::root(Originator::system());
        let child = root.child(("ns:a".into(), "transformer:r1".into()), None);
        assert!(child.rule_already_applied("r1"));
        assert!(!child.rule_already_applied("r2"));
    }

    #[test]
    fn depth_cap_is_enforced_by_comparison() {
        let ctx = Context { depth: 33, ..Context::root(Originator::system()) };
        assert!(ctx.exceeds_depth(DEFAULT_MAX_DEPTH));
    }
}
