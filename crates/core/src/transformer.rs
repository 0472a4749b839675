// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Declarative routing rule (transformer) data model. The recursive-descent
//! condition parser and the compiled mapping template tree live in
//! `ksi-router::transformer`; this module only defines the wire/storage
//! shape of a rule, shared by the router and the persistence layer.

use crate::ids::RuleId;
use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceClass {
    /// Shipped with the binary, loaded from `routes/system/**/*.yaml`.
    System,
    /// YAML-backed, loaded from `routes/persistent/{namespace}/{rule_id}.yaml`.
    Persistent,
    /// State-store-only, TTL'd.
    Ephemeral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentScope {
    /// e.g. `"agent"`, `"subscription"`, `"workflow"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// One routing target: the event to synthesize, its mapping template, and
/// an optional per-target condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub event: String,
    pub mapping: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// A declarative routing rule, as registered by `routing:add_rule` or
/// loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformer {
    pub rule_id: RuleId,
    pub source_pattern: Pattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub r#async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_scope: Option<ParentScope>,
    pub persistence_class: PersistenceClass,
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Event-name patterns this rule's own emissions must never match,
    /// required for universal (`*`/`**`) source patterns that would
    /// otherwise self-match.
    #[serde(default)]
    pub exclude_patterns: Vec<Pattern>,
    /// Declares that this rule is safe to register with a universal
    /// source pattern even without `exclude_patterns`, because its
    /// author has reasoned about the recursion themselves.
    #[serde(default)]
    pub loop_safe: bool,
}

fn default_priority() -> i32 {
    100
}

impl Transformer {
    /// Targets whose event name this rule's own `exclude_patterns` do not
    /// cover — the set that must be checked against the source pattern for
    /// self-matching.
    pub fn unguarded_targets(&self) -> Vec<&Target> {
        self.targets
            .iter()
            .filter(|t| !self.exclude_patterns.iter().any(|p| p.matches(&t.event)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transformer {
        Transformer {
            rule_id: RuleId::from_string("rul-test"),
            source_pattern: Pattern::new("*"),
            condition: None,
            targets: vec![Target { event: "monitor:broadcast".into(), mapping: serde_json::json!({}), condition: None }],
            r#async: true,
            ttl_seconds: None,
            parent_scope: None,
            persistence_class: PersistenceClass::Ephemeral,
            priority: 100,
            exclude_patterns: vec![],
            loop_safe: false,
        }
    }

    #[test]
    fn unguarded_targets_reports_uncovered_targets() {
        let t = sample();
        assert_eq!(t.unguarded_targets().len(), 1);
    }

    #[test]
    fn exclude_pattern_removes_target_from_unguarded_set() {
        let mut t = sample();
        t.exclude_patterns.push(Pattern::new("monitor:broadcast"));
        assert!(t.unguarded_targets().is_empty());
    }
}
