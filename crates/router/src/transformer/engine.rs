// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The apply-rule algorithm: given a firing event and a
//! transformer whose source pattern matched it, evaluate the rule
//! condition, then each target's condition, render the matching targets'
//! mapping templates, and derive child events with loop-safe contexts.

use ksi_core::{patterns_could_overlap, Context, Event, NameError, Pattern, Transformer};
use thiserror::Error;

use super::condition::{self, ConditionError, EvalEnv, Expr};
use super::template::{self, RenderEnv, Template};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error(transparent)]
    Name(#[from] NameError),
    #[error("derived event would exceed the maximum causal depth")]
    DepthExceeded,
    #[error("transformer {0:?} has a universal or overlapping source pattern with no loop guard (set loop_safe or add exclude_patterns)")]
    UnsafeRegistration(String),
}

struct CompiledTarget {
    event: String,
    condition: Option<Expr>,
    template: Template,
}

/// A transformer with its condition and mapping templates parsed once at
/// `routing:add_rule` time.
pub struct CompiledTransformer {
    pub transformer: Transformer,
    condition: Option<Expr>,
    targets: Vec<CompiledTarget>,
}

impl CompiledTransformer {
    pub fn rule_id(&self) -> &str {
        self.transformer.rule_id.as_str()
    }

    pub fn source_pattern(&self) -> &Pattern {
        &self.transformer.source_pattern
    }

    pub fn priority(&self) -> i32 {
        self.transformer.priority
    }
}

/// Reject rules that could loop back onto their own source pattern
/// without a declared guard.
pub fn validate_registration(transformer: &Transformer) -> Result<(), EngineError> {
    if transformer.loop_safe {
        return Ok(());
    }
    for target in transformer.unguarded_targets() {
        let target_pattern = Pattern::new(target.event.clone());
        if patterns_could_overlap(&transformer.source_pattern, &target_pattern) {
            return Err(EngineError::UnsafeRegistration(transformer.rule_id.as_str().to_string()));
        }
    }
    Ok(())
}

pub fn compile(transformer: Transformer) -> Result<CompiledTransformer, EngineError> {
    validate_registration(&transformer)?;
    let condition = transformer.condition.as_deref().map(condition::parse).transpose()?;
    let mut targets = Vec::with_capacity(transformer.targets.len());
    for target in &transformer.targets {
        targets.push(CompiledTarget {
            event: target.event.clone(),
            condition: target.condition.as_deref().map(condition::parse).transpose()?,
            template: template::compile(&target.mapping),
        });
    }
    Ok(CompiledTransformer { transformer, condition, targets })
}

/// The outcome of applying a compiled rule to a matching event.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The rule's own condition (and each target's condition) were
    /// evaluated; these are the derived events to enqueue, in
    /// target-declaration order. Empty when every target's condition was
    /// false.
    Derived(Vec<Event>),
    /// This rule id already appears in the event's trace, so the
    /// trace-based loop guard suppressed the application outright. Not
    /// an error, but distinct from an ordinary condition-false non-match
    /// so the caller can report `error:transformer_loop_suppressed`.
    LoopSuppressed,
}

/// Apply a compiled rule to a matching event. See [`ApplyOutcome`] for
/// what an empty result versus a suppressed one means.
pub fn apply(compiled: &CompiledTransformer, event: &Event, max_depth: u32, now_epoch_ms: u64) -> Result<ApplyOutcome, EngineError> {
    if event.context.rule_already_applied(compiled.rule_id()) {
        return Ok(ApplyOutcome::LoopSuppressed);
    }

    let context_value = serde_json::to_value(&event.context).unwrap_or(serde_json::Value::Null);
    let eval_env = EvalEnv { data: &event.data, context: &context_value, now_epoch_ms };

    if let Some(cond) = &compiled.condition {
        if !condition::truthy(&condition::evaluate(cond, &eval_env)?) {
            return Ok(ApplyOutcome::Derived(Vec::new()));
        }
    }

    let mut derived = Vec::new();
    for target in &compiled.targets {
        if let Some(cond) = &target.condition {
            if !condition::truthy(&condition::evaluate(cond, &eval_env)?) {
                continue;
            }
        }

        let render_env = RenderEnv {
            source_event_name: &event.name,
            data: &event.data,
            context: &context_value,
            now_epoch_ms,
        };
        let rendered = template::render(&target.template, &render_env);

        let hop = (target.event.clone(), format!("transformer:{}", compiled.rule_id()));
        let child_context: Context = event.context.child(hop, None);
        if child_context.exceeds_depth(max_depth) {
            return Err(EngineError::DepthExceeded);
        }

        derived.push(Event::new(target.event.clone(), rendered, child_context, now_epoch_ms)?);
    }
    Ok(ApplyOutcome::Derived(derived))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksi_core::{Originator, PersistenceClass, RuleId, Target};

    fn rule(source: &str, target_event: &str, condition: Option<&str>) -> Transformer {
        Transformer {
            rule_id: RuleId::from_string("rul-test"),
            source_pattern: Pattern::new(source),
            condition: condition.map(str::to_string),
            targets: vec![Target { event: target_event.to_string(), mapping: serde_json::json!({"echo": "{{$}}"}), condition: None }],
            r#async: false,
            ttl_seconds: None,
            parent_scope: None,
            persistence_class: PersistenceClass::Ephemeral,
            priority: 100,
            exclude_patterns: vec![],
            loop_safe: false,
        }
    }

    fn sample_event(name: &str, data: serde_json::Value) -> Event {
        Event::new(name, data, Context::root(Originator::system()), 0).unwrap()
    }

    fn derived_events(outcome: ApplyOutcome) -> Vec<Event> {
        match outcome {
            ApplyOutcome::Derived(events) => events,
            ApplyOutcome::LoopSuppressed => panic!("expected Derived, got LoopSuppressed"),
        }
    }

    #[test]
    fn applies_rule_and_renders_target_mapping() {
        let compiled = compile(rule("agent:log", "monitor:mirror", None)).unwrap();
        let event = sample_event("agent:log", serde_json::json!({"text": "hi"}));
        let derived = derived_events(apply(&compiled, &event, 32, 0).unwrap());
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].name, "monitor:mirror");
        assert_eq!(derived[0].data["echo"], event.data);
    }

    #[test]
    fn rule_condition_gates_firing() {
        let compiled = compile(rule("agent:log", "monitor:mirror", Some("level == \"error\""))).unwrap();
        let event = sample_event("agent:log", serde_json::json!({"level": "info"}));
        assert!(derived_events(apply(&compiled, &event, 32, 0).unwrap()).is_empty());
    }

    #[test]
    fn trace_based_loop_guard_skips_reapplication() {
        let compiled = compile(rule("agent:log", "monitor:mirror", None)).unwrap();
        let root = Context::root(Originator::system());
        let already = root.child(("monitor:mirror".into(), "transformer:rul-test".into()), None);
        let event = Event::new("agent:log", serde_json::json!({}), already, 0).unwrap();
        assert!(matches!(apply(&compiled, &event, 32, 0).unwrap(), ApplyOutcome::LoopSuppressed));
    }

    #[test]
    fn universal_source_without_guard_is_rejected_at_registration() {
        let unsafe_rule = rule("*", "monitor:mirror", None);
        assert!(matches!(compile(unsafe_rule), Err(EngineError::UnsafeRegistration(_))));
    }

    #[test]
    fn universal_source_with_exclude_pattern_is_accepted() {
        let mut safe_rule = rule("*", "monitor:mirror", None);
        safe_rule.exclude_patterns.push(Pattern::new("monitor:mirror"));
        assert!(compile(safe_rule).is_ok());
    }

    #[test]
    fn depth_cap_rejects_derived_event() {
        let compiled = compile(rule("agent:log", "monitor:mirror", None)).unwrap();
        let deep_context = Context { depth: 32, ..Context::root(Originator::system()) };
        let event = Event::new("agent:log", serde_json::json!({}), deep_context, 0).unwrap();
        assert!(matches!(apply(&compiled, &event, 32, 0), Err(EngineError::DepthExceeded)));
    }
}
