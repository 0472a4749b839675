// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Compiled mapping template tree: compiled once at rule load, never
//! re-parsed per event. A rule's `targets[].mapping` JSON
//! value is compiled into a [`Template`] at `routing:add_rule` time; each
//! firing only walks the compiled tree.
//!
//! Placeholder forms recognized inside string leaves:
//!   `{{$}}` / `{{__all__}}`        — the whole source event `data` value
//!   `{{__source_event__}}`        — the source event's name
//!   `{{_ksi_context.depth}}`      — a field of the source context
//!   `{{foo.bar}}`                 — a dotted path into `data`
//!   `{{foo.bar|default text}}`    — fallback literal when the path is
//!                                   missing or null
//!   `{{len(foo)}}`                — a whitelisted function call
//!
//! A leaf string that is *exactly* one placeholder renders to the
//! placeholder's native value (object, array, number, ...); a leaf string
//! containing a placeholder alongside other text renders by stringifying
//! each placeholder and splicing it into the surrounding text.

use serde_json::Value;
use thiserror::Error;

use super::condition::ConditionError;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Condition(#[from] ConditionError),
}

#[derive(Debug, Clone)]
pub enum Template {
    Literal(Value),
    Placeholder(PlaceholderSource, Option<Value>),
    Object(Vec<(String, Template)>),
    Array(Vec<Template>),
    /// A string leaf containing one or more placeholders interspersed
    /// with literal text; rendered by string interpolation.
    Interpolated(Vec<InterpPart>),
}

#[derive(Debug, Clone)]
pub enum InterpPart {
    Text(String),
    Placeholder(PlaceholderSource, Option<Value>),
}

#[derive(Debug, Clone)]
pub enum PlaceholderSource {
    /// `$` / `__all__`: the whole source `data` value.
    All,
    /// `__source_event__`: the source event's name.
    SourceEvent,
    /// A dotted path, `_ksi_context`-rooted or `data`-rooted.
    Path(Vec<String>),
    /// A whitelisted function call over nested placeholder expressions.
    Call(String, Vec<PlaceholderSource>),
}

/// Render-time inputs: the source event's name, `data`, and context value.
pub struct RenderEnv<'a> {
    pub source_event_name: &'a str,
    pub data: &'a Value,
    pub context: &'a Value,
    pub now_epoch_ms: u64,
}

pub fn compile(value: &Value) -> Template {
    match value {
        Value::Object(map) => Template::Object(map.iter().map(|(k, v)| (k.clone(), compile(v))).collect()),
        Value::Array(items) => Template::Array(items.iter().map(compile).collect()),
        Value::String(s) => compile_string(s),
        other => Template::Literal(other.clone()),
    }
}

fn compile_string(s: &str) -> Template {
    let placeholders = find_placeholders(s);
    if placeholders.is_empty() {
        return Template::Literal(Value::String(s.to_string()));
    }
    if placeholders.len() == 1 && placeholders[0].0 == 0 && placeholders[0].1 == s.len() {
        let (source, default) = compile_placeholder_body(placeholders[0].2);
        return Template::Placeholder(source, default);
    }
    let mut parts = Vec::new();
    let mut cursor = 0;
    for (start, end, body) in placeholders {
        if start > cursor {
            parts.push(InterpPart::Text(s[cursor..start].to_string()));
        }
        let (source, default) = compile_placeholder_body(body);
        parts.push(InterpPart::Placeholder(source, default));
        cursor = end;
    }
    if cursor < s.len() {
        parts.push(InterpPart::Text(s[cursor..].to_string()));
    }
    Template::Interpolated(parts)
}

/// Returns `(match_start, match_end, inner_body)` for every `{{...}}` span.
fn find_placeholders(s: &str) -> Vec<(usize, usize, &str)> {
    let mut out = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            if let Some(close) = s[i + 2..].find("}}") {
                let body_start = i + 2;
                let body_end = body_start + close;
                out.push((i, body_end + 2, s[body_start..body_end].trim()));
                i = body_end + 2;
                continue;
            }
        }
        i += 1;
    }
    out
}

fn compile_placeholder_body(body: &str) -> (PlaceholderSource, Option<Value>) {
    let (expr, default) = match body.split_once('|') {
        Some((e, d)) => (e.trim(), Some(Value::String(d.trim().to_string()))),
        None => (body, None),
    };
    (compile_placeholder_expr(expr), default)
}

fn compile_placeholder_expr(expr: &str) -> PlaceholderSource {
    if expr == "$" || expr == "__all__" {
        return PlaceholderSource::All;
    }
    if expr == "__source_event__" {
        return PlaceholderSource::SourceEvent;
    }
    if let Some(open) = expr.find('(') {
        if expr.ends_with(')') {
            let name = expr[..open].trim().to_string();
            let args_str = &expr[open + 1..expr.len() - 1];
            let args = if args_str.trim().is_empty() {
                Vec::new()
            } else {
                args_str.split(',').map(|a| compile_placeholder_expr(a.trim())).collect()
            };
            return PlaceholderSource::Call(name, args);
        }
    }
    PlaceholderSource::Path(expr.split('.').map(str::to_string).collect())
}

fn resolve_placeholder(source: &PlaceholderSource, env: &RenderEnv) -> Value {
    match source {
        PlaceholderSource::All => env.data.clone(),
        PlaceholderSource::SourceEvent => Value::String(env.source_event_name.to_string()),
        PlaceholderSource::Path(segments) => resolve_path(segments, env),
        PlaceholderSource::Call(name, args) => {
            let values: Vec<Value> = args.iter().map(|a| resolve_placeholder(a, env)).collect();
            super::functions::call(name, &values, env.now_epoch_ms).unwrap_or(Value::Null)
        }
    }
}

fn resolve_path(segments: &[String], env: &RenderEnv) -> Value {
    let (mut cursor, rest): (&Value, &[String]) = match segments.first().map(String::as_str) {
        Some("_ksi_context") => (env.context, &segments[1..]),
        Some("data") => (env.data, &segments[1..]),
        _ => (env.data, segments),
    };
    for seg in rest {
        cursor = match cursor.get(seg) {
            Some(v) => v,
            None => return Value::Null,
        };
    }
    cursor.clone()
}

fn value_to_display_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render the compiled template against `env`. Pure and total: a missing
/// path renders `null` (or the placeholder's `|default`), never an error.
pub fn render(template: &Template, env: &RenderEnv) -> Value {
    match template {
        Template::Literal(v) => v.clone(),
        Template::Placeholder(source, default) => {
            let v = resolve_placeholder(source, env);
            match (&v, default) {
                (Value::Null, Some(d)) => d.clone(),
                _ => v,
            }
        }
        Template::Object(fields) => {
            let mut map = serde_json::Map::new();
            for (k, v) in fields {
                map.insert(k.clone(), render(v, env));
            }
            Value::Object(map)
        }
        Template::Array(items) => Value::Array(items.iter().map(|t| render(t, env)).collect()),
        Template::Interpolated(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    InterpPart::Text(t) => out.push_str(t),
                    InterpPart::Placeholder(source, default) => {
                        let v = resolve_placeholder(source, env);
                        let v = match (&v, default) {
                            (Value::Null, Some(d)) => d.clone(),
                            _ => v,
                        };
                        out.push_str(&value_to_display_string(&v));
                    }
                }
            }
            Value::String(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_json(mapping: &Value, data: &Value) -> Value {
        let template = compile(mapping);
        let env = RenderEnv { source_event_name: "ns:source", data, context: &Value::Null, now_epoch_ms: 1000 };
        render(&template, &env)
    }

    #[test]
    fn whole_placeholder_renders_native_type() {
        let mapping = serde_json::json!({"payload": "{{$}}"});
        let data = serde_json::json!({"a": 1, "b": [1, 2]});
        let rendered = render_json(&mapping, &data);
        assert_eq!(rendered["payload"], data);
    }

    #[test]
    fn dotted_path_navigates_nested_objects() {
        let mapping = serde_json::json!({"name": "{{user.name}}"});
        let data = serde_json::json!({"user": {"name": "ada"}});
        assert_eq!(render_json(&mapping, &data)["name"], "ada");
    }

    #[test]
    fn default_fallback_used_when_path_missing() {
        let mapping = serde_json::json!({"name": "{{user.name|anonymous}}"});
        let data = serde_json::json!({});
        assert_eq!(render_json(&mapping, &data)["name"], "anonymous");
    }

    #[test]
    fn interpolation_mixes_literal_text_and_placeholders() {
        let mapping = serde_json::json!({"message": "hello {{user.name}}!"});
        let data = serde_json::json!({"user": {"name": "grace"}});
        assert_eq!(render_json(&mapping, &data)["message"], "hello grace!");
    }

    #[test]
    fn source_event_placeholder_resolves_to_event_name() {
        let mapping = serde_json::json!({"from": "{{__source_event__}}"});
        let rendered = render_json(&mapping, &Value::Null);
        assert_eq!(rendered["from"], "ns:source");
    }

    #[test]
    fn function_call_placeholder_is_evaluated() {
        let mapping = serde_json::json!({"count": "{{len(items)}}"});
        let data = serde_json::json!({"items": [1, 2, 3]});
        assert_eq!(render_json(&mapping, &data)["count"], 3);
    }

    #[test]
    fn rendering_never_errors_on_missing_paths_without_default() {
        let mapping = serde_json::json!({"v": "{{nope.nested}}"});
        let rendered = render_json(&mapping, &Value::Null);
        assert_eq!(rendered["v"], Value::Null);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// JSON values whose string leaves never contain `{{`, so `compile`
    /// treats every leaf as a plain literal.
    fn arb_placeholder_free_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| serde_json::json!(n)),
            "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        /// A mapping with no `{{...}}` placeholders renders back to itself
        /// regardless of the data it's rendered against.
        #[test]
        fn placeholder_free_mappings_round_trip(
            mapping in arb_placeholder_free_value(),
            data in arb_placeholder_free_value(),
        ) {
            let template = compile(&mapping);
            let env = RenderEnv { source_event_name: "ns:source", data: &data, context: &Value::Null, now_epoch_ms: 0 };
            prop_assert_eq!(render(&template, &env), mapping);
        }

        /// Rendering is total: no input data shape makes it panic, and a
        /// missing-default placeholder always resolves to `null`.
        #[test]
        fn rendering_is_total_over_arbitrary_data(data in arb_placeholder_free_value()) {
            let mapping = serde_json::json!({"v": "{{a.b.c}}", "echo": "{{$}}"});
            let template = compile(&mapping);
            let env = RenderEnv { source_event_name: "ns:source", data: &data, context: &Value::Null, now_epoch_ms: 0 };
            let rendered = render(&template, &env);
            prop_assert_eq!(rendered["echo"].clone(), data);
        }
    }
}
