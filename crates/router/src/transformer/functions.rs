// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Whitelisted functions shared by the condition evaluator and the mapping
//! template renderer: a fixed function whitelist, never an embedded
//! scripting language.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
    #[error("unknown function {0:?}")]
    Unknown(String),
    #[error("{0}() expected {1} argument(s), got {2}")]
    Arity(&'static str, usize, usize),
    #[error("{0}() cannot operate on this value type")]
    BadType(&'static str),
}

pub fn is_known(name: &str) -> bool {
    matches!(name, "timestamp_utc" | "len" | "sum" | "avg" | "startswith" | "contains")
}

pub fn call(name: &str, args: &[Value], now_epoch_ms: u64) -> Result<Value, FunctionError> {
    match name {
        "timestamp_utc" => {
            if !args.is_empty() {
                return Err(FunctionError::Arity("timestamp_utc", 0, args.len()));
            }
            Ok(Value::from(now_epoch_ms))
        }
        "len" => {
            let [v] = require_args::<1>("len", args)?;
            match v {
                Value::String(s) => Ok(Value::from(s.chars().count())),
                Value::Array(a) => Ok(Value::from(a.len())),
                Value::Object(o) => Ok(Value::from(o.len())),
                Value::Null => Ok(Value::from(0)),
                _ => Err(FunctionError::BadType("len")),
            }
        }
        "sum" => {
            let [v] = require_args::<1>("sum", args)?;
            let Value::Array(items) = v else { return Err(FunctionError::BadType("sum")) };
            let mut total = 0f64;
            for item in items {
                total += item.as_f64().ok_or(FunctionError::BadType("sum"))?;
            }
            Ok(serde_json::json!(total))
        }
        "avg" => {
            let [v] = require_args::<1>("avg", args)?;
            let Value::Array(items) = v else { return Err(FunctionError::BadType("avg")) };
            if items.is_empty() {
                return Ok(Value::Null);
            }
            let mut total = 0f64;
            for item in items {
                total += item.as_f64().ok_or(FunctionError::BadType("avg"))?;
            }
            Ok(serde_json::json!(total / items.len() as f64))
        }
        "startswith" => {
            let [haystack, needle] = require_args::<2>("startswith", args)?;
            let (Value::String(h), Value::String(n)) = (haystack, needle) else {
                return Err(FunctionError::BadType("startswith"));
            };
            Ok(Value::Bool(h.starts_with(n.as_str())))
        }
        "contains" => {
            let [haystack, needle] = require_args::<2>("contains", args)?;
            match haystack {
                Value::String(h) => {
                    let Value::String(n) = needle else { return Err(FunctionError::BadType("contains")) };
                    Ok(Value::Bool(h.contains(n.as_str())))
                }
                Value::Array(items) => Ok(Value::Bool(items.contains(needle))),
                _ => Err(FunctionError::BadType("contains")),
            }
        }
        other => Err(FunctionError::Unknown(other.to_string())),
    }
}

fn require_args<const N: usize>(name: &'static str, args: &[Value]) -> Result<[&Value; N], FunctionError> {
    if args.len() != N {
        return Err(FunctionError::Arity(name, N, args.len()));
    }
    let mut out: [&Value; N] = [&Value::Null; N];
    for (slot, arg) in out.iter_mut().zip(args.iter()) {
        *slot = arg;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_string_chars_and_array_items() {
        assert_eq!(call("len", &[Value::from("hi")], 0).unwrap(), Value::from(2));
        assert_eq!(call("len", &[serde_json::json!([1, 2, 3])], 0).unwrap(), Value::from(3));
    }

    #[test]
    fn sum_and_avg_over_numeric_arrays() {
        let arr = serde_json::json!([1.0, 2.0, 3.0]);
        assert_eq!(call("sum", &[arr.clone()], 0).unwrap(), serde_json::json!(6.0));
        assert_eq!(call("avg", &[arr], 0).unwrap(), serde_json::json!(2.0));
    }

    #[test]
    fn unknown_function_is_rejected() {
        assert!(matches!(call("eval", &[], 0), Err(FunctionError::Unknown(_))));
    }
}
