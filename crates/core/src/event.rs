// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! The immutable event value dispatched through the router.

use crate::context::Context;
use crate::ids::EventId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("event name must not be empty")]
    Empty,
    #[error("event name {0:?} must be lowercase `namespace:verb`")]
    NotLowerSnake(String),
    #[error("event name {0:?} must contain at least one `:`")]
    MissingNamespace(String),
}

/// Validate and normalize an event name: lowercase, `:`-separated,
/// `namespace:verb`.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if !name.contains(':') {
        return Err(NameError::MissingNamespace(name.to_string()));
    }
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(NameError::NotLowerSnake(name.to_string()));
    }
    Ok(())
}

/// An immutable event record. Constructed only through the router's `emit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub data: Value,
    pub context: Context,
    /// Wall-clock milliseconds since epoch.
    pub timestamp_ms: u64,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value, context: Context, timestamp_ms: u64) -> Result<Self, NameError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { id: context.event_id, name, data, context, timestamp_ms })
    }

    pub fn namespace(&self) -> &str {
        self.name.split(':').next().unwrap_or("")
    }

    /// Embed `_ksi_context` into the payload the way a wire frame presents
    /// it to clients.
    pub fn to_wire_payload(&self) -> Value {
        let mut payload = match &self.data {
            Value::Object(map) => Value::Object(map.clone()),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other.clone());
                Value::Object(map)
            }
        };
        if let Value::Object(map) = &mut payload {
            map.insert("_ksi_context".to_string(), serde_json::to_value(&self.context).unwrap_or(Value::Null));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Originator;

    #[test]
    fn rejects_names_without_namespace() {
        assert_eq!(validate_name("ping"), Err(NameError::MissingNamespace("ping".into())));
    }

    #[test]
    fn rejects_uppercase_names() {
        assert!(validate_name("Agent:Log").is_err());
    }

    #[test]
    fn accepts_well_formed_names() {
        assert!(validate_name("agent:log").is_ok());
        assert!(validate_name("agent:log:detail").is_ok());
    }

    #[test]
    fn wire_payload_embeds_context_alongside_object_data() {
        let ctx = Context::root(Originator::system());
        let event = Event::new("agent:log", serde_json::json!({"text": "hi"}), ctx, 0).unwrap();
        let payload = event.to_wire_payload();
        assert_eq!(payload["text"], "hi");
        assert!(payload.get("_ksi_context").is_some());
    }
}
