// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Async-state queue entity: `{queue_id, items[], created_at, ttl_deadline?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `queue:{namespace}:{key}`.
pub fn queue_id(namespace: &str, key: &str) -> String {
    format!("queue:{namespace}:{key}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub data: Value,
    pub pushed_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntity {
    pub queue_id: String,
    pub namespace: String,
    pub key: String,
    pub items: Vec<QueueItem>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_deadline_ms: Option<u64>,
}

impl QueueEntity {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, created_at_ms: u64) -> Self {
        let namespace = namespace.into();
        let key = key.into();
        let queue_id = self::queue_id(&namespace, &key);
        Self { queue_id, namespace, key, items: Vec::new(), created_at_ms, ttl_deadline_ms: None }
    }

    /// A queue entity exists iff it has at least one item or a pending TTL
    ///. Callers delete the entity once this is false.
    pub fn should_exist(&self) -> bool {
        !self.items.is_empty() || self.ttl_deadline_ms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_with_no_ttl_should_not_exist() {
        let q = QueueEntity::new("ns", "key", 0);
        assert!(!q.should_exist());
    }

    #[test]
    fn queue_with_pending_ttl_should_exist_even_if_empty() {
        let mut q = QueueEntity::new("ns", "key", 0);
        q.ttl_deadline_ms = Some(60_000);
        assert!(q.should_exist());
    }

    #[test]
    fn queue_id_format_matches_spec() {
        assert_eq!(queue_id("pubsub", "s1"), "queue:pubsub:s1");
    }
}
