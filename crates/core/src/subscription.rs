// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Subscription entity: owns a set of routing rules, deleted with cascade.

use crate::ids::SubscriptionId;
use crate::transformer::ParentScope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Event,
    Queue,
    Stream,
    Inject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub subscriber_id: String,
    pub topics: Vec<String>,
    pub delivery: DeliveryMode,
    #[serde(default)]
    pub config: Value,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_scope: Option<ParentScope>,
}

impl Subscription {
    pub fn new(subscriber_id: impl Into<String>, topics: Vec<String>, delivery: DeliveryMode) -> Self {
        Self { id: SubscriptionId::new(), subscriber_id: subscriber_id.into(), topics, delivery, config: Value::Null, active: true, parent_scope: None }
    }
}
