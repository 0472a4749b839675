// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Typed identifiers used throughout the event runtime.

use crate::define_id;

define_id! {
    /// Unique id of a single emitted event. Doubles as the `chain_id` for
    /// the root event of a causal chain.
    pub struct EventId("evt-");
}

define_id! {
    /// Unique id of a registered transformer (routing rule).
    pub struct RuleId("rul-");
}

define_id! {
    /// Identity of an agent, the only identity the router/completion
    /// boundary understands.
    pub struct AgentId("agt-");
}

define_id! {
    /// Id of a completion request returned immediately by `completion:async`
    /// / `completion:inject`; the eventual result correlates back via this id.
    pub struct RequestId("req-");
}

define_id! {
    /// Id of a subscription created by `pubsub:subscribe`.
    pub struct SubscriptionId("sub-");
}

define_id! {
    /// Id of a scheduled timer (TTL expiry, delayed retry, mirror grace).
    pub struct TimerId("tmr-");
}
