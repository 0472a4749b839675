// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Originator / streaming layer: an
//! implicit per-chain mirror that streams every event in a causal chain
//! back to whoever started it, when that originator declared a
//! `return_path`. Installed lazily on the first event of a chain that
//! carries one; torn down on a terminal event plus a grace period, so a
//! slightly-late straggler in the chain still gets mirrored.

use ksi_core::EventId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default interval between `error:originator_overflow` emissions per
/// mirror.
pub const DEFAULT_OVERFLOW_INTERVAL: Duration = Duration::from_secs(1);

/// Default grace period after a chain's terminal event before its mirror
/// is torn down (overridable via `KSI_MIRROR_GRACE_MS`).
pub const DEFAULT_MIRROR_GRACE: Duration = Duration::from_secs(30);

struct Mirror {
    return_path: String,
    last_overflow_emit: Option<Instant>,
}

/// Tracks active per-chain mirrors. Owned by the router's dispatch loop;
/// not `Send`-shared, since only that loop installs, streams through, and
/// tears down mirrors.
#[derive(Default)]
pub struct OriginatorRegistry {
    mirrors: HashMap<EventId, Mirror>,
}

impl OriginatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a mirror for `chain_id` the first time a chain's originator
    /// is seen with a `return_path`. No-op if already installed.
    pub fn install(&mut self, chain_id: EventId, return_path: String) {
        self.mirrors.entry(chain_id).or_insert(Mirror { return_path, last_overflow_emit: None });
    }

    pub fn return_path_for(&self, chain_id: &EventId) -> Option<&str> {
        self.mirrors.get(chain_id).map(|m| m.return_path.as_str())
    }

    pub fn is_installed(&self, chain_id: &EventId) -> bool {
        self.mirrors.contains_key(chain_id)
    }

    /// Tear down the mirror for `chain_id` immediately (called once the
    /// scheduler's grace-period timer fires).
    pub fn remove(&mut self, chain_id: &EventId) {
        self.mirrors.remove(chain_id);
    }

    /// Whether an `error:originator_overflow` may be emitted right now for
    /// this mirror; records the emission if so.
    pub fn try_emit_overflow(&mut self, chain_id: &EventId, now: Instant, interval: Duration) -> bool {
        let Some(mirror) = self.mirrors.get_mut(chain_id) else { return false };
        match mirror.last_overflow_emit {
            Some(last) if now.duration_since(last) < interval => false,
            _ => {
                mirror.last_overflow_emit = Some(now);
                true
            }
        }
    }

    /// Is `name` a terminal event for a mirrored chain —
    /// `completion:result` or any `error:*`?
    pub fn is_terminal(name: &str) -> bool {
        name == "completion:result" || name.starts_with("error:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent_per_chain() {
        let mut reg = OriginatorRegistry::new();
        let chain = EventId::new();
        reg.install(chain, "stream:c1".to_string());
        reg.install(chain, "stream:other".to_string());
        assert_eq!(reg.return_path_for(&chain), Some("stream:c1"));
    }

    #[test]
    fn terminal_event_names_are_recognized() {
        assert!(OriginatorRegistry::is_terminal("completion:result"));
        assert!(OriginatorRegistry::is_terminal("error:validation"));
        assert!(!OriginatorRegistry::is_terminal("agent:progress"));
    }

    #[test]
    fn overflow_emission_is_rate_limited() {
        let mut reg = OriginatorRegistry::new();
        let chain = EventId::new();
        reg.install(chain, "stream:c1".to_string());
        let now = Instant::now();
        assert!(reg.try_emit_overflow(&chain, now, Duration::from_secs(1)));
        assert!(!reg.try_emit_overflow(&chain, now, Duration::from_secs(1)));
        assert!(reg.try_emit_overflow(&chain, now + Duration::from_secs(2), Duration::from_secs(1)));
    }

    #[test]
    fn remove_clears_the_mirror() {
        let mut reg = OriginatorRegistry::new();
        let chain = EventId::new();
        reg.install(chain, "stream:c1".to_string());
        reg.remove(&chain);
        assert!(!reg.is_installed(&chain));
    }
}
