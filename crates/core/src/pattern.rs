// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Event-name patterns: exact `ns:verb` names and wildcard matchers.
//!
//! A pattern is a `:`-separated sequence of segments. `*` matches exactly
//! one segment; `**` (only valid as the final segment) matches the rest of
//! the name, including zero additional segments. The bare pattern `*` is
//! the universal matcher and is equivalent to `**`.

use serde::{Deserialize, Serialize};

/// A registered pattern, as written in a handler or transformer rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(pub String);

impl Pattern {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        self.0.split(':').collect()
    }

    /// True if this pattern contains no wildcard segments.
    pub fn is_exact(&self) -> bool {
        self.0 != "*" && !self.segments().iter().any(|s| *s == "*" || *s == "**")
    }

    /// True if this pattern is the universal matcher (`*` or trailing `**`
    /// at the root, i.e. it can match any event name whatsoever).
    pub fn is_universal(&self) -> bool {
        self.0 == "*" || self.0 == "**"
    }

    /// Does this pattern match the given concrete event name?
    pub fn matches(&self, name: &str) -> bool {
        if self.0 == "*" {
            return true;
        }
        matches_segments(&self.segments(), name.split(':').collect::<Vec<_>>().as_slice())
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn matches_segments(pattern: &[&str], name: &[&str]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some(&"**") => true,
        Some(&"*") => match name.first() {
            Some(_) => matches_segments(&pattern[1..], &name[1..]),
            None => false,
        },
        Some(seg) => match name.first() {
            Some(n) if n == seg => matches_segments(&pattern[1..], &name[1..]),
            _ => false,
        },
    }
}

/// Does `target_pattern` match any concrete name that `source_pattern`
/// could also match? Used to reject self-matching universal transformers
/// at registration time.
pub fn patterns_could_overlap(source_pattern: &Pattern, target_pattern: &Pattern) -> bool {
    if source_pattern.is_universal() || target_pattern.is_universal() {
        return true;
    }
    let (a, b) = (source_pattern.segments(), target_pattern.segments());
    segment_overlap(&a, &b)
}

fn segment_overlap(a: &[&str], b: &[&str]) -> bool {
    match (a.first(), b.first()) {
        (None, None) => true,
        (Some(&"**"), _) | (_, Some(&"**")) => true,
        (None, _) | (_, None) => false,
        (Some(&"*"), _) | (_, Some(&"*")) => segment_overlap(&a[1..], &b[1..]),
        (Some(x), Some(y)) => x == y && segment_overlap(&a[1..], &b[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        let p = Pattern::new("agent:log");
        assert!(p.matches("agent:log"));
        assert!(!p.matches("agent:logged"));
        assert!(!p.matches("agent:log:extra"));
    }

    #[test]
    fn single_star_matches_one_segment() {
        let p = Pattern::new("agent:*");
        assert!(p.matches("agent:log"));
        assert!(!p.matches("agent:log:extra"));
        assert!(!p.matches("other:log"));
    }

    #[test]
    fn double_star_matches_remainder() {
        let p = Pattern::new("agent:**");
        assert!(p.matches("agent:log"));
        assert!(p.matches("agent:log:extra"));
        assert!(p.matches("agent:"));
    }

    #[test]
    fn bare_star_is_universal() {
        let p = Pattern::new("*");
        assert!(p.matches("anything:at:all"));
        assert!(p.is_universal());
    }

    #[test]
    fn overlap_detection_for_loop_safety() {
        let universal = Pattern::new("*");
        let target = Pattern::new("monitor:broadcast");
        assert!(patterns_could_overlap(&universal, &target));

        let exact_a = Pattern::new("agent:log");
        let exact_b = Pattern::new("agent:progress");
        assert!(!patterns_could_overlap(&exact_a, &exact_b));
    }
}
