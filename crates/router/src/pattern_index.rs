// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Two-tier pattern index: an exact-name map plus a wildcard trie keyed on
//! `:`-split segments. Shared by the handler table and the
//! transformer table — both are "lookup by pattern, ordered by priority"
//! problems.

use ksi_core::Pattern;
use std::collections::HashMap;

/// One registered entry: a handler or a transformer, tagged with the
/// bookkeeping the index needs (priority ordering, stable tie-breaking,
/// and removal by id).
#[derive(Debug, Clone)]
pub struct IndexEntry<T> {
    pub id: String,
    pub pattern: Pattern,
    pub priority: i32,
    seq: u64,
    pub value: T,
}

#[derive(Default)]
struct TrieNode<T> {
    /// Patterns that terminate here, outside of a `*`/`**` jump (i.e. an
    /// exact segment chain that happens to live in the wildcard trie
    /// because another branch of the pattern uses a wildcard elsewhere —
    /// in practice only reached through `*`/`children` descent).
    here: Vec<IndexEntry<T>>,
    /// Patterns ending in `**` at this depth: match any suffix, including
    /// none.
    double_star: Vec<IndexEntry<T>>,
    star: Option<Box<TrieNode<T>>>,
    children: HashMap<String, Box<TrieNode<T>>>,
}

impl<T> TrieNode<T> {
    fn new() -> Self {
        Self { here: Vec::new(), double_star: Vec::new(), star: None, children: HashMap::new() }
    }

    fn insert(&mut self, segments: &[&str], entry: IndexEntry<T>) {
        match segments.first() {
            None => self.here.push(entry),
            Some(&"**") => self.double_star.push(entry),
            Some(&"*") => {
                self.star.get_or_insert_with(|| Box::new(TrieNode::new())).insert(&segments[1..], entry)
            }
            Some(seg) => self
                .children
                .entry(seg.to_string())
                .or_insert_with(|| Box::new(TrieNode::new()))
                .insert(&segments[1..], entry),
        }
    }

    fn collect_matches<'a>(&'a self, segments: &[&str], out: &mut Vec<&'a IndexEntry<T>>) {
        out.extend(self.double_star.iter());
        match segments.first() {
            None => out.extend(self.here.iter()),
            Some(&seg) => {
                if let Some(star) = &self.star {
                    star.collect_matches(&segments[1..], out);
                }
                if let Some(child) = self.children.get(seg) {
                    child.collect_matches(&segments[1..], out);
                }
            }
        }
    }

    fn remove(&mut self, segments: &[&str], id: &str) -> bool {
        let mut removed = remove_by_id(&mut self.double_star, id);
        match segments.first() {
            None => removed |= remove_by_id(&mut self.here, id),
            Some(&"**") => {}
            Some(&"*") => {
                if let Some(star) = &mut self.star {
                    removed |= star.remove(&segments[1..], id);
                }
            }
            Some(seg) => {
                if let Some(child) = self.children.get_mut(*seg) {
                    removed |= child.remove(&segments[1..], id);
                }
            }
        }
        removed
    }
}

fn remove_by_id<T>(entries: &mut Vec<IndexEntry<T>>, id: &str) -> bool {
    let before = entries.len();
    entries.retain(|e| e.id != id);
    entries.len() != before
}

/// Priority desc, then registration order (stable).
fn by_priority_then_registration<T>(a: &&IndexEntry<T>, b: &&IndexEntry<T>) -> std::cmp::Ordering {
    b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq))
}

pub struct PatternIndex<T> {
    exact: HashMap<String, Vec<IndexEntry<T>>>,
    wildcards: TrieNode<T>,
    registrations: HashMap<String, Pattern>,
    next_seq: u64,
}

impl<T> Default for PatternIndex<T> {
    fn default() -> Self {
        Self { exact: HashMap::new(), wildcards: TrieNode::new(), registrations: HashMap::new(), next_seq: 0 }
    }
}

impl<T> PatternIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `pattern` with the given `priority`.
    /// Duplicate registration under the same `id` replaces the previous
    /// entry atomically.
    pub fn register(&mut self, id: impl Into<String>, pattern: Pattern, priority: i32, value: T) {
        let id = id.into();
        self.unregister(&id);
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = IndexEntry { id: id.clone(), pattern: pattern.clone(), priority, seq, value };
        if pattern.is_exact() {
            self.exact.entry(pattern.as_str().to_string()).or_default().push(entry);
        } else {
            self.wildcards.insert(&pattern.segments(), entry);
        }
        self.registrations.insert(id, pattern);
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        let Some(pattern) = self.registrations.remove(id) else { return false };
        if pattern.is_exact() {
            if let Some(bucket) = self.exact.get_mut(pattern.as_str()) {
                remove_by_id(bucket, id);
            }
            true
        } else {
            self.wildcards.remove(&pattern.segments(), id)
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registrations.contains_key(id)
    }

    /// All registered `(id, pattern)` pairs, for introspection
    /// (`system:discover`). Order is unspecified.
    pub fn registered_patterns(&self) -> Vec<(&str, &Pattern)> {
        self.registrations.iter().map(|(id, pattern)| (id.as_str(), pattern)).collect()
    }

    /// Look up all entries matching `name`, concatenated in priority-desc,
    /// registration-order-stable order.
    pub fn lookup(&self, name: &str) -> Vec<&IndexEntry<T>> {
        let mut out: Vec<&IndexEntry<T>> = Vec::new();
        if let Some(bucket) = self.exact.get(name) {
            out.extend(bucket.iter());
        }
        let segments: Vec<&str> = name.split(':').collect();
        self.wildcards.collect_matches(&segments, &mut out);
        out.sort_by(by_priority_then_registration);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lookup_returns_only_exact_matches() {
        let mut idx: PatternIndex<&str> = PatternIndex::new();
        idx.register("h1", Pattern::new("agent:log"), 0, "handler-1");
        idx.register("h2", Pattern::new("agent:progress"), 0, "handler-2");
        let matches = idx.lookup("agent:log");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, "handler-1");
    }

    #[test]
    fn wildcard_single_segment_matches() {
        let mut idx: PatternIndex<&str> = PatternIndex::new();
        idx.register("w1", Pattern::new("agent:*"), 0, "wild");
        assert_eq!(idx.lookup("agent:log").len(), 1);
        assert_eq!(idx.lookup("agent:log:extra").len(), 0);
    }

    #[test]
    fn double_star_matches_any_depth() {
        let mut idx: PatternIndex<&str> = PatternIndex::new();
        idx.register("w1", Pattern::new("agent:**"), 0, "wild");
        assert_eq!(idx.lookup("agent:log").len(), 1);
        assert_eq!(idx.lookup("agent:log:extra").len(), 1);
    }

    #[test]
    fn priority_desc_then_registration_order_is_stable() {
        let mut idx: PatternIndex<&str> = PatternIndex::new();
        idx.register("low-first", Pattern::new("ns:verb"), 1, "low-first");
        idx.register("high", Pattern::new("ns:verb"), 10, "high");
        idx.register("low-second", Pattern::new("ns:verb"), 1, "low-second");
        let matches = idx.lookup("ns:verb");
        let values: Vec<&str> = matches.iter().map(|e| e.value).collect();
        assert_eq!(values, vec!["high", "low-first", "low-second"]);
    }

    #[test]
    fn duplicate_registration_replaces_atomically() {
        let mut idx: PatternIndex<&str> = PatternIndex::new();
        idx.register("h1", Pattern::new("agent:log"), 0, "v1");
        idx.register("h1", Pattern::new("agent:log"), 0, "v2");
        let matches = idx.lookup("agent:log");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, "v2");
    }

    #[test]
    fn unregister_removes_wildcard_entries() {
        let mut idx: PatternIndex<&str> = PatternIndex::new();
        idx.register("w1", Pattern::new("agent:*"), 0, "wild");
        assert!(idx.unregister("w1"));
        assert_eq!(idx.lookup("agent:log").len(), 0);
    }

    #[test]
    fn universal_pattern_matches_everything() {
        let mut idx: PatternIndex<&str> = PatternIndex::new();
        idx.register("u", Pattern::new("*"), 0, "universal");
        assert_eq!(idx.lookup("anything:at:all").len(), 1);
        assert_eq!(idx.lookup("x").len(), 1);
    }
}
