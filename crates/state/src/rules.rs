// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Routing-rule persistence: YAML-backed user rules under
//! `routes/persistent/{namespace}/{rule_id}.yaml`, and read-only bundled
//! rules under `routes/system/**/*.yaml`. Content hashes (sha2-256) let
//! `system:reload_routes` diff what changed on disk against what's loaded.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ksi_core::{RuleId, Transformer};
use sha2::{Digest, Sha256};

use crate::error::StateError;

/// A rule file as read from disk, with the hash of its raw bytes.
#[derive(Debug, Clone)]
pub struct LoadedRule {
    pub path: PathBuf,
    pub transformer: Transformer,
    pub content_hash: String,
}

/// The result of comparing freshly-read system rule files against a
/// previously recorded hash map, for `system:reload_routes`.
#[derive(Debug, Clone, Default)]
pub struct ReloadDiff {
    pub added: Vec<LoadedRule>,
    pub changed: Vec<LoadedRule>,
    pub removed: Vec<String>,
    pub unchanged_count: usize,
}

pub struct RuleStore {
    persistent_dir: PathBuf,
    system_dir: PathBuf,
}

impl RuleStore {
    pub fn new(persistent_dir: impl Into<PathBuf>, system_dir: impl Into<PathBuf>) -> Self {
        Self { persistent_dir: persistent_dir.into(), system_dir: system_dir.into() }
    }

    /// Write `transformer` to `routes/persistent/{namespace}/{rule_id}.yaml`,
    /// replacing any existing file for that rule id.
    pub fn save_persistent(&self, namespace: &str, transformer: &Transformer) -> Result<PathBuf, StateError> {
        let dir = self.persistent_dir.join(namespace);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.yaml", transformer.rule_id.as_str()));
        let yaml = serde_yaml::to_string(transformer)?;
        fs::write(&path, yaml)?;
        Ok(path)
    }

    pub fn delete_persistent(&self, namespace: &str, rule_id: &RuleId) -> Result<(), StateError> {
        let path = self.persistent_dir.join(namespace).join(format!("{}.yaml", rule_id.as_str()));
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Every persistent rule file across all namespace subdirectories.
    pub fn load_persistent_all(&self) -> Result<Vec<LoadedRule>, StateError> {
        if !self.persistent_dir.exists() {
            return Ok(Vec::new());
        }
        load_yaml_tree(&self.persistent_dir)
    }

    /// Every bundled system rule file under `routes/system/**/*.yaml`.
    pub fn load_system_all(&self) -> Result<Vec<LoadedRule>, StateError> {
        if !self.system_dir.exists() {
            return Ok(Vec::new());
        }
        load_yaml_tree(&self.system_dir)
    }

    /// Diff the current on-disk system rules against `previous_hashes`
    /// (keyed by rule id), for `system:reload_routes`.
    pub fn reload_diff(&self, previous_hashes: &HashMap<String, String>) -> Result<ReloadDiff, StateError> {
        let current = self.load_system_all()?;
        let mut diff = ReloadDiff::default();
        let mut seen = std::collections::HashSet::new();

        for rule in current {
            let id = rule.transformer.rule_id.as_str().to_string();
            seen.insert(id.clone());
            match previous_hashes.get(&id) {
                None => diff.added.push(rule),
                Some(prev_hash) if *prev_hash != rule.content_hash => diff.changed.push(rule),
                Some(_) => diff.unchanged_count += 1,
            }
        }
        for id in previous_hashes.keys() {
            if !seen.contains(id) {
                diff.removed.push(id.clone());
            }
        }
        Ok(diff)
    }
}

fn load_yaml_tree(root: &Path) -> Result<Vec<LoadedRule>, StateError> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let bytes = fs::read(&path)?;
            let content_hash = hash_bytes(&bytes);
            let transformer: Transformer = serde_yaml::from_slice(&bytes)?;
            out.push(LoadedRule { path, transformer, content_hash });
        }
    }
    Ok(out)
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksi_core::{Pattern, PersistenceClass};
    use tempfile::tempdir;

    fn sample(rule_id: &str) -> Transformer {
        Transformer {
            rule_id: RuleId::from_string(rule_id),
            source_pattern: Pattern::new("ns:*"),
            condition: None,
            targets: vec![],
            r#async: false,
            ttl_seconds: None,
            parent_scope: None,
            persistence_class: PersistenceClass::Persistent,
            priority: 100,
            exclude_patterns: vec![],
            loop_safe: false,
        }
    }

    #[test]
    fn save_then_load_persistent_round_trips() {
        let dir = tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("persistent"), dir.path().join("system"));
        store.save_persistent("default", &sample("rul-a")).unwrap();
        let loaded = store.load_persistent_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].transformer.rule_id.as_str(), "rul-a");
    }

    #[test]
    fn delete_persistent_removes_file() {
        let dir = tempdir().unwrap();
        let store = RuleStore::new(dir.path().join("persistent"), dir.path().join("system"));
        store.save_persistent("default", &sample("rul-a")).unwrap();
        store.delete_persistent("default", &RuleId::from_string("rul-a")).unwrap();
        assert!(store.load_persistent_all().unwrap().is_empty());
    }

    #[test]
    fn reload_diff_detects_added_changed_and_removed() {
        let dir = tempdir().unwrap();
        let system_dir = dir.path().join("system");
        fs::create_dir_all(&system_dir).unwrap();
        fs::write(system_dir.join("keep.yaml"), serde_yaml::to_string(&sample("rul-keep")).unwrap()).unwrap();
        fs::write(system_dir.join("change.yaml"), serde_yaml::to_string(&sample("rul-change")).unwrap()).unwrap();
        let store = RuleStore::new(dir.path().join("persistent"), &system_dir);

        let baseline = store.load_system_all().unwrap();
        let mut previous: HashMap<String, String> = baseline.iter().map(|r| (r.transformer.rule_id.as_str().to_string(), r.content_hash.clone())).collect();
        previous.insert("rul-gone".to_string(), "deadbeef".to_string());

        let mut changed = sample("rul-change");
        changed.priority = 999;
        fs::write(system_dir.join("change.yaml"), serde_yaml::to_string(&changed).unwrap()).unwrap();
        fs::write(system_dir.join("new.yaml"), serde_yaml::to_string(&sample("rul-new")).unwrap()).unwrap();

        let diff = store.reload_diff(&previous).unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].transformer.rule_id.as_str(), "rul-new");
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].transformer.rule_id.as_str(), "rul-change");
        assert_eq!(diff.removed, vec!["rul-gone".to_string()]);
        assert_eq!(diff.unchanged_count, 1);
    }
}
