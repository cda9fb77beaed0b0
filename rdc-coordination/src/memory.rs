// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! In-process coordination store
//!
//! A linearizable implementation of [`CoordinationStore`] backed by a
//! single-mutex node tree. Used by every test and by standalone mode when
//! running without an external coordination service.

use crate::client::CoordinationStore;
use crate::ops::{CreateMode, MultiError, Stat, StoreOp};
use parking_lot::Mutex;
use rdc_common::{NodeVersion, StoreError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Node {
    value: String,
    version: NodeVersion,
    cversion: NodeVersion,
    children: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: HashMap<String, Node>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::default());
        Self { nodes }
    }

    fn parent_of(path: &str) -> &str {
        match path.rfind('/') {
            Some(0) => "/",
            Some(pos) => &path[..pos],
            None => "/",
        }
    }

    fn child_name(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }

    fn validate_path(path: &str) -> Result<(), StoreError> {
        if !path.starts_with('/') || (path.len() > 1 && path.ends_with('/')) {
            return Err(StoreError::NoNode);
        }
        Ok(())
    }

    fn create(&mut self, path: &str, value: &str, mode: CreateMode) -> Result<String, StoreError> {
        Self::validate_path(path)?;
        let parent = Self::parent_of(path).to_string();
        if !self.nodes.contains_key(&parent) {
            return Err(StoreError::NoNode);
        }

        let real_path = match mode {
            CreateMode::Persistent => path.to_string(),
            CreateMode::EphemeralSequential => {
                // Sequential suffixes come from the parent's child-version,
                // which only ever grows, so numbers are never reused.
                let parent_node = self.nodes.get(&parent).expect("parent checked above");
                format!("{}{:010}", path, parent_node.cversion)
            }
        };

        if self.nodes.contains_key(&real_path) {
            return Err(StoreError::NodeExists);
        }

        let parent_node = self.nodes.get_mut(&parent).expect("parent checked above");
        parent_node.cversion += 1;
        parent_node
            .children
            .insert(Self::child_name(&real_path).to_string());

        self.nodes.insert(
            real_path.clone(),
            Node {
                value: value.to_string(),
                ..Node::default()
            },
        );
        Ok(real_path)
    }

    fn set(&mut self, path: &str, value: &str, version: NodeVersion) -> Result<(), StoreError> {
        let node = self.nodes.get_mut(path).ok_or(StoreError::NoNode)?;
        if version >= 0 && node.version != version {
            return Err(StoreError::BadVersion);
        }
        node.value = value.to_string();
        node.version += 1;
        Ok(())
    }

    fn remove(&mut self, path: &str, version: NodeVersion) -> Result<(), StoreError> {
        let node = self.nodes.get(path).ok_or(StoreError::NoNode)?;
        if version >= 0 && node.version != version {
            return Err(StoreError::BadVersion);
        }
        if !node.children.is_empty() {
            return Err(StoreError::NotEmpty);
        }
        self.nodes.remove(path);
        let parent = Self::parent_of(path).to_string();
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.cversion += 1;
            parent_node.children.remove(Self::child_name(path));
        }
        Ok(())
    }

    fn apply(&mut self, op: &StoreOp) -> Result<(), StoreError> {
        match op {
            StoreOp::Create { path, value, mode } => self.create(path, value, *mode).map(|_| ()),
            StoreOp::Remove { path, version } => self.remove(path, *version),
            StoreOp::Set { path, value, version } => self.set(path, value, *version),
        }
    }
}

/// Shared handle to an in-process store. Cloning yields another handle to
/// the same tree, so several replicas in one process see one store.
#[derive(Clone)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationStore for MemoryStore {
    fn create(&self, path: &str, value: &str, mode: CreateMode) -> Result<String, StoreError> {
        self.tree.lock().create(path, value, mode)
    }

    fn set(&self, path: &str, value: &str, version: NodeVersion) -> Result<(), StoreError> {
        self.tree.lock().set(path, value, version)
    }

    fn get(&self, path: &str) -> Result<String, StoreError> {
        self.tree
            .lock()
            .nodes
            .get(path)
            .map(|node| node.value.clone())
            .ok_or(StoreError::NoNode)
    }

    fn try_get(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tree.lock().nodes.get(path).map(|node| node.value.clone()))
    }

    fn get_with_stat(&self, path: &str) -> Result<(String, Stat), StoreError> {
        let tree = self.tree.lock();
        let node = tree.nodes.get(path).ok_or(StoreError::NoNode)?;
        let stat = Stat {
            version: node.version,
            cversion: node.cversion,
            num_children: node.children.len(),
        };
        Ok((node.value.clone(), stat))
    }

    fn try_get_many(&self, paths: &[String]) -> Vec<Option<String>> {
        let tree = self.tree.lock();
        paths
            .iter()
            .map(|path| tree.nodes.get(path).map(|node| node.value.clone()))
            .collect()
    }

    fn get_children(&self, path: &str) -> Result<(Vec<String>, Stat), StoreError> {
        let tree = self.tree.lock();
        let node = tree.nodes.get(path).ok_or(StoreError::NoNode)?;
        let children: Vec<String> = node.children.iter().cloned().collect();
        let stat = Stat {
            version: node.version,
            cversion: node.cversion,
            num_children: children.len(),
        };
        Ok((children, stat))
    }

    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.tree.lock().nodes.contains_key(path))
    }

    fn try_remove(&self, path: &str) -> Result<bool, StoreError> {
        let mut tree = self.tree.lock();
        match tree.remove(path, -1) {
            Ok(()) => Ok(true),
            Err(StoreError::NoNode) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn try_remove_recursive(&self, path: &str) -> Result<(), StoreError> {
        let mut tree = self.tree.lock();
        if !tree.nodes.contains_key(path) {
            return Ok(());
        }
        let prefix = format!("{}/", path);
        let doomed: Vec<String> = tree
            .nodes
            .keys()
            .filter(|key| *key == path || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &doomed {
            tree.nodes.remove(key);
        }
        let parent = Tree::parent_of(path).to_string();
        if let Some(parent_node) = tree.nodes.get_mut(&parent) {
            parent_node.cversion += 1;
            parent_node.children.remove(Tree::child_name(path));
        }
        Ok(())
    }

    fn multi(&self, ops: &[StoreOp]) -> Result<(), MultiError> {
        let mut tree = self.tree.lock();
        // Run against a scratch copy; commit only a fully successful batch.
        let mut scratch = tree.clone();
        for (index, op) in ops.iter().enumerate() {
            if let Err(error) = scratch.apply(op) {
                return Err(MultiError {
                    failed_op: index,
                    error,
                });
            }
        }
        *tree = scratch;
        Ok(())
    }

    fn create_ancestors(&self, path: &str) -> Result<(), StoreError> {
        let mut tree = self.tree.lock();
        let mut prefix = String::new();
        let ancestors: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        if ancestors.len() <= 1 {
            return Ok(());
        }
        for part in &ancestors[..ancestors.len() - 1] {
            prefix.push('/');
            prefix.push_str(part);
            match tree.create(&prefix, "", CreateMode::Persistent) {
                Ok(_) | Err(StoreError::NodeExists) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_root(root: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_ancestors(&format!("{}/x", root)).unwrap();
        store
    }

    #[test]
    fn test_create_and_get() {
        let store = MemoryStore::new();
        store.create("/db", "v", CreateMode::Persistent).unwrap();
        assert_eq!(store.get("/db").unwrap(), "v");
        assert!(store.exists("/db").unwrap());
        assert_eq!(store.try_get("/missing").unwrap(), None);
    }

    #[test]
    fn test_create_requires_parent() {
        let store = MemoryStore::new();
        let err = store.create("/a/b", "", CreateMode::Persistent).unwrap_err();
        assert_eq!(err, StoreError::NoNode);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let store = MemoryStore::new();
        store.create("/db", "", CreateMode::Persistent).unwrap();
        let err = store.create("/db", "", CreateMode::Persistent).unwrap_err();
        assert_eq!(err, StoreError::NodeExists);
    }

    #[test]
    fn test_sequential_nodes_increase() {
        let store = store_with_root("/db");
        let first = store
            .create("/db/cnt-", "", CreateMode::EphemeralSequential)
            .unwrap();
        let second = store
            .create("/db/cnt-", "", CreateMode::EphemeralSequential)
            .unwrap();
        assert_eq!(first, "/db/cnt-0000000000");
        assert_eq!(second, "/db/cnt-0000000001");
        // Removal bumps the child-version, so numbers are never reused.
        assert!(store.try_remove(&second).unwrap());
        let third = store
            .create("/db/cnt-", "", CreateMode::EphemeralSequential)
            .unwrap();
        assert_eq!(third, "/db/cnt-0000000003");
    }

    #[test]
    fn test_set_version_check() {
        let store = MemoryStore::new();
        store.create("/db", "a", CreateMode::Persistent).unwrap();
        store.set("/db", "b", 0).unwrap();
        let err = store.set("/db", "c", 0).unwrap_err();
        assert_eq!(err, StoreError::BadVersion);
        store.set("/db", "c", -1).unwrap();
        assert_eq!(store.get("/db").unwrap(), "c");
    }

    #[test]
    fn test_cversion_tracks_child_changes() {
        let store = MemoryStore::new();
        store.create("/db", "", CreateMode::Persistent).unwrap();
        let (_, before) = store.get_children("/db").unwrap();
        store.create("/db/a", "", CreateMode::Persistent).unwrap();
        let (children, after) = store.get_children("/db").unwrap();
        assert_eq!(children, vec!["a".to_string()]);
        assert!(after.cversion > before.cversion);
    }

    #[test]
    fn test_multi_is_atomic() {
        let store = MemoryStore::new();
        store.create("/db", "", CreateMode::Persistent).unwrap();
        let ops = vec![
            StoreOp::create("/db/a", "1"),
            StoreOp::create("/db/a", "dup"),
        ];
        let err = store.multi(&ops).unwrap_err();
        assert_eq!(err.failed_op, 1);
        assert_eq!(err.error, StoreError::NodeExists);
        // First op must have been rolled back.
        assert!(!store.exists("/db/a").unwrap());
    }

    #[test]
    fn test_multi_applies_all() {
        let store = MemoryStore::new();
        store.create("/db", "", CreateMode::Persistent).unwrap();
        store.create("/db/old", "x", CreateMode::Persistent).unwrap();
        let ops = vec![
            StoreOp::remove("/db/old"),
            StoreOp::create("/db/new", "y"),
        ];
        store.multi(&ops).unwrap();
        assert!(!store.exists("/db/old").unwrap());
        assert_eq!(store.get("/db/new").unwrap(), "y");
    }

    #[test]
    fn test_remove_rejects_non_empty() {
        let store = MemoryStore::new();
        store.create("/db", "", CreateMode::Persistent).unwrap();
        store.create("/db/a", "", CreateMode::Persistent).unwrap();
        let err = store.try_remove("/db").unwrap_err();
        assert_eq!(err, StoreError::NotEmpty);
        store.try_remove_recursive("/db").unwrap();
        assert!(!store.exists("/db").unwrap());
        assert!(!store.exists("/db/a").unwrap());
    }

    #[test]
    fn test_try_get_many() {
        let store = MemoryStore::new();
        store.create("/db", "", CreateMode::Persistent).unwrap();
        store.create("/db/a", "1", CreateMode::Persistent).unwrap();
        let fetched = store.try_get_many(&["/db/a".to_string(), "/db/b".to_string()]);
        assert_eq!(fetched, vec![Some("1".to_string()), None]);
    }

    #[test]
    fn test_concurrent_creates_have_one_winner() {
        let store = MemoryStore::new();
        store.create("/db", "", CreateMode::Persistent).unwrap();
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.create("/db/slot", &format!("writer-{}", i), CreateMode::Persistent)
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(StoreError::NodeExists)))
                .count(),
            7
        );
    }
}
