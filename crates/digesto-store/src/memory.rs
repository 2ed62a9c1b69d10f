//! In-process store for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::remote::normalize_path;
use crate::{ListEntry, RemoteStore, StoreError};

/// A [`RemoteStore`] backed by an ordered map of path → bytes.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize_path(path).is_ok_and(|p| self.read().contains_key(&p))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(&self, folder: &str) -> Result<Vec<ListEntry>, StoreError> {
        let prefix = format!("{}/", normalize_path(folder)?);
        let blobs = self.read();

        let mut files = Vec::new();
        let mut folders = BTreeSet::new();
        for path in blobs.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((sub, _)) => {
                    folders.insert(sub.to_string());
                }
                None => files.push(ListEntry::file(rest)),
            }
        }

        let mut entries: Vec<ListEntry> = folders.into_iter().map(ListEntry::folder).collect();
        entries.extend(files);
        Ok(entries)
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = normalize_path(path)?;
        Ok(self.read().get(&path).cloned())
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Err(StoreError::InvalidPath("/".into()));
        }
        self.write().insert(path, bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        self.write().remove(&path);
        Ok(())
    }
}
