//! Filesystem-backed store: store paths map onto files under a root directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::remote::normalize_path;
use crate::{EntryKind, ListEntry, RemoteStore, StoreError};

/// A [`RemoteStore`] rooted at a local directory.
///
/// `/fichas_json/594.json` lives at `<root>/fichas_json/594.json`. Writes go
/// to a sibling temp file first and are renamed into place.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let path = normalize_path(path)?;
        Ok(self.root.join(path.trim_start_matches('/')))
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn list(&self, folder: &str) -> Result<Vec<ListEntry>, StoreError> {
        let dir = self.resolve(folder)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".partial") {
                continue;
            }
            let kind = if entry.file_type().await?.is_dir() {
                EntryKind::Folder
            } else {
                EntryKind::File
            };
            entries.push(ListEntry { name, kind });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let file = self.resolve(path)?;
        if file == self.root {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut partial = file.clone().into_os_string();
        partial.push(".partial");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &file).await?;
        debug!(path = %file.display(), bytes = bytes.len(), "wrote local blob");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
