//! The remote store contract shared by every adapter.

use std::sync::Arc;

use async_trait::async_trait;

use crate::StoreError;

/// What a listing entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Folder,
    Deleted,
}

/// One entry of a folder listing. `name` is the last path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl ListEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Path-addressed blob store.
///
/// Paths are absolute, `/`-separated strings (`/fichas_json/594.json`).
/// Adapters must provide read-after-write consistency per path.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every entry directly under `folder`, following pagination to the end.
    ///
    /// A folder that does not exist lists as empty.
    async fn list(&self, folder: &str) -> Result<Vec<ListEntry>, StoreError>;

    /// The content at `path`, or `None` if nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `bytes` at `path`, overwriting any existing content.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Remove `path`. Deleting a path that does not exist succeeds.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    async fn list(&self, folder: &str) -> Result<Vec<ListEntry>, StoreError> {
        (**self).list(folder).await
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(path).await
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        (**self).put(path, bytes).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        (**self).delete(path).await
    }
}

/// Canonicalise a store path: leading `/`, no empty or `.`/`..` segments,
/// no trailing `/`. The root folder is `""`.
pub fn normalize_path(path: &str) -> Result<String, StoreError> {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(StoreError::InvalidPath(path.to_string())),
            s => {
                out.push('/');
                out.push_str(s);
            }
        }
    }
    Ok(out)
}

/// Join a folder and a file name into a store path.
pub fn join_path(folder: &str, name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), name.trim_start_matches('/'))
}
