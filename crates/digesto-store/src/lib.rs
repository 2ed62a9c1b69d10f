//! Storage layer: path-addressed blob stores (memory, filesystem, Dropbox) and
//! Arrow CSV/Parquet IO for the relation tables.

mod error;
pub use error::StoreError;

mod remote;
pub use remote::{EntryKind, ListEntry, RemoteStore, join_path, normalize_path};

mod memory;
pub use memory::MemoryStore;

mod local;
pub use local::LocalStore;

pub mod pager;
pub use pager::{ListPage, collect_pages};

#[cfg(feature = "dropbox")]
mod dropbox;
#[cfg(feature = "dropbox")]
pub use dropbox::{DropboxCredentials, DropboxStore};

pub mod tabular;
pub use tabular::TableError;
