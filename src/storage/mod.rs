//! Storage surface: the key-value backend contract, its implementations, and
//! the chunked and typed stores layered on top of it.
//!
//! Backends mirror the browser's synced storage area: a flat mapping from
//! string keys to JSON values supporting batched get/set, removal and a full
//! clear. Every call may fail (quota exceeded, I/O error) and every call is
//! a suspension point for the caller.

pub mod chunked;
pub mod file;
pub mod memory;
pub mod newtab;

pub use chunked::{chunk_key, is_chunk_of, manifest_key, split_chunks, ChunkedStore};
pub use file::FileBackend;
pub use memory::{MemoryBackend, Quota};
pub use newtab::{NewTabStore, BACKGROUND_KEY, GRID_CONFIG_KEY, WIDGETS_KEY};

use crate::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A batch of stored items keyed by physical storage key
pub type StorageMap = serde_json::Map<String, serde_json::Value>;

/// Contract consumed by [`ChunkedStore`]. Implementations decide how values
/// are kept and which quotas apply; callers never retry on their behalf.
pub trait StorageBackend: Send + Sync {
    /// Fetch the given keys. Absent keys are simply missing from the result.
    fn get<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<StorageMap>>;

    /// Fetch every stored item
    fn get_all(&self) -> BoxFuture<'_, Result<StorageMap>>;

    /// Write all items of the batch, or none of them if the batch is rejected
    fn set(&self, items: StorageMap) -> BoxFuture<'_, Result<()>>;

    /// Delete the given keys; absent keys are ignored
    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<()>>;

    /// Delete everything
    fn clear(&self) -> BoxFuture<'_, Result<()>>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn get<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<StorageMap>> {
        (**self).get(keys)
    }

    fn get_all(&self) -> BoxFuture<'_, Result<StorageMap>> {
        (**self).get_all()
    }

    fn set(&self, items: StorageMap) -> BoxFuture<'_, Result<()>> {
        (**self).set(items)
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<()>> {
        (**self).remove(keys)
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        (**self).clear()
    }
}

/// Size an item is charged against quotas: key length plus the length of the
/// value's JSON encoding, the way synced browser storage measures it.
pub fn item_size(key: &str, value: &serde_json::Value) -> usize {
    key.len() + value.to_string().len()
}
