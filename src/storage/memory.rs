//! In-memory storage backend with optional synced-storage quotas

use super::{item_size, StorageBackend, StorageMap};
use crate::{Error, Result};
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Mutex;

/// Limits enforced on every `set` batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quota {
    /// Maximum size of a single item (key plus encoded value)
    pub bytes_per_item: Option<usize>,
    /// Maximum total size of all items
    pub total_bytes: Option<usize>,
    /// Maximum number of stored items
    pub max_items: Option<usize>,
}

impl Quota {
    /// No limits at all
    pub const UNLIMITED: Quota = Quota {
        bytes_per_item: None,
        total_bytes: None,
        max_items: None,
    };

    /// The limits of the browser's synced storage area
    pub const SYNC: Quota = Quota {
        bytes_per_item: Some(8192),
        total_bytes: Some(102_400),
        max_items: Some(512),
    };
}

/// Backend that keeps items in a `Mutex<HashMap>`.
///
/// A rejected batch leaves the stored items untouched.
pub struct MemoryBackend {
    items: Mutex<HashMap<String, serde_json::Value>>,
    quota: Quota,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_quota(Quota::UNLIMITED)
    }

    pub fn with_quota(quota: Quota) -> Self {
        MemoryBackend {
            items: Mutex::new(HashMap::new()),
            quota,
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of stored keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Total bytes charged against the quota
    pub fn bytes_in_use(&self) -> usize {
        self.lock()
            .map(|items| items.iter().map(|(k, v)| item_size(k, v)).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, serde_json::Value>>> {
        self.items
            .lock()
            .map_err(|_| Error::BackendError("memory backend lock poisoned".to_string()))
    }

    fn check_quota(&self, current: &HashMap<String, serde_json::Value>, batch: &StorageMap) -> Result<()> {
        if let Some(limit) = self.quota.bytes_per_item {
            for (key, value) in batch {
                let size = item_size(key, value);
                if size > limit {
                    return Err(Error::BackendError(format!(
                        "QUOTA_BYTES_PER_ITEM exceeded for '{}' ({} > {})",
                        key, size, limit
                    )));
                }
            }
        }

        if self.quota.total_bytes.is_none() && self.quota.max_items.is_none() {
            return Ok(());
        }

        let mut total = 0usize;
        let mut count = 0usize;
        for (key, value) in current.iter().filter(|(k, _)| !batch.contains_key(*k)) {
            total += item_size(key, value);
            count += 1;
        }
        for (key, value) in batch {
            total += item_size(key, value);
            count += 1;
        }

        if let Some(limit) = self.quota.total_bytes {
            if total > limit {
                return Err(Error::BackendError(format!("QUOTA_BYTES exceeded ({} > {})", total, limit)));
            }
        }
        if let Some(limit) = self.quota.max_items {
            if count > limit {
                return Err(Error::BackendError(format!("MAX_ITEMS exceeded ({} > {})", count, limit)));
            }
        }
        Ok(())
    }

    fn get_sync(&self, keys: &[String]) -> Result<StorageMap> {
        let items = self.lock()?;
        Ok(keys
            .iter()
            .filter_map(|k| items.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    fn set_sync(&self, batch: StorageMap) -> Result<()> {
        let mut items = self.lock()?;
        self.check_quota(&items, &batch)?;
        items.extend(batch);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn get<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<StorageMap>> {
        future::ready(self.get_sync(keys)).boxed()
    }

    fn get_all(&self) -> BoxFuture<'_, Result<StorageMap>> {
        let res = self
            .lock()
            .map(|items| items.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        future::ready(res).boxed()
    }

    fn set(&self, items: StorageMap) -> BoxFuture<'_, Result<()>> {
        future::ready(self.set_sync(items)).boxed()
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<()>> {
        let res = self.lock().map(|mut items| {
            for key in keys {
                items.remove(key);
            }
        });
        future::ready(res).boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        future::ready(self.lock().map(|mut items| items.clear())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(pairs: &[(&str, serde_json::Value)]) -> StorageMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn set_get_remove_clear() {
        let m = MemoryBackend::new();
        m.set(batch(&[("a", json!(1)), ("b", json!("two"))])).await.unwrap();
        let got = m.get(&["a".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));

        m.remove(&["a".to_string()]).await.unwrap();
        assert_eq!(m.keys(), vec!["b".to_string()]);

        m.clear().await.unwrap();
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn oversized_item_rejects_whole_batch() {
        let m = MemoryBackend::with_quota(Quota {
            bytes_per_item: Some(16),
            ..Quota::UNLIMITED
        });
        let err = m
            .set(batch(&[("ok", json!("x")), ("big", json!("x".repeat(32)))]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendError(_)));
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn total_quota_counts_replaced_items_once() {
        let m = MemoryBackend::with_quota(Quota {
            total_bytes: Some(20),
            ..Quota::UNLIMITED
        });
        // "k" + "\"0123456789\"" = 13 bytes
        m.set(batch(&[("k", json!("0123456789"))])).await.unwrap();
        m.set(batch(&[("k", json!("9876543210"))])).await.unwrap();
        assert_eq!(m.bytes_in_use(), 13);
        assert!(m.set(batch(&[("j", json!("0123456789"))])).await.is_err());
    }

    #[tokio::test]
    async fn max_items_is_enforced() {
        let m = MemoryBackend::with_quota(Quota {
            max_items: Some(2),
            ..Quota::UNLIMITED
        });
        m.set(batch(&[("a", json!(1)), ("b", json!(2))])).await.unwrap();
        assert!(m.set(batch(&[("c", json!(3))])).await.is_err());
        assert_eq!(m.len(), 2);
    }
}
