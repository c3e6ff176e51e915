//! Chunked persistence for values larger than a single storage item.
//!
//! A logical key `k` is backed by:
//!
//! - `k_chunks`: a string holding the JSON array of chunk keys, in order
//! - `k_chunk_0` .. `k_chunk_{n-1}`: consecutive slices of the value's JSON
//!   encoding, each at most `chunk_size` characters long
//!
//! Reading concatenates the slices in manifest order and parses the result.

use super::{StorageBackend, StorageMap};
use crate::{Error, Result, StoreConfig};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Physical key of the manifest for a logical key
pub fn manifest_key(key: &str) -> String {
    format!("{}_chunks", key)
}

/// Physical key of the `index`-th chunk of a logical key
pub fn chunk_key(key: &str, index: usize) -> String {
    format!("{}_chunk_{}", key, index)
}

/// Whether `physical` is one of the chunk keys `chunk_key(key, i)` can produce
pub fn is_chunk_of(key: &str, physical: &str) -> bool {
    physical
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix("_chunk_"))
        .is_some_and(|idx| !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()))
}

// Deletion sets never reach outside the key's own chunk namespace, whatever
// a manifest claims.
fn owned_chunks(key: &str, keys: Vec<String>) -> Vec<String> {
    let (owned, foreign): (Vec<String>, Vec<String>) = keys.into_iter().partition(|k| is_chunk_of(key, k));
    if !foreign.is_empty() {
        warn!("manifest for '{}' lists foreign keys, leaving them alone: {:?}", key, foreign);
    }
    owned
}

/// Split `text` into slices of at most `chunk_size` characters. Slices never
/// cut through a UTF-8 sequence. An empty input yields no slices.
pub fn split_chunks(text: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(text.len() / chunk_size + 1);
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == chunk_size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// Key-value store that transparently chunks oversized values
pub struct ChunkedStore<B> {
    backend: B,
    config: StoreConfig,
}

impl<B: StorageBackend> ChunkedStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Serialize `value` and persist it under `key` as a manifest plus chunks,
    /// replacing whatever was stored there before.
    ///
    /// The manifest and all chunks go to the backend in one batch. When
    /// `prune_stale_chunks` is set, chunk keys left over from a previous,
    /// longer save are removed afterwards.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        if self.config.chunk_size == 0 {
            return Err(Error::ValidationError("chunk size must be at least 1".to_string()));
        }
        let json = serde_json::to_string(value)?;
        let chunks = split_chunks(&json, self.config.chunk_size);
        let chunk_keys: Vec<String> = (0..chunks.len()).map(|i| chunk_key(key, i)).collect();

        let previous = if self.config.prune_stale_chunks {
            match self.read_manifest(key).await {
                Ok(keys) => keys.unwrap_or_default(),
                Err(Error::ParseError(msg)) => {
                    warn!("ignoring unreadable manifest for '{}': {}", key, msg);
                    Vec::new()
                }
                Err(e) => return Err(e),
            }
        } else {
            Vec::new()
        };

        let mut batch = StorageMap::new();
        batch.insert(manifest_key(key), Value::String(serde_json::to_string(&chunk_keys)?));
        for (part_key, chunk) in chunk_keys.iter().zip(&chunks) {
            batch.insert(part_key.clone(), Value::String((*chunk).to_string()));
        }
        self.backend.set(batch).await?;
        debug!("saved '{}': {} chars in {} chunks", key, json.chars().count(), chunks.len());

        let stale: Vec<String> = owned_chunks(key, previous)
            .into_iter()
            .filter(|k| !chunk_keys.contains(k))
            .collect();
        if !stale.is_empty() {
            debug!("pruning {} stale chunks of '{}'", stale.len(), key);
            self.backend.remove(&stale).await?;
        }
        Ok(())
    }

    /// Reassemble the value stored under `key`.
    ///
    /// Returns `Ok(None)` when no manifest exists. A missing chunk or an
    /// encoding that does not parse is a `ParseError`.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(chunk_keys) = self.read_manifest(key).await? else {
            return Ok(None);
        };

        let stored = self.backend.get(&chunk_keys).await?;
        let mut json = String::new();
        for part_key in &chunk_keys {
            match stored.get(part_key) {
                Some(Value::String(chunk)) => json.push_str(chunk),
                Some(other) => {
                    return Err(Error::ParseError(format!(
                        "chunk '{}' is not a string: {}",
                        part_key, other
                    )))
                }
                None => return Err(Error::ParseError(format!("missing chunk '{}'", part_key))),
            }
        }

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| Error::ParseError(format!("'{}': {}", key, e)))
    }

    /// Like [`load`](Self::load) but treats absence as [`Error::NotFound`]
    pub async fn load_required<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.load(key).await?.ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Read the chunk-key list of a logical key, if any
    pub async fn read_manifest(&self, key: &str) -> Result<Option<Vec<String>>> {
        let mkey = manifest_key(key);
        let found = self.backend.get(std::slice::from_ref(&mkey)).await?;
        match found.get(&mkey) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => serde_json::from_str(s)
                .map(Some)
                .map_err(|e| Error::ParseError(format!("manifest '{}': {}", mkey, e))),
            Some(v @ Value::Array(_)) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| Error::ParseError(format!("manifest '{}': {}", mkey, e))),
            Some(other) => Err(Error::ParseError(format!("manifest '{}' has unexpected shape: {}", mkey, other))),
        }
    }

    /// Remove a logical key: its manifest and every chunk it lists. When the
    /// manifest cannot be read, every stored key in the chunk namespace goes.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut keys = match self.read_manifest(key).await {
            Ok(listed) => owned_chunks(key, listed.unwrap_or_default()),
            Err(Error::ParseError(msg)) => {
                warn!("unreadable manifest for '{}' ({}), removing chunks by key", key, msg);
                let stored = self.backend.get_all().await?;
                stored.into_iter().map(|(k, _)| k).filter(|k| is_chunk_of(key, k)).collect()
            }
            Err(e) => return Err(e),
        };
        keys.push(manifest_key(key));
        self.backend.remove(&keys).await
    }

    /// Read an unchunked value stored directly under `key`
    pub async fn get_raw<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let owned = key.to_string();
        let mut found = self.backend.get(std::slice::from_ref(&owned)).await?;
        match found.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v)
                .map(Some)
                .map_err(|e| Error::ParseError(format!("'{}': {}", key, e))),
        }
    }

    /// Write an unchunked value directly under `key`
    pub async fn set_raw<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let mut batch = StorageMap::new();
        batch.insert(key.to_string(), serde_json::to_value(value)?);
        self.backend.set(batch).await
    }

    /// Every stored item, chunked or not, by physical key
    pub async fn dump(&self) -> Result<StorageMap> {
        self.backend.get_all().await
    }

    /// Remove every persisted key
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn store(chunk_size: usize) -> (Arc<MemoryBackend>, ChunkedStore<Arc<MemoryBackend>>) {
        let backend = Arc::new(MemoryBackend::new());
        let cfg = StoreConfig {
            chunk_size,
            ..StoreConfig::default()
        };
        (Arc::clone(&backend), ChunkedStore::with_config(backend, cfg))
    }

    #[test]
    fn split_respects_char_boundaries() {
        assert_eq!(split_chunks("abcdefg", 3), vec!["abc", "def", "g"]);
        assert_eq!(split_chunks("abc", 3), vec!["abc"]);
        assert_eq!(split_chunks("ñañaña", 4), vec!["ñaña", "ña"]);
        assert!(split_chunks("", 8).is_empty());
    }

    #[test]
    fn key_layout() {
        assert_eq!(manifest_key("widgets"), "widgets_chunks");
        assert_eq!(chunk_key("widgets", 3), "widgets_chunk_3");
        assert!(is_chunk_of("widgets", "widgets_chunk_3"));
        assert!(!is_chunk_of("widgets", "widgets_chunks"));
        assert!(!is_chunk_of("widgets", "widgets_chunk_"));
        assert!(!is_chunk_of("widgets", "widgets_chunk_x"));
        assert!(!is_chunk_of("widgets", "background"));
    }

    #[tokio::test]
    async fn thirty_five_chars_make_four_chunks() {
        let (backend, s) = store(10);
        // ["aaaaaaaaaaaaa","bbbbbbbbbbbbbbb"] is 35 characters
        let value = vec!["a".repeat(13), "b".repeat(15)];
        assert_eq!(serde_json::to_string(&value).unwrap().len(), 35);
        s.save("widgets", &value).await.unwrap();

        let manifest = s.read_manifest("widgets").await.unwrap().unwrap();
        assert_eq!(
            manifest,
            vec!["widgets_chunk_0", "widgets_chunk_1", "widgets_chunk_2", "widgets_chunk_3"]
        );
        assert_eq!(backend.len(), 5);
        let back: Vec<String> = s.load("widgets").await.unwrap().unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn manifest_is_stored_as_json_text() {
        let (backend, s) = store(8192);
        s.save("widgets", &json!([])).await.unwrap();
        let raw = backend.get(&["widgets_chunks".to_string()]).await.unwrap();
        assert_eq!(raw["widgets_chunks"], json!("[\"widgets_chunk_0\"]"));
    }

    #[tokio::test]
    async fn bare_array_manifest_is_accepted() {
        let (backend, s) = store(8192);
        let mut batch = StorageMap::new();
        batch.insert("k_chunks".into(), json!(["k_chunk_0", "k_chunk_1"]));
        batch.insert("k_chunk_0".into(), json!("[1,"));
        batch.insert("k_chunk_1".into(), json!("2]"));
        backend.set(batch).await.unwrap();
        let v: Vec<u32> = s.load("k").await.unwrap().unwrap();
        assert_eq!(v, vec![1, 2]);
    }

    #[tokio::test]
    async fn missing_manifest_is_none_not_empty() {
        let (_, s) = store(8);
        let v: Option<Vec<u32>> = s.load("missing_key").await.unwrap();
        assert!(v.is_none());
        let err = s.load_required::<Vec<u32>>("missing_key").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn missing_chunk_is_a_parse_error() {
        let (backend, s) = store(4);
        s.save("k", &json!({"hello": "world"})).await.unwrap();
        backend.remove(&["k_chunk_1".to_string()]).await.unwrap();
        let err = s.load::<Value>("k").await.unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[tokio::test]
    async fn shrinking_save_prunes_stale_chunks() {
        let (backend, s) = store(4);
        s.save("k", &"x".repeat(30)).await.unwrap();
        assert_eq!(backend.len(), 1 + 8);
        s.save("k", &"y").await.unwrap();
        assert_eq!(backend.keys(), vec!["k_chunk_0".to_string(), "k_chunks".to_string()]);
        assert_eq!(s.load::<String>("k").await.unwrap().unwrap(), "y");
    }

    #[tokio::test]
    async fn stale_chunks_stay_when_pruning_is_off() {
        let backend = Arc::new(MemoryBackend::new());
        let cfg = StoreConfig {
            chunk_size: 4,
            prune_stale_chunks: false,
        };
        let s = ChunkedStore::with_config(Arc::clone(&backend), cfg);
        s.save("k", &"x".repeat(30)).await.unwrap();
        s.save("k", &"y").await.unwrap();
        assert_eq!(backend.len(), 1 + 8);
        assert_eq!(s.load::<String>("k").await.unwrap().unwrap(), "y");
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected() {
        let (_, s) = store(0);
        let err = s.save("k", &1).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn remove_and_raw_values() {
        let (backend, s) = store(4);
        s.save("k", &"long enough value").await.unwrap();
        s.set_raw("gridConfig", &json!({"columns": 4})).await.unwrap();
        s.remove("k").await.unwrap();
        assert_eq!(backend.keys(), vec!["gridConfig".to_string()]);

        let cfg: Option<Value> = s.get_raw("gridConfig").await.unwrap();
        assert_eq!(cfg.unwrap()["columns"], 4);
        assert!(s.get_raw::<Value>("background").await.unwrap().is_none());

        s.clear().await.unwrap();
        assert!(s.dump().await.unwrap().is_empty());
    }
}
