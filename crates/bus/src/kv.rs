// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value buckets backed by the broker.
//!
//! The bucket offers last-writer-wins semantics; callers must tolerate the
//! occasional lost append under concurrent writers.

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;

/// KV errors
#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv unavailable: {0}")]
    Unavailable(String),

    #[error("kv conflict: {0}")]
    Conflict(String),
}

/// A durable key/value bucket.
#[async_trait]
pub trait KvBucket: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// All keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

/// NATS JetStream KV bucket.
pub struct NatsKv {
    store: async_nats::jetstream::kv::Store,
}

impl NatsKv {
    pub fn new(store: async_nats::jetstream::kv::Store) -> Self {
        Self { store }
    }

    // NATS KV keys cannot contain ':'; the memory schema uses it as a
    // separator, so it is mapped to '/' on the wire.
    fn encode_key(key: &str) -> String {
        key.replace(':', "/")
    }

    fn decode_key(key: &str) -> String {
        key.replace('/', ":")
    }
}

#[async_trait]
impl KvBucket for NatsKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.store
            .get(Self::encode_key(key))
            .await
            .map(|entry| entry.map(|bytes| bytes.to_vec()))
            .map_err(|e| KvError::Unavailable(e.to_string()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        self.store
            .put(Self::encode_key(key), value.into())
            .await
            .map(|_| ())
            .map_err(|e| KvError::Unavailable(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.store
            .delete(Self::encode_key(key))
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let lister = self
            .store
            .keys()
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))?;

        let raw: Vec<Result<String, _>> = lister.collect().await;
        let mut keys: Vec<String> = raw
            .into_iter()
            .filter_map(|k| k.ok())
            .map(|k| Self::decode_key(&k))
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// In-memory KV bucket for tests.
#[cfg(any(test, feature = "test-support"))]
pub struct MemoryKv {
    map: parking_lot::Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemoryKv {
    pub fn new() -> Self {
        Self {
            map: parking_lot::Mutex::new(std::collections::BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl KvBucket for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.map.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        self.map.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.map.lock().remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .map
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
