//! Key-value client seam (Redis-shaped).

use super::{ClientResult, StoredValue};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value as JsonValue;
use std::time::Duration;

#[async_trait]
pub trait KeyValueClient: Send + Sync {
    async fn get(&self, key: &str) -> ClientResult<Option<JsonValue>>;

    /// Unconditional write; clears any expiry on the key.
    async fn set(&self, key: &str, value: JsonValue) -> ClientResult<()>;

    /// Write only when the key is absent. Returns `false` if it already existed.
    async fn set_nx(&self, key: &str, value: JsonValue) -> ClientResult<bool>;

    async fn del(&self, key: &str) -> ClientResult<bool>;

    async fn exists(&self, key: &str) -> ClientResult<bool>;

    /// Set a relative expiry. Returns `false` when the key does not exist.
    /// A zero TTL deletes the key.
    async fn expire(&self, key: &str, ttl: Duration) -> ClientResult<bool>;

    /// Keys matching a glob pattern (`*`, `?`, `\` escapes), sorted.
    async fn keys(&self, pattern: &str) -> ClientResult<Vec<String>>;

    async fn ping(&self) -> ClientResult<()>;
}

/// In-process key-value store with lazy TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_if_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, v| v.is_expired());
    }
}

#[async_trait]
impl KeyValueClient for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> ClientResult<Option<JsonValue>> {
        self.purge_if_expired(key);
        Ok(self.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: JsonValue) -> ClientResult<()> {
        self.entries.insert(key.to_string(), StoredValue::new(value));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: JsonValue) -> ClientResult<bool> {
        self.purge_if_expired(key);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(StoredValue::new(value));
                Ok(true)
            }
        }
    }

    async fn del(&self, key: &str) -> ClientResult<bool> {
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired()))
    }

    async fn exists(&self, key: &str) -> ClientResult<bool> {
        self.purge_if_expired(key);
        Ok(self.entries.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> ClientResult<bool> {
        self.purge_if_expired(key);
        if ttl.is_zero() {
            return Ok(self.entries.remove(key).is_some());
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expire_in(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, pattern: &str) -> ClientResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_expired() && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> ClientResult<()> {
        Ok(())
    }
}

/// Redis-style glob: `*` matches any run, `?` one character, `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` and the text index it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    backtrack = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c if c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }
        match backtrack {
            Some((star, absorbed)) => {
                pi = star + 1;
                ti = absorbed + 1;
                backtrack = Some((star, absorbed + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
