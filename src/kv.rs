//! Key-value store abstraction.
//!
//! Everything the application persists goes through [`KeyValueStore`]:
//! string keys, string values, an optional byte quota. [`MemoryStore`] backs
//! tests and can simulate quota pressure or an unavailable store;
//! [`crate::db::Database`] is the on-disk implementation.

use std::collections::BTreeMap;

use crate::error::{StoreError, StoreResult};

pub trait KeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;
    fn remove(&mut self, key: &str) -> StoreResult<()>;
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Bytes used by all entries, keys included.
    fn total_bytes(&self) -> StoreResult<usize> {
        let mut total = 0;
        for key in self.keys()? {
            total += key.len();
            total += self.get(&key)?.map(|v| v.len()).unwrap_or(0);
        }
        Ok(total)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
    forced_quota_failures: usize,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        MemoryStore {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// A store that rejects every operation.
    pub fn unavailable() -> Self {
        MemoryStore {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Make the next `count` writes fail with [`StoreError::QuotaExceeded`].
    pub fn fail_next_writes(&mut self, count: usize) {
        self.forced_quota_failures = count;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_available()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.check_available()?;

        if self.forced_quota_failures > 0 {
            self.forced_quota_failures -= 1;
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
                needed: key.len() + value.len(),
                limit: self.quota.unwrap_or(0),
            });
        }

        if let Some(limit) = self.quota {
            let existing = self
                .entries
                .get(key)
                .map(|v| key.len() + v.len())
                .unwrap_or(0);
            let needed = self.total_bytes()? - existing + key.len() + value.len();
            if needed > limit {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }

        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.check_available()?;
        Ok(self.entries.keys().cloned().collect())
    }
}
