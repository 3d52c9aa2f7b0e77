//! Bounded store of aggregated error entries.
//!
//! The store is an LRU cache keyed by fingerprint. When it is full, the
//! least recently updated entry is evicted. Iteration and draining yield the
//! most recently updated entries first. With an age limit configured,
//! entries whose `last_seen` is older than the limit are treated as absent
//! and purged lazily.

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tracing::{debug, warn};

use crate::config::BatchingConfig;
use crate::error::{NotifyError, Result};
use crate::types::{ErrorEntry, PayloadRecord};

/// Outcome of recording one occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Occurrence count of the entry after recording.
    pub count: u64,
    /// Whether a new entry was created.
    pub created: bool,
    /// Number of entries in the store after recording.
    pub len: usize,
}

/// A bounded map from fingerprint to [`ErrorEntry`].
#[derive(Debug)]
pub struct BatchStore {
    entries: LruCache<String, ErrorEntry>,
    max_age: Option<chrono::Duration>,
}

impl BatchStore {
    /// Creates a store holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| NotifyError::InvalidConfig {
            reason: "batch store capacity must be greater than zero".to_string(),
        })?;

        Ok(Self {
            entries: LruCache::new(capacity),
            max_age: None,
        })
    }

    /// Creates a store sized and aged from batching settings.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if the settings are invalid.
    pub fn from_config(config: &BatchingConfig) -> Result<Self> {
        config.validate()?;
        let store = Self::new(config.effective_store_capacity())?;
        match config.max_age() {
            Some(age) => store.with_max_age(age),
            None => Ok(store),
        }
    }

    /// Sets the maximum age of an entry, measured from its last occurrence.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if the age is zero or out of range.
    pub fn with_max_age(mut self, max_age: Duration) -> Result<Self> {
        if max_age.is_zero() {
            return Err(NotifyError::InvalidConfig {
                reason: "batch store max age must be greater than zero".to_string(),
            });
        }
        let age = chrono::Duration::from_std(max_age).map_err(|e| NotifyError::InvalidConfig {
            reason: format!("batch store max age out of range: {e}"),
        })?;
        self.max_age = Some(age);
        Ok(self)
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Returns the number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets a live entry by fingerprint.
    pub fn get(&mut self, key: &str) -> Option<&ErrorEntry> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<&ErrorEntry> {
        if self.entries.peek(key).is_some_and(|e| self.is_expired(e, now)) {
            self.entries.pop(key);
            return None;
        }
        self.entries.peek(key)
    }

    /// Inserts or replaces an entry.
    ///
    /// Returns the entry evicted to make room, if any.
    pub fn upsert(&mut self, key: impl Into<String>, entry: ErrorEntry) -> Option<ErrorEntry> {
        let key = key.into();
        match self.entries.push(key.clone(), entry) {
            Some((evicted_key, evicted)) if evicted_key != key => {
                debug!(
                    fingerprint = %evicted_key,
                    count = evicted.count,
                    "batch store full, evicted least recently updated entry"
                );
                Some(evicted)
            }
            _ => None,
        }
    }

    /// Creates or updates the entry for `key` with one occurrence.
    pub fn record(
        &mut self,
        key: &str,
        message: &str,
        source: &str,
        channel: &str,
        record: PayloadRecord,
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        // Drop a stale entry so the occurrence starts a fresh one.
        let _ = self.get_at(key, now);

        if let Some(entry) = self.entries.get_mut(key) {
            entry.record(record, now);
            let count = entry.count;
            return RecordOutcome {
                count,
                created: false,
                len: self.entries.len(),
            };
        }

        self.upsert(
            key.to_string(),
            ErrorEntry::new(message, source, channel, record, now),
        );
        RecordOutcome {
            count: 1,
            created: true,
            len: self.entries.len(),
        }
    }

    /// Iterates over live entries, most recently updated first.
    pub fn iter_all(&self) -> impl Iterator<Item = (&String, &ErrorEntry)> + '_ {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(move |(_, entry)| !self.is_expired(entry, now))
    }

    /// Removes and returns every live entry, most recently updated first.
    ///
    /// The store is empty afterwards.
    pub fn drain(&mut self) -> Vec<ErrorEntry> {
        self.drain_at(Utc::now())
    }

    fn drain_at(&mut self, now: DateTime<Utc>) -> Vec<ErrorEntry> {
        let mut drained = Vec::with_capacity(self.entries.len());
        let mut expired = 0usize;

        while let Some((_, entry)) = self.entries.pop_lru() {
            if self.is_expired(&entry, now) {
                expired += 1;
            } else {
                drained.push(entry);
            }
        }

        if expired > 0 {
            warn!(expired, "dropped expired entries while draining batch store");
        }
        drained.reverse();
        drained
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn is_expired(&self, entry: &ErrorEntry, now: DateTime<Utc>) -> bool {
        self.max_age
            .is_some_and(|age| now.signed_duration_since(entry.last_seen) > age)
    }
}
