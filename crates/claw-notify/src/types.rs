//! Core types for batched error notifications.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of most recent contributions kept per entry.
pub const PAYLOAD_WINDOW: usize = 3;

/// One contribution to an entry: the payload plus any extra values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadRecord {
    /// The payload supplied with the occurrence.
    pub payload: Value,
    /// Additional values supplied with the occurrence.
    pub extras: Vec<Value>,
}

impl PayloadRecord {
    /// Creates a new payload record.
    #[must_use]
    pub const fn new(payload: Value, extras: Vec<Value>) -> Self {
        Self { payload, extras }
    }
}

/// Aggregated state for one fingerprint between flushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// The first-seen error text.
    pub error_message: String,
    /// The source (function, job, component) that reported the error.
    pub source_name: String,
    /// The channel the notification is destined for.
    pub req_channel: String,
    /// Number of occurrences since the last flush.
    pub count: u64,
    /// The most recent contributions, oldest first.
    pub payloads: VecDeque<PayloadRecord>,
    /// When the fingerprint was first seen.
    pub first_seen: DateTime<Utc>,
    /// When the fingerprint was last seen.
    pub last_seen: DateTime<Utc>,
}

impl ErrorEntry {
    /// Creates an entry for the first occurrence of a fingerprint.
    #[must_use]
    pub fn new(
        error_message: impl Into<String>,
        source_name: impl Into<String>,
        req_channel: impl Into<String>,
        record: PayloadRecord,
        now: DateTime<Utc>,
    ) -> Self {
        let mut payloads = VecDeque::with_capacity(PAYLOAD_WINDOW);
        payloads.push_back(record);

        Self {
            error_message: error_message.into(),
            source_name: source_name.into(),
            req_channel: req_channel.into(),
            count: 1,
            payloads,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Records a repeat occurrence.
    ///
    /// The window drops its oldest record once it already holds
    /// [`PAYLOAD_WINDOW`] records. `last_seen` never moves backwards.
    pub fn record(&mut self, record: PayloadRecord, now: DateTime<Utc>) {
        self.count = self.count.saturating_add(1);
        if now > self.last_seen {
            self.last_seen = now;
        }
        if self.payloads.len() >= PAYLOAD_WINDOW {
            self.payloads.pop_front();
        }
        self.payloads.push_back(record);
    }
}

/// Entries sharing a `(channel, source)` pair, aggregated for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorGroup {
    /// The destination channel.
    pub channel: String,
    /// The reporting source.
    pub source: String,
    /// Entries in discovery order.
    pub entries: Vec<ErrorEntry>,
    /// Sum of all entry counts.
    pub total_count: u64,
    /// Earliest `first_seen` across entries.
    pub earliest: DateTime<Utc>,
    /// Latest `last_seen` across entries.
    pub latest: DateTime<Utc>,
}

impl ErrorGroup {
    /// Starts a group from its first entry.
    #[must_use]
    pub fn new(entry: ErrorEntry) -> Self {
        Self {
            channel: entry.req_channel.clone(),
            source: entry.source_name.clone(),
            total_count: entry.count,
            earliest: entry.first_seen,
            latest: entry.last_seen,
            entries: vec![entry],
        }
    }

    /// Adds an entry and updates the aggregates.
    pub fn push(&mut self, entry: ErrorEntry) {
        self.total_count = self.total_count.saturating_add(entry.count);
        self.earliest = self.earliest.min(entry.first_seen);
        self.latest = self.latest.max(entry.last_seen);
        self.entries.push(entry);
    }

    /// Returns the number of distinct error types in the group.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.entries.len()
    }
}

/// One message handed to the notification worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Target channel.
    pub channel: String,
    /// Message body.
    pub text: String,
}

impl ChatMessage {
    /// Creates a new chat message.
    #[must_use]
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
        }
    }
}
