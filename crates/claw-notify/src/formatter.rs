//! Chat-friendly rendering of batched error groups.
//!
//! Reports are built incrementally. Before each payload block is appended,
//! the formatter checks whether the report would exceed its character
//! budget, and if so closes the report with a truncation marker instead.

// Allow format string pushing for readability in formatter functions
#![allow(clippy::format_push_string)]

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{ErrorEntry, ErrorGroup, PayloadRecord};

/// Maximum number of distinct error types rendered in one report.
pub const MAX_RENDERED_TYPES: usize = 10;

/// A rendered batch report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// The report text.
    pub text: String,
    /// Whether the character budget cut the report short.
    pub truncated: bool,
    /// Number of error types whose header was rendered.
    pub rendered_types: usize,
}

/// Renders the time range of a group as `HH:MM:SS` or `HH:MM:SS - HH:MM:SS` (UTC).
#[must_use]
pub fn format_time_range(earliest: DateTime<Utc>, latest: DateTime<Utc>) -> String {
    let start = earliest.format("%H:%M:%S").to_string();
    if earliest == latest {
        start
    } else {
        format!("{start} - {}", latest.format("%H:%M:%S"))
    }
}

/// Renders one group into a report of at most `max_message_length`
/// characters, plus the closing truncation marker when one is needed.
///
/// Types are rendered in the group's entry order. Groups built from a
/// drained [`crate::BatchStore`] list the most recently updated types first,
/// so the ten-type cap keeps the errors that are still recurring.
#[must_use]
pub fn format_group_report(group: &ErrorGroup, max_message_length: usize) -> BatchReport {
    let mut report = ReportBuilder::default();
    let type_count = group.type_count();

    report.push(&format!("*Batched Error Report - {}*\n", group.source));
    report.push(&format!(
        "*Summary:* {} errors across {} types ({})\n\n",
        group.total_count,
        type_count,
        format_time_range(group.earliest, group.latest)
    ));

    let mut truncated = false;
    let mut rendered_types = 0;

    'types: for (index, entry) in group.entries.iter().take(MAX_RENDERED_TYPES).enumerate() {
        report.push(&entry_header(entry));
        rendered_types += 1;

        for record in &entry.payloads {
            let block = payload_block(record);
            if report.len + block.chars().count() > max_message_length {
                report.push(&format!(
                    "\n... (truncated, {} more error types)\n",
                    type_count - index
                ));
                truncated = true;
                break 'types;
            }
            report.push(&block);
        }

        report.push("\n");
    }

    if !truncated && type_count > MAX_RENDERED_TYPES {
        report.push(&format!(
            "... and {} more error types\n",
            type_count - MAX_RENDERED_TYPES
        ));
    }

    BatchReport {
        text: report.text,
        truncated,
        rendered_types,
    }
}

/// Renders an error and its extras as a single direct-log line.
#[must_use]
pub fn format_direct_line(message: &str, extras: &[Value]) -> String {
    let mut line = message.to_string();
    for extra in extras {
        line.push(' ');
        match extra {
            Value::String(s) => line.push_str(s),
            other => line.push_str(&other.to_string()),
        }
    }
    line
}

fn entry_header(entry: &ErrorEntry) -> String {
    format!(
        "• *{}* ({}x)\n  Payloads:\n",
        entry.error_message, entry.count
    )
}

fn payload_block(record: &PayloadRecord) -> String {
    let mut block = format!("    - {}\n", record.payload);
    if !record.extras.is_empty() {
        block.push_str(&format!(
            "     Extras: {}\n",
            Value::Array(record.extras.clone())
        ));
    }
    block
}

/// Accumulates report text while tracking its length in characters.
#[derive(Default)]
struct ReportBuilder {
    text: String,
    len: usize,
}

impl ReportBuilder {
    fn push(&mut self, s: &str) {
        self.len += s.chars().count();
        self.text.push_str(s);
    }
}
