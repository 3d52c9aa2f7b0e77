//! Batched error notifications for chat channels.
//!
//! `claw-notify` collects error occurrences from many call sites, collapses
//! identical errors into a single entry, and periodically sends one compact
//! report per channel and source to a downstream notification worker.
//!
//! # Features
//!
//! - **Fingerprinting**: Errors are keyed by channel, source and a digest of
//!   their text, so repeats update one entry instead of creating new ones
//! - **Bounded Store**: An LRU store caps memory, evicting the least recently
//!   updated entry when full, with an optional age limit
//! - **Grouped Reports**: One chat-friendly report per `(channel, source)`,
//!   capped at ten error types and a configurable character budget
//! - **Flush Triggers**: A periodic timer, an eager flush when the store
//!   fills up, manual flushes, and a final drain on shutdown
//! - **Direct Fallback**: Without batching, errors are sent immediately as
//!   a single line
//!
//! # Example
//!
//! ```rust
//! use claw_notify::{BatchStore, BatchingConfig, ErrorNotifier, NotifyConfig};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> claw_notify::Result<()> {
//! let batching = BatchingConfig::default().with_max_size(20);
//! let store = BatchStore::from_config(&batching)?;
//! let config = NotifyConfig::default()
//!     .with_channel("ops-errors")
//!     .with_batching(batching);
//!
//! // Messages go to the log transport unless another one is supplied
//! let notifier = ErrorNotifier::builder(config).batch_store(store).build()?;
//!
//! notifier
//!     .enqueue(None, &"connection refused", "sync-job", json!({ "attempt": 1 }), vec![])
//!     .await;
//! notifier
//!     .enqueue(None, &"connection refused", "sync-job", json!({ "attempt": 2 }), vec![])
//!     .await;
//! assert_eq!(notifier.pending_len(), 1);
//!
//! let result = notifier.shutdown().await;
//! assert_eq!(result.reports_sent, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/claw-notify/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod aggregator;
pub mod batcher;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod formatter;
pub mod notifier;
pub mod store;
pub mod timer;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use aggregator::group_entries;
pub use batcher::{ErrorNotifier, ErrorNotifierBuilder, FlushResult, FlushTrigger};
pub use config::{BatchingConfig, NotifyConfig};
pub use error::{NotifyError, Result};
pub use fingerprint::{KeyParts, compute_key, error_message, parse_key};
pub use formatter::{BatchReport, format_direct_line, format_group_report, format_time_range};
pub use notifier::{DISPATCH_TIMEOUT, Notifier};
pub use store::{BatchStore, RecordOutcome};
pub use timer::FlushTimer;
pub use transport::{HttpWorkerTransport, LogTransport, WorkerTransport};
pub use types::{ChatMessage, ErrorEntry, ErrorGroup, PayloadRecord};
