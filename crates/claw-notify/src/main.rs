//! claw-notify - batched error notifier
//!
//! Reads error lines from stdin and reports them through the batching
//! notifier. Each line is either `<source>\t<message>` or a bare message
//! attributed to `--source`.
//!
//! ```bash
//! printf 'sync\tconnection refused\nsync\tconnection refused\n' | claw-notify --channel ops
//! ```
//!
//! The store is drained at end of input.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use claw_notify::{
    BatchStore, DISPATCH_TIMEOUT, ErrorNotifier, HttpWorkerTransport, LogTransport, NotifyConfig,
    WorkerTransport,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "claw-notify")]
#[command(about = "Batch error lines from stdin into chat notifications")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, env = "CLAW_NOTIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Channel for every line (defaults to the configured channel)
    #[arg(long)]
    channel: Option<String>,

    /// Source used for lines without a tab-separated source
    #[arg(long, default_value = "stdin")]
    source: String,

    /// Base URL of the notification worker; logs messages when absent
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays free for piping
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive("claw_notify=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => NotifyConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => NotifyConfig::default(),
    };

    let transport: Arc<dyn WorkerTransport> = match &cli.endpoint {
        Some(url) => Arc::new(
            HttpWorkerTransport::new(url.as_str(), DISPATCH_TIMEOUT)
                .context("failed to create worker transport")?,
        ),
        None => Arc::new(LogTransport),
    };

    let mut builder = ErrorNotifier::builder(config.clone()).transport(transport);
    if let Some(batching) = &config.error_batching {
        builder = builder.batch_store(BatchStore::from_config(batching)?);
    }
    let notifier = builder.build()?;

    info!(
        batching = notifier.is_batching(),
        worker = %config.worker,
        "claw-notify starting"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no: u64 = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read error");
                break;
            }
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        let (source, message) = split_line(&line, &cli.source);
        notifier
            .enqueue(
                cli.channel.as_deref(),
                &message,
                source,
                json!({ "line": line_no }),
                vec![],
            )
            .await;
    }

    let result = notifier.shutdown().await;
    info!(
        lines = line_no,
        reports = result.reports_sent,
        failures = result.report_failures,
        "claw-notify shutting down"
    );
    Ok(())
}

/// Splits `<source>\t<message>`; lines without a tab use `default_source`.
fn split_line<'a>(line: &'a str, default_source: &'a str) -> (&'a str, &'a str) {
    match line.split_once('\t') {
        Some((source, message)) if !source.trim().is_empty() => (source.trim(), message),
        _ => (default_source, line),
    }
}
