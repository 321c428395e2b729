//! Subcommand implementations.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use firehose_delivery_client::{DeliveryClient, HttpIngestSink};
use run_document_store::RunDocumentStore;
use run_metadata_streamer::{BackfillSummary, MetadataStreamer};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::AppConfig;

type HttpStreamer = MetadataStreamer<RunDocumentStore, HttpIngestSink>;

async fn open_streamer(config: &AppConfig) -> Result<HttpStreamer> {
    let store = RunDocumentStore::open(&config.store_path)
        .await
        .with_context(|| format!("failed to open store {}", config.store_path.display()))?;
    let client = DeliveryClient::connect_http(config.delivery.clone()).await?;
    Ok(MetadataStreamer::new(store, client))
}

fn print_summary(label: &str, summary: &BackfillSummary) {
    println!(
        "{label}: {} documents read, {} failed; {} records sent, {} failed",
        summary.documents_read,
        summary.documents_failed,
        summary.records_sent,
        summary.records_failed
    );
}

fn finish(label: &str, summary: BackfillSummary) -> Result<()> {
    print_summary(label, &summary);
    if summary.aborted {
        bail!("{label} stopped early: the sink rejected our credentials");
    }
    Ok(())
}

/// Stream one run, from the store by id or from a JSON file.
pub async fn stream(config: &AppConfig, run_id: Option<&str>, file: Option<&Path>) -> Result<()> {
    let streamer = open_streamer(config).await?;
    let outcome = match (run_id, file) {
        (Some(run_id), _) => streamer.stream_by_id(run_id).await?,
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let document: Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            streamer.stream_one(&document).await?
        }
        (None, None) => bail!("either --run-id or --file is required"),
    };

    println!(
        "stream: {} records delivered, {} failed",
        outcome.delivered, outcome.failed
    );
    for failure in &outcome.failures {
        println!(
            "  record {}: {} {}",
            failure.index,
            failure.error_code.as_deref().unwrap_or("-"),
            failure.message
        );
    }
    Ok(())
}

pub async fn backfill(config: &AppConfig, limit: usize) -> Result<()> {
    let streamer = open_streamer(config).await?;
    let summary = streamer.backfill(limit).await?;
    finish("backfill", summary)
}

pub async fn since(config: &AppConfig, since: DateTime<Utc>) -> Result<()> {
    let streamer = open_streamer(config).await?;
    let summary = streamer.stream_since(since).await?;
    finish("since", summary)
}

/// Parse a JSON array or a JSONL file into documents.
pub fn read_documents(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("invalid JSON array");
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid JSON on line {}", n + 1))
        })
        .collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub saved: usize,
    pub rejected: usize,
}

pub async fn import_into(store: &RunDocumentStore, documents: &[Value]) -> ImportReport {
    let mut report = ImportReport::default();
    for (n, document) in documents.iter().enumerate() {
        match store.save(document).await {
            Ok(run_id) => {
                report.saved += 1;
                info!(run_id = %run_id, "Imported run document");
            }
            Err(e) => {
                report.rejected += 1;
                warn!(position = n, error = %e, "Skipping document");
            }
        }
    }
    report
}

/// Load run documents from a file into the store. No network access.
pub async fn import(config: &AppConfig, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let documents = read_documents(&raw)?;
    let store = RunDocumentStore::open(&config.store_path)
        .await
        .with_context(|| format!("failed to open store {}", config.store_path.display()))?;

    let report = import_into(&store, &documents).await;
    println!(
        "import: {} saved, {} rejected ({} in store)",
        report.saved,
        report.rejected,
        store.count().await?
    );
    Ok(())
}

/// Verify sink credentials and the store without sending anything.
pub async fn check(config: &AppConfig) -> Result<()> {
    let client = DeliveryClient::connect_http(config.delivery.clone()).await?;
    let identity = client.identity();
    println!(
        "sink: ok (stream {}, account {}, arn {})",
        config.delivery.stream_name,
        identity.account.as_deref().unwrap_or("unknown"),
        identity.arn.as_deref().unwrap_or("unknown")
    );

    let store = RunDocumentStore::open(&config.store_path).await?;
    println!(
        "store: ok ({} documents in {})",
        store.count().await?,
        config.store_path.display()
    );
    Ok(())
}
