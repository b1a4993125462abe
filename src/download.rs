//! Document acquisition. One artifact per unique deterministic name; an
//! artifact already on disk is never fetched again, so re-running the
//! download stage is free.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tracing::{info, warn};

use crate::artifact::artifact_name;
use crate::partition::Partition;
use crate::record::AnnouncementRecord;

// The portal rejects clients without a browser User-Agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Default)]
pub struct DownloadStats {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub enum DownloadOutcome {
    Fetched,
    Skipped,
}

pub fn client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("building HTTP client")
}

/// Fetch every referenced document of the partition's raw store that is
/// not already on disk. Fetches run strictly one at a time; failures are
/// logged and skipped, never fatal to the stage.
pub async fn download_all(client: &Client, partition: &Partition) -> Result<DownloadStats> {
    let rows = partition.load_raw()?;
    if rows.is_empty() {
        info!(
            "Raw store {} is missing or empty, skipping downloads",
            partition.raw_store_path().display()
        );
        return Ok(DownloadStats::default());
    }

    let docs_dir = partition.docs_dir();
    fs::create_dir_all(&docs_dir)
        .with_context(|| format!("creating {}", docs_dir.display()))?;

    let with_docs: Vec<&AnnouncementRecord> = rows
        .iter()
        .filter(|r| r.pdf_link.as_deref().is_some_and(|l| !l.is_empty()))
        .collect();

    let pb = ProgressBar::new(with_docs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let mut stats = DownloadStats::default();
    for record in with_docs {
        match download_one(client, record, &docs_dir).await {
            Ok(DownloadOutcome::Fetched) => stats.fetched += 1,
            Ok(DownloadOutcome::Skipped) => stats.skipped += 1,
            Err(e) => {
                warn!("Download failed for {}: {:#}", record.heading, e);
                stats.failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Downloads for {}: {} fetched, {} already present, {} failed",
        partition.date_str(),
        stats.fetched,
        stats.skipped,
        stats.failed
    );
    Ok(stats)
}

/// Fetch a single record's document into `docs_dir` under its
/// deterministic name. No-op if the artifact already exists. The body is
/// read in full before anything is written, so a failed fetch leaves no
/// partial artifact.
pub async fn download_one(
    client: &Client,
    record: &AnnouncementRecord,
    docs_dir: &Path,
) -> Result<DownloadOutcome> {
    let link = record
        .pdf_link
        .as_deref()
        .context("record has no document reference")?;
    let name = artifact_name(&record.heading, &record.category, link);
    let path = docs_dir.join(&name);
    if path.is_file() {
        return Ok(DownloadOutcome::Skipped);
    }

    let response = client
        .get(link)
        .send()
        .await
        .with_context(|| format!("fetching {link}"))?;
    if !response.status().is_success() {
        bail!("fetch of {} returned status {}", link, response.status());
    }
    let body = response
        .bytes()
        .await
        .with_context(|| format!("reading body of {link}"))?;
    fs::write(&path, &body).with_context(|| format!("writing {}", path.display()))?;
    Ok(DownloadOutcome::Fetched)
}

// ── Tests ──
