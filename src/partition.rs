//! Per-date partition state: the raw record store, the extracted record
//! store, the error log, the watermark file, and the document directory.
//! These files are the only cross-run memory the pipeline has.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::record::{AnnouncementRecord, ErrorEntry, ExtractedRecord, TIMESTAMP_FORMAT};

/// Partition date format used in file contents and error rows.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

pub struct Partition {
    date: NaiveDate,
    day_dir: PathBuf,
}

impl Partition {
    /// Open (creating directories as needed) the partition for one date:
    /// `<root>/<YYYY>/<MM>/<DD>`.
    pub fn open(root: &Path, date: NaiveDate) -> Result<Self> {
        let day_dir = root
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(date.format("%d").to_string());
        fs::create_dir_all(&day_dir)
            .with_context(|| format!("creating partition directory {}", day_dir.display()))?;
        Ok(Self { date, day_dir })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Partition date as DD-MM-YYYY.
    pub fn date_str(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn day_dir(&self) -> &Path {
        &self.day_dir
    }

    /// Directory holding acquired documents and OCR intermediates.
    pub fn docs_dir(&self) -> PathBuf {
        self.day_dir.join("PDFs")
    }

    pub fn raw_store_path(&self) -> PathBuf {
        let compact = self.date.format("%d%m%Y").to_string();
        self.day_dir.join(format!("{compact}_{compact}.csv"))
    }

    pub fn extracted_store_path(&self) -> PathBuf {
        let compact = self.date.format("%d%m%Y").to_string();
        self.day_dir.join(format!("{compact}_{compact}_extracted.csv"))
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.day_dir.join("extraction_errors.csv")
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.day_dir.join("watermark.txt")
    }

    // ── Watermark ──

    /// Last processed announcement time for this date, if any run has
    /// recorded one.
    pub fn read_watermark(&self) -> Result<Option<NaiveDateTime>> {
        let path = self.watermark_path();
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading watermark {}", path.display()))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
            Ok(ts) => Ok(Some(ts)),
            Err(e) => {
                warn!("Ignoring unparseable watermark {:?}: {}", trimmed, e);
                Ok(None)
            }
        }
    }

    /// Record the last processed time. Monotonic: an earlier value than the
    /// one already on disk is ignored.
    pub fn write_watermark(&self, time: NaiveDateTime) -> Result<()> {
        if let Some(existing) = self.read_watermark()? {
            if time <= existing {
                return Ok(());
            }
        }
        let path = self.watermark_path();
        fs::write(&path, time.format(TIMESTAMP_FORMAT).to_string())
            .with_context(|| format!("writing watermark {}", path.display()))?;
        Ok(())
    }

    // ── Raw store ──

    /// All rows of the raw store, newest first. Missing file reads as
    /// empty; malformed rows are skipped.
    pub fn load_raw(&self) -> Result<Vec<AnnouncementRecord>> {
        read_rows(&self.raw_store_path())
    }

    /// Prepend a batch of newly collected records to the raw store (new
    /// data is newer than anything already present). The store is rewritten
    /// through a temp file and renamed so a crash cannot leave it
    /// half-written.
    pub fn merge_new(&self, batch: &[AnnouncementRecord]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let existing = self.load_raw()?;
        let path = self.raw_store_path();
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            for row in batch.iter().chain(existing.iter()) {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing raw store {}", path.display()))?;
        Ok(batch.len())
    }

    // ── Extracted store ──

    pub fn load_extracted(&self) -> Result<Vec<ExtractedRecord>> {
        read_rows(&self.extracted_store_path())
    }

    /// Document references already attempted and resolved (flag true) in a
    /// prior pass. Re-running extraction skips these entirely.
    pub fn completed_refs(&self) -> Result<HashSet<String>> {
        let refs = self
            .load_extracted()?
            .into_iter()
            .filter(|row| row.flag)
            .filter_map(|row| row.pdf_link)
            .collect();
        Ok(refs)
    }

    /// Append one pass's worth of extracted rows.
    pub fn append_extracted(&self, rows: &[ExtractedRecord]) -> Result<()> {
        append_rows(&self.extracted_store_path(), rows)
    }

    // ── Error log ──

    pub fn log_error(&self, entry: &ErrorEntry) -> Result<()> {
        append_rows(&self.error_log_path(), std::slice::from_ref(entry))
    }

    pub fn load_errors(&self) -> Result<Vec<ErrorEntry>> {
        read_rows(&self.error_log_path())
    }

    // ── Stats ──

    pub fn stats(&self) -> Result<PartitionStats> {
        let raw = self.load_raw()?;
        let with_docs = raw
            .iter()
            .filter(|r| r.pdf_link.as_deref().is_some_and(|l| !l.is_empty()))
            .count();
        let artifacts = match fs::read_dir(self.docs_dir()) {
            Ok(entries) => entries.filter_map(Result::ok).count(),
            Err(_) => 0,
        };
        let extracted = self.load_extracted()?;
        let completed = extracted.iter().filter(|r| r.flag).count();
        Ok(PartitionStats {
            raw_rows: raw.len(),
            with_docs,
            artifacts,
            extracted_rows: extracted.len(),
            completed,
            errors: self.load_errors()?.len(),
            watermark: self
                .read_watermark()?
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        })
    }
}

pub struct PartitionStats {
    pub raw_rows: usize,
    pub with_docs: usize,
    pub artifacts: usize,
    pub extracted_rows: usize,
    pub completed: usize,
    pub errors: usize,
    pub watermark: Option<String>,
}

/// Read all rows of a CSV store. A missing file is an empty store; rows
/// that fail to deserialize are skipped with a warning.
fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping malformed row in {}: {}", path.display(), e),
        }
    }
    Ok(rows)
}

/// Append rows to a CSV store, writing the header only when the file is new.
fn append_rows<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let exists = path.is_file();
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {} for append", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(!exists)
        .from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

// ── Tests ──
