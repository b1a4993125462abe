//! Text extraction with OCR fallback. Direct extraction (lopdf) first;
//! when a document yields no text at all (scanned pages), an `ocrmypdf`
//! pass rebuilds it with a text layer and extraction is retried against
//! the OCR output. Every attempted record gets its completion flag set,
//! success or terminal failure alike, so later runs never re-attempt it.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use tracing::{info, warn};

use crate::artifact::artifact_name;
use crate::partition::Partition;
use crate::record::{AnnouncementRecord, ErrorEntry, ExtractedRecord};

const OCR_BINARY: &str = "ocrmypdf";

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1F\x7F-\x9F]").unwrap());

/// Strip C0/C1 control characters (including line breaks) so the text
/// fits in a single store field.
pub fn clean_text(text: &str) -> String {
    CONTROL_CHARS.replace_all(text, "").into_owned()
}

#[derive(Debug, Default)]
pub struct ExtractStats {
    pub extracted: usize,
    pub skipped: usize,
    pub failures: usize,
}

/// Run extraction over every raw-store record that carries a document
/// reference and is not already marked completed. State is read once up
/// front and the resulting rows are appended in one pass at the end.
pub fn extract_all(partition: &Partition) -> Result<ExtractStats> {
    let rows = partition.load_raw()?;
    if rows.is_empty() {
        info!(
            "Raw store {} is missing or empty, skipping extraction",
            partition.raw_store_path().display()
        );
        return Ok(ExtractStats::default());
    }
    let docs_dir = partition.docs_dir();
    if !docs_dir.is_dir() {
        info!(
            "Document directory {} does not exist, skipping extraction",
            docs_dir.display()
        );
        return Ok(ExtractStats::default());
    }

    let completed = partition.completed_refs()?;
    let mut stats = ExtractStats::default();
    let pending: Vec<&AnnouncementRecord> = rows
        .iter()
        .filter(|r| r.pdf_link.as_deref().is_some_and(|l| !l.is_empty()))
        .filter(|r| {
            let done = completed.contains(r.pdf_link.as_deref().unwrap_or_default());
            if done {
                stats.skipped += 1;
            }
            !done
        })
        .collect();

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec})")?
            .progress_chars("=> "),
    );

    let mut out = Vec::with_capacity(pending.len());
    for record in pending {
        let row = extract_one(partition, record, &docs_dir)?;
        if row.extracted.is_empty() {
            stats.failures += 1;
        } else {
            stats.extracted += 1;
        }
        out.push(row);
        pb.inc(1);
    }
    pb.finish_and_clear();

    if !out.is_empty() {
        partition.append_extracted(&out)?;
        info!(
            "Appended {} rows to {}",
            out.len(),
            partition.extracted_store_path().display()
        );
    }
    info!(
        "Extraction for {}: {} extracted, {} failed terminally, {} already completed",
        partition.date_str(),
        stats.extracted,
        stats.failures,
        stats.skipped
    );
    Ok(stats)
}

/// Extract one record's document. Extraction failures never escape the
/// record boundary: they are written to the error log and resolve to an
/// empty-text row with the completion flag set. Only store I/O errors
/// propagate.
pub fn extract_one(
    partition: &Partition,
    record: &AnnouncementRecord,
    docs_dir: &Path,
) -> Result<ExtractedRecord> {
    let date = partition.date_str();
    let link = record
        .pdf_link
        .as_deref()
        .context("record has no document reference")?;
    let path = docs_dir.join(artifact_name(&record.heading, &record.category, link));

    if !path.is_file() {
        warn!("Artifact for {} not found in {}", link, docs_dir.display());
        partition.log_error(&ErrorEntry {
            heading: record.heading.clone(),
            pdf_link: link.to_string(),
            error: "PDF file not found".into(),
            date: date.clone(),
        })?;
        return Ok(ExtractedRecord::resolved(record, String::new(), &date));
    }

    match extract_with_ocr_fallback(&path) {
        Ok(text) => Ok(ExtractedRecord::resolved(record, clean_text(&text), &date)),
        Err(e) => {
            warn!("Extraction failed for {}: {:#}", link, e);
            partition.log_error(&ErrorEntry {
                heading: record.heading.clone(),
                pdf_link: link.to_string(),
                error: e.to_string(),
                date: date.clone(),
            })?;
            Ok(ExtractedRecord::resolved(record, String::new(), &date))
        }
    }
}

/// Direct extraction, then the OCR pass when the document has no text.
/// The OCR intermediate is deleted once its text is recovered; on failure
/// it is retained next to the original for manual review.
fn extract_with_ocr_fallback(path: &Path) -> Result<String> {
    let text = pdf_text(path)?;
    if !text.trim().is_empty() {
        return Ok(text);
    }

    let ocr_path = ocr_artifact_path(path);
    info!("No text in {}, attempting OCR", path.display());
    ocr_pdf(path, &ocr_path)?;
    let ocr_text = pdf_text(&ocr_path).unwrap_or_default();
    if ocr_text.trim().is_empty() {
        bail!("Text extraction failed even after OCR");
    }
    let _ = fs::remove_file(&ocr_path);
    Ok(ocr_text)
}

/// Concatenated text of all pages, in page order. Pages that fail to
/// decode are skipped.
fn pdf_text(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let mut numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    numbers.sort_unstable();

    let mut text = String::new();
    for number in numbers {
        if let Ok(page_text) = doc.extract_text(&[number]) {
            text.push_str(&page_text);
        }
    }
    Ok(text)
}

/// Path of the OCR intermediate for an artifact: `<stem>_ocr.pdf`.
fn ocr_artifact_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    path.with_file_name(format!("{stem}_ocr.pdf"))
}

/// Rebuild a document with a forced text layer via the `ocrmypdf` binary.
fn ocr_pdf(input: &Path, output: &Path) -> Result<()> {
    let result = Command::new(OCR_BINARY)
        .arg("--deskew")
        .arg("--force-ocr")
        .arg(input)
        .arg(output)
        .output()
        .with_context(|| format!("running {OCR_BINARY}"))?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        bail!("{} exited with {}: {}", OCR_BINARY, result.status, stderr.trim());
    }
    Ok(())
}

// ── Tests ──
