//! Paginated collection of announcement rows for one date, driven through
//! the `PageSource` seam. The portal has no "since" query, so incremental
//! behaviour rests entirely on the per-partition watermark: rows at or
//! below it are discarded, and because the source returns rows newest
//! first, the first fully-filtered page ends pagination.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::partition::Partition;
use crate::record::AnnouncementRecord;

/// Interface to the page-rendering collaborator. Implementations own all
/// rendering and form-interaction mechanics; the collector only drives
/// date selection and pagination.
pub trait PageSource {
    fn select_date(&mut self, date: NaiveDate) -> Result<()>;
    fn submit(&mut self) -> Result<()>;
    fn has_next_page(&self) -> bool;
    fn next_page(&mut self) -> Result<()>;
    fn current_page_rows(&mut self) -> Result<Vec<AnnouncementRecord>>;
}

/// Collect all announcements newer than the partition's watermark, merge
/// them into the raw store (newest first) and advance the watermark to the
/// newest timestamp in the batch. Returns the number of merged rows.
///
/// A select/submit failure (e.g. a rendering timeout) aborts collection
/// for this date with the partition untouched; the next scheduled run is
/// the retry.
pub fn collect(source: &mut dyn PageSource, partition: &Partition) -> Result<usize> {
    let watermark = partition.read_watermark()?;
    source
        .select_date(partition.date())
        .with_context(|| format!("selecting date {}", partition.date_str()))?;
    source.submit().context("submitting announcements query")?;

    let mut collected: Vec<AnnouncementRecord> = Vec::new();
    let mut page = 1usize;
    loop {
        let rows = source.current_page_rows()?;
        if rows.is_empty() {
            break;
        }
        let fresh: Vec<AnnouncementRecord> = match watermark {
            // Rows without a parseable timestamp cannot be ordered against
            // the watermark and are discarded with the stale ones.
            Some(wm) => rows
                .into_iter()
                .filter(|r| r.timestamp().is_some_and(|t| t > wm))
                .collect(),
            None => rows,
        };
        info!("Page {page}: {} new rows", fresh.len());
        let exhausted = fresh.is_empty();
        collected.extend(fresh);
        if exhausted || !source.has_next_page() {
            break;
        }
        source.next_page()?;
        page += 1;
    }

    if collected.is_empty() {
        info!("No new announcements for {}", partition.date_str());
        return Ok(0);
    }

    let newest = collected.iter().filter_map(AnnouncementRecord::timestamp).max();
    let merged = partition.merge_new(&collected)?;
    if let Some(t) = newest {
        partition.write_watermark(t)?;
    }
    info!("Merged {merged} new rows into {}", partition.raw_store_path().display());
    Ok(merged)
}

/// Page source replaying rows captured by the rendering layer: a JSON file
/// holding an array of pages, each an array of announcement rows in the
/// portal's newest-first order.
pub struct ReplayPageSource {
    pages: Vec<Vec<AnnouncementRecord>>,
    current: usize,
}

impl ReplayPageSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("opening captured pages {}", path.display()))?;
        let pages = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing captured pages {}", path.display()))?;
        Ok(Self { pages, current: 0 })
    }
}

impl PageSource for ReplayPageSource {
    fn select_date(&mut self, _date: NaiveDate) -> Result<()> {
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        Ok(())
    }

    fn has_next_page(&self) -> bool {
        self.current + 1 < self.pages.len()
    }

    fn next_page(&mut self) -> Result<()> {
        if !self.has_next_page() {
            bail!("no further page");
        }
        self.current += 1;
        Ok(())
    }

    fn current_page_rows(&mut self) -> Result<Vec<AnnouncementRecord>> {
        Ok(self.pages.get(self.current).cloned().unwrap_or_default())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(heading: &str, insider: &str) -> AnnouncementRecord {
        AnnouncementRecord {
            heading: heading.into(),
            announcement: format!("{heading} body"),
            insider: insider.into(),
            pdf_link: None,
            category: "Company Update".into(),
        }
    }

    /// In-memory source that also records how far pagination went.
    struct FakeSource {
        pages: Vec<Vec<AnnouncementRecord>>,
        current: usize,
        pages_visited: usize,
        fail_select: bool,
    }

    impl FakeSource {
        fn new(pages: Vec<Vec<AnnouncementRecord>>) -> Self {
            Self { pages, current: 0, pages_visited: 1, fail_select: false }
        }
    }

    impl PageSource for FakeSource {
        fn select_date(&mut self, _date: NaiveDate) -> Result<()> {
            if self.fail_select {
                bail!("timed out waiting for datepicker");
            }
            Ok(())
        }
        fn submit(&mut self) -> Result<()> {
            Ok(())
        }
        fn has_next_page(&self) -> bool {
            self.current + 1 < self.pages.len()
        }
        fn next_page(&mut self) -> Result<()> {
            self.current += 1;
            self.pages_visited += 1;
            Ok(())
        }
        fn current_page_rows(&mut self) -> Result<Vec<AnnouncementRecord>> {
            Ok(self.pages.get(self.current).cloned().unwrap_or_default())
        }
    }

    fn open_partition(root: &Path) -> Partition {
        Partition::open(root, NaiveDate::from_ymd_opt(2024, 10, 4).unwrap()).unwrap()
    }

    #[test]
    fn first_run_merges_all_and_sets_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let p = open_partition(dir.path());
        let mut source = FakeSource::new(vec![vec![
            record("A", "04-10-2024 10:00:00"),
            record("B", "04-10-2024 09:30:00"),
            record("C", "04-10-2024 09:00:00"),
        ]]);

        assert_eq!(collect(&mut source, &p).unwrap(), 3);
        assert_eq!(p.load_raw().unwrap().len(), 3);
        let wm = p.read_watermark().unwrap().unwrap();
        assert_eq!(wm.format("%H:%M:%S").to_string(), "10:00:00");
    }

    #[test]
    fn second_run_against_unchanged_source_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let p = open_partition(dir.path());
        let pages = vec![vec![
            record("A", "04-10-2024 10:00:00"),
            record("B", "04-10-2024 09:30:00"),
            record("C", "04-10-2024 09:00:00"),
        ]];

        let mut first = FakeSource::new(pages.clone());
        collect(&mut first, &p).unwrap();
        let wm_before = p.read_watermark().unwrap();

        let mut second = FakeSource::new(pages);
        assert_eq!(collect(&mut second, &p).unwrap(), 0);
        assert_eq!(p.load_raw().unwrap().len(), 3);
        assert_eq!(p.read_watermark().unwrap(), wm_before);
    }

    #[test]
    fn watermark_is_nondecreasing_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let p = open_partition(dir.path());

        let mut run1 = FakeSource::new(vec![vec![record("A", "04-10-2024 09:00:00")]]);
        collect(&mut run1, &p).unwrap();
        let wm1 = p.read_watermark().unwrap().unwrap();

        let mut run2 = FakeSource::new(vec![vec![
            record("B", "04-10-2024 11:00:00"),
            record("A", "04-10-2024 09:00:00"),
        ]]);
        collect(&mut run2, &p).unwrap();
        let wm2 = p.read_watermark().unwrap().unwrap();
        assert!(wm2 > wm1);
        // Only B is new; A is at the old watermark.
        assert_eq!(p.load_raw().unwrap().len(), 2);
    }

    #[test]
    fn pagination_stops_at_first_fully_stale_page() {
        let dir = tempfile::tempdir().unwrap();
        let p = open_partition(dir.path());
        p.write_watermark(
            crate::record::parse_insider_timestamp("04-10-2024 09:30:00").unwrap(),
        )
        .unwrap();

        let mut source = FakeSource::new(vec![
            vec![record("A", "04-10-2024 10:00:00"), record("B", "04-10-2024 09:00:00")],
            vec![record("C", "04-10-2024 08:00:00")],
            vec![record("D", "04-10-2024 07:00:00")],
        ]);
        assert_eq!(collect(&mut source, &p).unwrap(), 1);
        // Page 2 filtered to nothing, so page 3 was never requested.
        assert_eq!(source.pages_visited, 2);
    }

    #[test]
    fn empty_first_page_collects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let p = open_partition(dir.path());
        let mut source = FakeSource::new(vec![vec![]]);
        assert_eq!(collect(&mut source, &p).unwrap(), 0);
        assert!(p.read_watermark().unwrap().is_none());
    }

    #[test]
    fn select_timeout_leaves_partition_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let p = open_partition(dir.path());
        let mut source = FakeSource::new(vec![vec![record("A", "04-10-2024 10:00:00")]]);
        source.fail_select = true;

        assert!(collect(&mut source, &p).is_err());
        assert!(p.load_raw().unwrap().is_empty());
        assert!(p.read_watermark().unwrap().is_none());
    }

    #[test]
    fn unparseable_timestamps_dropped_once_watermark_set() {
        let dir = tempfile::tempdir().unwrap();
        let p = open_partition(dir.path());
        p.write_watermark(
            crate::record::parse_insider_timestamp("04-10-2024 09:00:00").unwrap(),
        )
        .unwrap();

        let mut source = FakeSource::new(vec![vec![
            record("A", "04-10-2024 10:00:00"),
            record("B", "no timestamp here"),
        ]]);
        assert_eq!(collect(&mut source, &p).unwrap(), 1);
        assert_eq!(p.load_raw().unwrap()[0].heading, "A");
    }

    #[test]
    fn replay_source_pages_through_capture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.json");
        let pages = vec![
            vec![record("A", "04-10-2024 10:00:00")],
            vec![record("B", "04-10-2024 09:00:00")],
        ];
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string(&pages).unwrap().as_bytes())
            .unwrap();

        let p = open_partition(dir.path());
        let mut source = ReplayPageSource::from_path(&path).unwrap();
        assert_eq!(collect(&mut source, &p).unwrap(), 2);
    }
}
