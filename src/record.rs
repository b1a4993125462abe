use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format embedded in the INSIDER column.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// One disclosure row as rendered by the announcements page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementRecord {
    #[serde(rename = "HEADING")]
    pub heading: String,
    #[serde(rename = "ANNOUNCEMENT")]
    pub announcement: String,
    /// Carries the announcement timestamp as its first two whitespace
    /// tokens ("DD-MM-YYYY HH:MM:SS"), sometimes followed by extra text.
    #[serde(rename = "INSIDER")]
    pub insider: String,
    #[serde(rename = "PDF LINK")]
    pub pdf_link: Option<String>,
    #[serde(rename = "CATEGORY")]
    pub category: String,
}

impl AnnouncementRecord {
    /// Announcement time parsed out of the INSIDER column, if present.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        parse_insider_timestamp(&self.insider)
    }
}

/// Parse the first two whitespace tokens of an INSIDER value as a timestamp.
pub fn parse_insider_timestamp(insider: &str) -> Option<NaiveDateTime> {
    let mut tokens = insider.split_whitespace();
    let date = tokens.next()?;
    let time = tokens.next()?;
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT).ok()
}

/// Raw record plus extraction outcome; one row of the extracted store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRecord {
    #[serde(rename = "HEADING")]
    pub heading: String,
    #[serde(rename = "ANNOUNCEMENT")]
    pub announcement: String,
    #[serde(rename = "INSIDER")]
    pub insider: String,
    #[serde(rename = "PDF LINK")]
    pub pdf_link: Option<String>,
    #[serde(rename = "CATEGORY")]
    pub category: String,
    /// Cleaned extracted text; empty on terminal failure.
    #[serde(rename = "Extracted Data")]
    pub extracted: String,
    /// Partition date, DD-MM-YYYY.
    #[serde(rename = "Date")]
    pub date: String,
    /// Completion flag: extraction was attempted and resolved. Set on
    /// success and on terminal failure alike, so later runs never retry.
    #[serde(rename = "flag")]
    pub flag: bool,
}

impl ExtractedRecord {
    pub fn resolved(record: &AnnouncementRecord, extracted: String, date: &str) -> Self {
        Self {
            heading: record.heading.clone(),
            announcement: record.announcement.clone(),
            insider: record.insider.clone(),
            pdf_link: record.pdf_link.clone(),
            category: record.category.clone(),
            extracted,
            date: date.to_string(),
            flag: true,
        }
    }
}

/// One row of the per-partition error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(rename = "HEADING")]
    pub heading: String,
    #[serde(rename = "PDF LINK")]
    pub pdf_link: String,
    #[serde(rename = "ERROR")]
    pub error: String,
    #[serde(rename = "DATE")]
    pub date: String,
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insider_timestamp_parses_first_two_tokens() {
        let ts = parse_insider_timestamp("04-10-2024 10:00:00").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "04-10-2024 10:00:00");
    }

    #[test]
    fn insider_timestamp_ignores_trailing_annotations() {
        let ts = parse_insider_timestamp("04-10-2024 09:30:00 Exchange Received Time");
        assert!(ts.is_some());
    }

    #[test]
    fn insider_timestamp_rejects_malformed() {
        assert!(parse_insider_timestamp("").is_none());
        assert!(parse_insider_timestamp("04-10-2024").is_none());
        assert!(parse_insider_timestamp("not a timestamp").is_none());
        assert!(parse_insider_timestamp("2024-10-04 10:00:00").is_none());
    }

    #[test]
    fn resolved_record_sets_flag() {
        let rec = AnnouncementRecord {
            heading: "ACME Ltd - Board Meeting".into(),
            announcement: "Outcome of board meeting".into(),
            insider: "04-10-2024 10:00:00".into(),
            pdf_link: Some("https://example.com/docs/abc123.pdf".into()),
            category: "Board Meeting".into(),
        };
        let ext = ExtractedRecord::resolved(&rec, "some text".into(), "04-10-2024");
        assert!(ext.flag);
        assert_eq!(ext.date, "04-10-2024");
        assert_eq!(ext.pdf_link.as_deref(), Some("https://example.com/docs/abc123.pdf"));
    }
}
