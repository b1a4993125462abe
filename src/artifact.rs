//! Deterministic artifact naming, shared by the downloader and the
//! extraction engine. Both sides must agree byte-for-byte on the name, so
//! this is the only place it is derived.

/// Replace every character that is not alphanumeric with '_'.
/// With `keep_spaces`, whitespace survives as-is (category labels keep
/// their word breaks).
pub fn sanitize(name: &str, keep_spaces: bool) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || (keep_spaces && c.is_whitespace()) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Last path segment of a document URL, query string stripped.
fn url_basename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Artifact file name for a record: first heading token + sanitized
/// category + URL basename. Pure function of its inputs, so re-running
/// acquisition can never produce a duplicate artifact.
pub fn artifact_name(heading: &str, category: &str, pdf_link: &str) -> String {
    let first_word = heading.split_whitespace().next().unwrap_or_default();
    format!(
        "{}_{}_{}",
        sanitize(first_word, false),
        sanitize(category, true),
        url_basename(pdf_link),
    )
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_punctuation() {
        assert_eq!(sanitize("ACME-Ltd.", false), "ACME_Ltd_");
        assert_eq!(sanitize("Board Meeting", false), "Board_Meeting");
        assert_eq!(sanitize("Board Meeting", true), "Board Meeting");
    }

    #[test]
    fn naming_is_deterministic() {
        let a = artifact_name("ACME Ltd - Results", "Board Meeting", "https://x.com/a/b1c2.pdf");
        let b = artifact_name("ACME Ltd - Results", "Board Meeting", "https://x.com/a/b1c2.pdf");
        assert_eq!(a, b);
        assert_eq!(a, "ACME_Board Meeting_b1c2.pdf");
    }

    #[test]
    fn basename_strips_query_string() {
        let name = artifact_name("X", "Cat", "https://x.com/doc.pdf?dl=1");
        assert_eq!(name, "X_Cat_doc.pdf");
    }

    #[test]
    fn empty_heading_still_names() {
        let name = artifact_name("", "Cat", "https://x.com/doc.pdf");
        assert_eq!(name, "_Cat_doc.pdf");
    }
}
