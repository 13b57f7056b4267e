//! Spans inside a block that a new link must never start or end in, and
//! keyword matching that respects them.

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

static MD_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\([^)]+\)|\[[^\]]+\]\([^)]+\)").expect("valid regex")
});
static HTML_ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>.*?</a>").expect("valid regex"));
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static REF_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\[[^\]]+\]").expect("valid regex"));
static AUTOLINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<https?://[^>\s]+>").expect("valid regex"));
static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("valid regex"));
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
});

/// A keyword occurrence inside a block, as byte offsets relative to the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    /// The text exactly as written in the document.
    pub text: String,
}

/// Inline code spans. An unclosed backtick protects the rest of the text.
fn inline_code_ranges(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let start = i;
        let end = match bytes[i + 1..].iter().position(|&b| b == b'`') {
            Some(offset) => start + 1 + offset + 1,
            None => bytes.len(),
        };
        ranges.push(start..end);
        i = end;
    }
    ranges
}

/// Sorted, merged ranges covering inline code, links, images, HTML tags and
/// anchors, reference links, autolinks, bare URLs and email addresses.
pub fn protected_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = inline_code_ranges(text);
    for re in [
        &*MD_LINK_RE,
        &*HTML_ANCHOR_RE,
        &*HTML_TAG_RE,
        &*REF_LINK_RE,
        &*AUTOLINK_RE,
        &*BARE_URL_RE,
        &*EMAIL_RE,
    ] {
        ranges.extend(re.find_iter(text).map(|m| m.range()));
    }

    ranges.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match merged.last_mut() {
            Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
            _ => merged.push(r),
        }
    }
    merged
}

/// Binary search over sorted, non-overlapping ranges.
pub fn is_in_ranges(pos: usize, ranges: &[Range<usize>]) -> bool {
    ranges
        .binary_search_by(|r| {
            if pos < r.start {
                Ordering::Greater
            } else if pos >= r.end {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })
        .is_ok()
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// First case-insensitive occurrence of `keyword` in `text` that sits on word
/// boundaries, stays on one line and does not touch a protected range.
pub fn find_eligible_match(text: &str, keyword: &str) -> Option<MatchSpan> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return None;
    }
    let re = RegexBuilder::new(&regex::escape(keyword))
        .case_insensitive(true)
        .build()
        .ok()?;
    let protected = protected_ranges(text);

    for m in re.find_iter(text) {
        let (start, end) = (m.start(), m.end());
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
            continue;
        }
        let last_char = text[..end]
            .char_indices()
            .next_back()
            .map_or(start, |(i, _)| i);
        if is_in_ranges(start, &protected) || is_in_ranges(last_char, &protected) {
            continue;
        }
        if m.as_str().contains(['\n', '\r']) {
            continue;
        }
        return Some(MatchSpan {
            start,
            end,
            text: m.as_str().to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_code_ranges() {
        assert_eq!(protected_ranges("a `code` b"), vec![2..8]);
        // Unclosed backtick runs to the end
        assert_eq!(protected_ranges("a `open"), vec![2..7]);
    }

    #[test]
    fn test_ranges_merge_overlaps() {
        // Markdown link containing a bare URL: one merged range
        let text = "see [site](https://x.io/a) now";
        assert_eq!(protected_ranges(text), vec![4..26]);

        let text = "<a href=\"/x\">inner <b>bold</b></a> tail";
        let ranges = protected_ranges(text);
        assert_eq!(ranges, vec![0..34]);
    }

    #[test]
    fn test_is_in_ranges() {
        let ranges = vec![2..5, 10..12];
        assert!(!is_in_ranges(1, &ranges));
        assert!(is_in_ranges(2, &ranges));
        assert!(is_in_ranges(4, &ranges));
        assert!(!is_in_ranges(5, &ranges));
        assert!(is_in_ranges(11, &ranges));
        assert!(!is_in_ranges(12, &ranges));
        assert!(!is_in_ranges(0, &[]));
    }

    #[test]
    fn test_match_is_case_insensitive_and_keeps_original_text() {
        let m = find_eligible_match("We use opentelemetry daily.", "OpenTelemetry").unwrap();
        assert_eq!(m.text, "opentelemetry");
        assert_eq!((m.start, m.end), (7, 20));
    }

    #[test]
    fn test_match_requires_word_boundaries() {
        assert!(find_eligible_match("tracers and tracing", "trace").is_none());
        assert!(find_eligible_match("snake_trace here", "trace").is_none());
        // Unicode letters count as word characters
        assert!(find_eligible_match("éTrace", "trace").is_none());
        let m = find_eligible_match("tracers, trace.", "trace").unwrap();
        assert_eq!(m.start, 9);
    }

    #[test]
    fn test_match_skips_protected_spans() {
        let text = "`Kafka` and [Kafka](/kafka) and <span title=\"Kafka\">x</span> then Kafka";
        let m = find_eligible_match(text, "kafka").unwrap();
        assert_eq!(m.start, text.rfind("Kafka").unwrap());

        assert!(find_eligible_match("mail ops@kafka.dev now", "kafka").is_none());
        assert!(find_eligible_match("go to https://kafka.apache.org", "kafka").is_none());
        assert!(find_eligible_match("<https://x.io/kafka>", "kafka").is_none());
        assert!(find_eligible_match("[Kafka][ref]", "kafka").is_none());
    }

    #[test]
    fn test_match_skips_image_alt_and_anchor_text() {
        assert!(find_eligible_match("diagram ![Kafka](/k.png) below", "kafka").is_none());
        assert!(find_eligible_match("read <a href=\"/k\">Kafka</a> first", "kafka").is_none());
        assert!(find_eligible_match("<A HREF=\"/k\">intro to\nKafka</A>", "kafka").is_none());

        let text = "![Kafka](/k.png) shows Kafka";
        let m = find_eligible_match(text, "kafka").unwrap();
        assert_eq!(m.start, text.rfind("Kafka").unwrap());
    }

    #[test]
    fn test_match_rejects_partial_overlap_with_protected_span() {
        // Keyword ends inside inline code
        assert!(find_eligible_match("open `telemetry` data", "open `telemetry").is_none());
    }

    #[test]
    fn test_match_does_not_cross_lines() {
        assert!(find_eligible_match("open\ntelemetry", "open\ntelemetry").is_none());
        assert!(find_eligible_match("anything", "   ").is_none());
    }
}
