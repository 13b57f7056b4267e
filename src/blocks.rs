//! Line-based Markdown structure scan: paragraph blocks and eligible word counts.

use std::sync::LazyLock;

use regex::Regex;

static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*>").expect("valid regex"));
static REF_DEFINITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[[^\]]+\]:\s*\S+").expect("valid regex"));
static STRUCTURAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[#|<]").expect("valid regex"));

static MD_LINK_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\([^)]*\)").expect("valid regex"));
static REF_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]\[[^\]]+\]").expect("valid regex"));
static HTML_ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<a\b").expect("valid regex"));

/// One source line with its exact byte range, terminator included in `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// A paragraph of link-eligible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub text: String,
    /// Byte offset of the first line.
    pub start: usize,
    /// Byte offset just past the last line's terminator.
    pub end: usize,
    pub has_link: bool,
    pub words: usize,
    pub start_word: usize,
    pub end_word: usize,
    pub index: usize,
}

/// Split on `\r?\n`, keeping offsets exact. The final line is always present,
/// even when empty.
pub fn split_lines(content: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut pos = 0;
    for (nl, _) in content.match_indices('\n') {
        let text_end = if nl > pos && content.as_bytes()[nl - 1] == b'\r' {
            nl - 1
        } else {
            nl
        };
        lines.push(Line {
            text: &content[pos..text_end],
            start: pos,
            end: nl + 1,
        });
        pos = nl + 1;
    }
    lines.push(Line {
        text: &content[pos..],
        start: pos,
        end: content.len(),
    });
    lines
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```")
}

/// Headings, table rows and HTML/JSX lines.
fn is_structural(line: &str) -> bool {
    STRUCTURAL_RE.is_match(line)
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Tracks front matter and code fences while walking lines top to bottom.
#[derive(Default)]
struct FenceState {
    in_front: bool,
    in_fence: bool,
}

enum LineKind {
    /// Front matter, fence marker or fenced code.
    Hidden,
    Fence,
    Body,
}

impl FenceState {
    fn classify(&mut self, index: usize, line: &str) -> LineKind {
        let trimmed = line.trim();
        if index == 0 && trimmed.trim_start_matches('\u{feff}') == "---" {
            self.in_front = true;
            return LineKind::Hidden;
        }
        if self.in_front {
            if trimmed == "---" {
                self.in_front = false;
            }
            return LineKind::Hidden;
        }
        if is_fence(trimmed) {
            self.in_fence = !self.in_fence;
            return LineKind::Fence;
        }
        if self.in_fence {
            return LineKind::Hidden;
        }
        LineKind::Body
    }
}

/// Word count of everything outside front matter, code fences, headings,
/// tables and HTML/JSX lines. This is what the per-document link budget is
/// computed from.
pub fn eligible_word_count(content: &str) -> usize {
    let mut state = FenceState::default();
    split_lines(content)
        .iter()
        .enumerate()
        .filter(|(i, line)| matches!(state.classify(*i, line.text), LineKind::Body))
        .filter(|(_, line)| !is_structural(line.text))
        .map(|(_, line)| count_words(line.text))
        .sum()
}

/// Split a document into paragraph blocks.
///
/// Blank lines, fence markers, fenced code, blockquotes, reference
/// definitions, headings, tables and HTML/JSX lines all end the current
/// block and never belong to one.
pub fn blockify(content: &str) -> Vec<Block> {
    let mut state = FenceState::default();
    let mut groups: Vec<Vec<Line<'_>>> = Vec::new();
    let mut current: Vec<Line<'_>> = Vec::new();

    for (i, line) in split_lines(content).into_iter().enumerate() {
        let eligible = match state.classify(i, line.text) {
            LineKind::Body => {
                !line.text.trim().is_empty()
                    && !BLOCKQUOTE_RE.is_match(line.text)
                    && !REF_DEFINITION_RE.is_match(line.text)
                    && !is_structural(line.text)
            }
            LineKind::Hidden | LineKind::Fence => false,
        };

        if eligible {
            current.push(line);
        } else if !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut cumulative = 0;
    groups
        .into_iter()
        .enumerate()
        .map(|(index, lines)| {
            let text = lines.iter().map(|l| l.text).collect::<Vec<_>>().join("\n");
            let words = count_words(&text);
            let start_word = cumulative;
            cumulative += words;
            Block {
                has_link: has_link(&text),
                start: lines[0].start,
                end: lines[lines.len() - 1].end,
                words,
                start_word,
                end_word: cumulative,
                index,
                text,
            }
        })
        .collect()
}

fn has_link(text: &str) -> bool {
    MD_LINK_TAIL_RE.is_match(text)
        || text.contains("http://")
        || text.contains("https://")
        || REF_LINK_RE.is_match(text)
        || HTML_ANCHOR_RE.is_match(text)
}
