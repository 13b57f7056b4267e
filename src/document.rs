//! Per-document state for one run, and the link insertion that mutates it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ahash::AHashSet;
use regex::Regex;

use crate::blocks::{blockify, eligible_word_count, Block};
use crate::error::{InterlinkError, Result};
use crate::planner::Placement;

static MD_ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));
static HTML_ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Normalized key for anchor text and keyword comparisons.
pub fn anchor_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Lowercased visible text of every Markdown link and HTML anchor.
pub fn collect_anchor_texts(content: &str) -> AHashSet<String> {
    let mut anchors = AHashSet::new();
    let captures = MD_ANCHOR_RE
        .captures_iter(content)
        .chain(HTML_ANCHOR_RE.captures_iter(content));
    for caps in captures {
        let inner = TAG_RE.replace_all(&caps[1], "");
        let key = anchor_key(&inner);
        if !key.is_empty() {
            anchors.insert(key);
        }
    }
    anchors
}

#[derive(Debug)]
pub struct SourceDocument {
    path: PathBuf,
    content: String,
    total_words: usize,
    cap: usize,
    added: usize,
    used_targets: AHashSet<String>,
    anchor_texts: AHashSet<String>,
    blocks: Vec<Block>,
    last_insert_word_pos: Option<usize>,
    dirty: bool,
}

impl SourceDocument {
    pub fn load(path: &Path, words_per_link: usize) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| InterlinkError::io(path, e))?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), "source is not UTF-8, decoding lossily");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Ok(Self::from_content(path, content, words_per_link))
    }

    pub fn from_content(path: &Path, content: String, words_per_link: usize) -> Self {
        let total_words = eligible_word_count(&content);
        Self {
            path: path.to_path_buf(),
            total_words,
            cap: total_words / words_per_link.max(1),
            added: 0,
            used_targets: AHashSet::new(),
            anchor_texts: collect_anchor_texts(&content),
            blocks: blockify(&content),
            last_insert_word_pos: None,
            dirty: false,
            content,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    /// Maximum number of links this run may add.
    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn added(&self) -> usize {
        self.added
    }

    pub fn cap_reached(&self) -> bool {
        self.added >= self.cap
    }

    pub fn last_insert_word_pos(&self) -> Option<usize> {
        self.last_insert_word_pos
    }

    pub fn contains_target(&self, target_url: &str) -> bool {
        self.content.contains(target_url)
    }

    pub fn has_anchor_text(&self, keyword: &str) -> bool {
        self.anchor_texts.contains(&anchor_key(keyword))
    }

    pub fn is_target_used(&self, target_url: &str) -> bool {
        self.used_targets.contains(target_url)
    }

    pub fn mark_target_used(&mut self, target_url: &str) {
        self.used_targets.insert(target_url.to_string());
    }

    /// Wrap the planned span as `[text](target_url)` and rebuild the block model.
    pub fn insert_link(&mut self, placement: &Placement, keyword: &str, target_url: &str) {
        let start = placement.block_start + placement.span.start;
        let end = placement.block_start + placement.span.end;
        let link = format!("[{}]({})", placement.span.text, target_url);
        self.content.replace_range(start..end, &link);

        self.added += 1;
        self.used_targets.insert(target_url.to_string());
        self.anchor_texts.insert(anchor_key(keyword));
        self.dirty = true;
        self.blocks = blockify(&self.content);
        self.last_insert_word_pos = Some(placement.block_end_word);
    }

    /// Write the content back if it changed. Returns whether a write happened.
    pub fn persist(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        fs::write(&self.path, &self.content).map_err(|e| InterlinkError::io(&self.path, e))?;
        self.dirty = false;
        tracing::info!(path = %self.path.display(), added = self.added, "wrote source");
        Ok(true)
    }
}
