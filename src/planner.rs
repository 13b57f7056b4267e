//! Row screening and link placement.
//!
//! Placement runs up to three passes over the block model:
//! 1. link-free blocks, spaced away from the previous insertion, best context score wins;
//! 2. link-free blocks without the spacing rule, first match wins;
//! 3. every block, first match wins.
//!
//! A short first block is never linked in any pass.

use std::fmt;

use ahash::AHashSet;
use serde::Serialize;

use crate::blocks::Block;
use crate::config::PlannerConfig;
use crate::document::SourceDocument;
use crate::protect::{find_eligible_match, MatchSpan};

/// Why a row was not linked. The string forms are written to the CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingRequiredFields,
    DenylistKeyword,
    LowQualityAnchor,
    SourceNotFound,
    ExistingTargetPresent,
    ExistingAnchorForKeyword,
    DuplicateTarget,
    CapReached,
    NotFoundOrIneligible,
    ContextMismatch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRequiredFields => "missing_required_fields",
            Self::DenylistKeyword => "denylist_keyword",
            Self::LowQualityAnchor => "low_quality_anchor",
            Self::SourceNotFound => "source_not_found",
            Self::ExistingTargetPresent => "existing_target_present",
            Self::ExistingAnchorForKeyword => "existing_anchor_for_keyword",
            Self::DuplicateTarget => "duplicate_target",
            Self::CapReached => "cap_reached",
            Self::NotFoundOrIneligible => "not_found_or_ineligible",
            Self::ContextMismatch => "context_mismatch",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Added,
    Skipped(SkipReason),
}

impl RowStatus {
    /// Value for the `interlink_status` column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Skipped(_) => "skipped",
        }
    }

    /// Value for the `status_reason` column.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Added => "",
            Self::Skipped(reason) => reason.as_str(),
        }
    }
}

/// Where a link goes: a span inside one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub block_index: usize,
    /// Byte offset of the block in the document.
    pub block_start: usize,
    pub block_end_word: usize,
    /// Offsets relative to `block_start`.
    pub span: MatchSpan,
    pub score: usize,
}

/// Keyword-only checks, run before the source document is loaded.
pub fn screen_keyword(keyword: &str, config: &PlannerConfig) -> Result<(), SkipReason> {
    if config.is_denylisted(keyword) {
        return Err(SkipReason::DenylistKeyword);
    }
    let trimmed = keyword.trim();
    let too_short = trimmed.chars().count() < config.min_keyword_chars;
    if too_short || !trimmed.chars().any(char::is_alphabetic) {
        return Err(SkipReason::LowQualityAnchor);
    }
    Ok(())
}

/// Document-level checks, in order: target already present, keyword already
/// an anchor, target already linked this run, link budget exhausted.
pub fn screen_document(
    doc: &SourceDocument,
    keyword: &str,
    target_url: &str,
) -> Result<(), SkipReason> {
    if doc.contains_target(target_url) {
        return Err(SkipReason::ExistingTargetPresent);
    }
    if doc.has_anchor_text(keyword) {
        return Err(SkipReason::ExistingAnchorForKeyword);
    }
    if doc.is_target_used(target_url) {
        return Err(SkipReason::DuplicateTarget);
    }
    if doc.cap_reached() {
        return Err(SkipReason::CapReached);
    }
    Ok(())
}

/// Distinct lowercase context words of at least four characters.
pub fn context_words(context: &str) -> Vec<String> {
    let mut seen = AHashSet::new();
    context
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// Number of context words that occur anywhere in `text`.
pub fn context_score(text: &str, words: &[String]) -> usize {
    if words.is_empty() {
        return 0;
    }
    let text = text.to_lowercase();
    words.iter().filter(|w| text.contains(w.as_str())).count()
}

/// Choose where to link `keyword`, or say why it cannot be linked.
pub fn find_placement(
    doc: &SourceDocument,
    keyword: &str,
    context: &str,
    config: &PlannerConfig,
) -> Result<Placement, SkipReason> {
    let content = doc.content();
    let words = context_words(context);
    let is_short_intro = |b: &Block| b.index == 0 && b.words < config.short_intro_words;

    let candidate = |b: &Block| -> Option<Placement> {
        let text = &content[b.start..b.end];
        let span = find_eligible_match(text, keyword)?;
        Some(Placement {
            block_index: b.index,
            block_start: b.start,
            block_end_word: b.end_word,
            span,
            score: context_score(text, &words),
        })
    };

    let link_free: Vec<&Block> = doc
        .blocks()
        .iter()
        .filter(|b| !b.has_link && !is_short_intro(*b))
        .collect();

    // Pass 1
    let mut best: Option<Placement> = None;
    for &b in &link_free {
        if let Some(last) = doc.last_insert_word_pos() {
            if b.start_word.abs_diff(last) < config.min_spacing_words {
                continue;
            }
        }
        if let Some(p) = candidate(b) {
            if best.as_ref().map_or(true, |cur| p.score > cur.score) {
                best = Some(p);
            }
        }
    }

    // Pass 2
    let best = best.or_else(|| link_free.iter().find_map(|&b| candidate(b)));

    // Pass 3
    let best = best.or_else(|| {
        doc.blocks()
            .iter()
            .filter(|b| !is_short_intro(*b))
            .find_map(candidate)
    });

    let placement = best.ok_or(SkipReason::NotFoundOrIneligible)?;
    if !words.is_empty() && placement.score == 0 {
        return Err(SkipReason::ContextMismatch);
    }
    Ok(placement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn filler(n: usize) -> String {
        vec!["filler"; n].join(" ")
    }

    fn doc(content: &str) -> SourceDocument {
        SourceDocument::from_content(Path::new("page.md"), content.to_string(), 200)
    }

    #[test]
    fn test_skip_reason_strings() {
        assert_eq!(SkipReason::ExistingAnchorForKeyword.as_str(), "existing_anchor_for_keyword");
        assert_eq!(SkipReason::NotFoundOrIneligible.to_string(), "not_found_or_ineligible");
        assert_eq!(
            serde_json::to_string(&SkipReason::CapReached).unwrap(),
            "\"cap_reached\""
        );
        assert_eq!(RowStatus::Added.label(), "added");
        assert_eq!(RowStatus::Added.reason(), "");
        assert_eq!(RowStatus::Skipped(SkipReason::DuplicateTarget).label(), "skipped");
    }

    #[test]
    fn test_screen_keyword() {
        let config = PlannerConfig::default();
        assert_eq!(screen_keyword("Prometheus or", &config), Err(SkipReason::DenylistKeyword));
        assert_eq!(screen_keyword(" k8 ", &config), Err(SkipReason::LowQualityAnchor));
        assert_eq!(screen_keyword("2024", &config), Err(SkipReason::LowQualityAnchor));
        assert_eq!(screen_keyword("APM", &config), Ok(()));
    }

    #[test]
    fn test_context_words_and_score() {
        let words = context_words("Distributed tracing, with the TRACING backend & otel");
        assert_eq!(words, vec!["distributed", "tracing", "with", "backend", "otel"]);

        assert_eq!(context_score("Tracing in a distributed system", &words), 2);
        assert_eq!(context_score("anything", &[]), 0);
    }

    #[test]
    fn test_screen_document_order() {
        let content = format!("{} [Kafka](/kafka) and /target-page\n", filler(200));
        let mut d = doc(&content);
        assert_eq!(d.cap(), 1);

        assert_eq!(
            screen_document(&d, "Kafka", "/target-page"),
            Err(SkipReason::ExistingTargetPresent)
        );
        assert_eq!(
            screen_document(&d, "kafka", "/other"),
            Err(SkipReason::ExistingAnchorForKeyword)
        );
        d.mark_target_used("/other");
        assert_eq!(screen_document(&d, "zookeeper", "/other"), Err(SkipReason::DuplicateTarget));
        assert_eq!(screen_document(&d, "zookeeper", "/fresh"), Ok(()));
    }

    #[test]
    fn test_skips_short_intro_block() {
        let content = format!("Kafka intro.\n\n{} Kafka\n", filler(20));
        let d = doc(&content);
        let p = find_placement(&d, "kafka", "", &PlannerConfig::default()).unwrap();
        assert_eq!(p.block_index, 1);

        // Only the short intro has the keyword
        let content = format!("Kafka intro.\n\n{}\n", filler(20));
        assert_eq!(
            find_placement(&doc(&content), "kafka", "", &PlannerConfig::default()),
            Err(SkipReason::NotFoundOrIneligible)
        );
    }

    #[test]
    fn test_pass_one_prefers_context_score() {
        let content = format!(
            "{f} Kafka queues.\n\n{f} Kafka brokers handle streaming ingestion.\n",
            f = filler(20)
        );
        let d = doc(&content);
        let p = find_placement(&d, "Kafka", "streaming ingestion brokers", &PlannerConfig::default())
            .unwrap();
        assert_eq!(p.block_index, 1);
        assert_eq!(p.score, 3);
    }

    #[test]
    fn test_context_mismatch() {
        let content = format!("{} Kafka here.\n", filler(20));
        assert_eq!(
            find_placement(&doc(&content), "Kafka", "unrelated wording", &PlannerConfig::default()),
            Err(SkipReason::ContextMismatch)
        );
        // Short context words are ignored, so no relevance is required
        assert!(find_placement(&doc(&content), "Kafka", "a of it", &PlannerConfig::default()).is_ok());
    }

    #[test]
    fn test_spacing_then_fallback() {
        let content = format!(
            "{f} Kafka one.\n\n{f} Loki two.\n\n{f} Loki three.\n",
            f = filler(20)
        );
        let mut d = doc(&content);
        let config = PlannerConfig::default();
        let first = find_placement(&d, "Kafka", "", &config).unwrap();
        assert_eq!(first.block_index, 0);
        d.insert_link(&first, "Kafka", "/kafka");

        // Blocks 1 and 2 both start within 100 words of the insertion,
        // so pass 2 takes the first link-free one.
        let second = find_placement(&d, "Loki", "", &config).unwrap();
        assert_eq!(second.block_index, 1);

        let spaced = PlannerConfig {
            min_spacing_words: 20,
            ..PlannerConfig::default()
        };
        // Insertion ended at word 22; block 1 starts there, block 2 starts at 44
        let second = find_placement(&d, "Loki", "", &spaced).unwrap();
        assert_eq!(second.block_index, 2);
    }

    #[test]
    fn test_pass_three_uses_linked_blocks() {
        let content = format!("{} see [docs](/docs) about Tempo.\n", filler(20));
        let p = find_placement(&doc(&content), "Tempo", "", &PlannerConfig::default()).unwrap();
        assert_eq!(p.block_index, 0);
        assert_eq!(p.span.text, "Tempo");
    }

    #[test]
    fn test_keyword_in_front_matter_after_bom_is_not_found() {
        let content = format!("\u{feff}---\ntitle: OpenTelemetry guide\n---\n{}\n", filler(400));
        let d = doc(&content);
        assert_eq!(d.total_words(), 400);
        assert_eq!(
            find_placement(&d, "OpenTelemetry", "", &PlannerConfig::default()),
            Err(SkipReason::NotFoundOrIneligible)
        );
    }

    #[test]
    fn test_keyword_in_code_fence_is_not_found() {
        let content = format!("{}\n\n```\nOpenTelemetry sdk\n```\n", filler(30));
        assert_eq!(
            find_placement(&doc(&content), "OpenTelemetry", "", &PlannerConfig::default()),
            Err(SkipReason::NotFoundOrIneligible)
        );
    }
}
