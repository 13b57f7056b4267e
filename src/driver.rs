//! The run loop: rows in, statuses and linked documents out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};
use serde::Serialize;

use crate::config::PlannerConfig;
use crate::csv_store::{CsvStore, TaskRow};
use crate::document::SourceDocument;
use crate::error::Result;
use crate::planner::{find_placement, screen_document, screen_keyword, RowStatus, SkipReason};
use crate::resolver::SourceResolver;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub csv_path: PathBuf,
    pub content_root: PathBuf,
    pub dry_run: bool,
    /// Stop after this many successful insertions.
    pub limit: Option<usize>,
    /// Stop before modifying more than this many distinct documents.
    pub source_limit: Option<usize>,
    pub only_source: Option<String>,
    pub save_every: usize,
    pub force_reprocess: bool,
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Successful insertions.
    pub processed: usize,
    pub modified_sources: usize,
    pub added_columns: Vec<String>,
    /// Files written, in first-write order.
    pub updated_paths: Vec<PathBuf>,
    pub dry_run: bool,
    pub skipped: BTreeMap<SkipReason, usize>,
}

/// Documents loaded during one run.
///
/// URL resolution is memoised separately from document state so that two
/// URLs naming the same file share one in-memory copy.
pub struct Session {
    resolver: SourceResolver,
    words_per_link: usize,
    paths: AHashMap<String, Option<PathBuf>>,
    documents: AHashMap<PathBuf, SourceDocument>,
}

impl Session {
    pub fn new(resolver: SourceResolver, words_per_link: usize) -> Self {
        Self {
            resolver,
            words_per_link,
            paths: AHashMap::new(),
            documents: AHashMap::new(),
        }
    }

    /// The document behind `source_url`, loading it on first use.
    pub fn document(&mut self, source_url: &str) -> Result<Option<&mut SourceDocument>> {
        let resolver = &self.resolver;
        let path = self
            .paths
            .entry(source_url.to_string())
            .or_insert_with(|| resolver.resolve(source_url))
            .clone();
        let Some(path) = path else {
            return Ok(None);
        };

        if !self.documents.contains_key(&path) {
            let doc = SourceDocument::load(&path, self.words_per_link)?;
            tracing::debug!(
                path = %path.display(),
                words = doc.total_words(),
                cap = doc.cap(),
                "loaded source"
            );
            self.documents.insert(path.clone(), doc);
        }
        Ok(self.documents.get_mut(&path))
    }
}

/// Run every CSV row through screening, placement and insertion.
pub fn run(options: &RunOptions) -> Result<RunSummary> {
    let mut store = CsvStore::open(&options.csv_path)?;
    let mut session = Session::new(
        SourceResolver::new(&options.content_root),
        options.planner.words_per_link,
    );
    let mut summary = RunSummary {
        added_columns: store.added_columns().to_vec(),
        dry_run: options.dry_run,
        ..RunSummary::default()
    };
    let mut modified: AHashSet<PathBuf> = AHashSet::new();
    let mut changes_since_save = 0;

    for i in 0..store.len() {
        if options.limit.is_some_and(|limit| summary.processed >= limit) {
            break;
        }

        let task = store.task(i);
        if !task.has_required_fields() {
            let status = RowStatus::Skipped(SkipReason::MissingRequiredFields);
            record(&mut store, &mut summary, i, status);
            continue;
        }
        if options
            .only_source
            .as_deref()
            .is_some_and(|only| only != task.source_url)
        {
            continue;
        }
        if !store.status(i).is_empty() && !options.force_reprocess {
            continue;
        }

        if let Err(reason) = screen_keyword(&task.keyword, &options.planner) {
            record(&mut store, &mut summary, i, RowStatus::Skipped(reason));
            continue;
        }

        let Some(doc) = session.document(&task.source_url)? else {
            tracing::warn!(
                url = %task.source_url,
                root = %options.content_root.display(),
                "source not found"
            );
            record(&mut store, &mut summary, i, RowStatus::Skipped(SkipReason::SourceNotFound));
            continue;
        };

        if !modified.contains(doc.path())
            && options
                .source_limit
                .is_some_and(|limit| modified.len() >= limit)
        {
            tracing::info!(limit = modified.len(), "source limit reached");
            break;
        }

        let status = link_row(doc, &task, &options.planner);
        record(&mut store, &mut summary, i, status);
        if status != RowStatus::Added {
            continue;
        }

        modified.insert(doc.path().to_path_buf());
        summary.processed += 1;
        changes_since_save += 1;

        if !options.dry_run && doc.persist()? {
            push_unique(&mut summary.updated_paths, doc.path());
        }
        if !options.dry_run && changes_since_save >= options.save_every {
            store.save()?;
            changes_since_save = 0;
        }
    }

    if !options.dry_run {
        store.save()?;
    }

    summary.modified_sources = modified.len();
    Ok(summary)
}

/// Screen, place and insert one row's link into an already loaded document.
fn link_row(doc: &mut SourceDocument, task: &TaskRow, planner: &PlannerConfig) -> RowStatus {
    if let Err(reason) = screen_document(doc, &task.keyword, &task.target_url) {
        if reason == SkipReason::ExistingTargetPresent {
            doc.mark_target_used(&task.target_url);
        }
        return RowStatus::Skipped(reason);
    }

    match find_placement(doc, &task.keyword, &task.context, planner) {
        Ok(placement) => {
            tracing::debug!(
                keyword = %task.keyword,
                block = placement.block_index,
                score = placement.score,
                "placing link"
            );
            doc.insert_link(&placement, &task.keyword, &task.target_url);
            RowStatus::Added
        }
        Err(reason) => RowStatus::Skipped(reason),
    }
}

fn record(store: &mut CsvStore, summary: &mut RunSummary, i: usize, status: RowStatus) {
    tracing::debug!(row = i + 1, status = status.label(), reason = status.reason(), "row done");
    if let RowStatus::Skipped(reason) = status {
        *summary.skipped.entry(reason).or_insert(0) += 1;
    }
    store.set_status(i, &status);
}

fn push_unique(paths: &mut Vec<PathBuf>, path: &Path) {
    if !paths.iter().any(|p| p == path) {
        paths.push(path.to_path_buf());
    }
}
