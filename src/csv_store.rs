//! CSV task list: parsing, serialization, column resolution and persistence.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{InterlinkError, Result};
use crate::planner::RowStatus;

const COL_SOURCE_URL: &str = "Source URL";
const COL_SOURCE_PAGE: &str = "Source page";
const COL_KEYWORD: &str = "Keyword";
const COL_CONTEXT: &str = "Keyword context";
const COL_TARGET: &str = "Target page";
pub const COL_STATUS: &str = "interlink_status";
pub const COL_REASON: &str = "status_reason";

/// Parse CSV text into rows of cells.
///
/// Quoted fields may contain commas, doubled quotes and any line terminator.
/// Unquoted records end at `\n`, `\r\n` or `\r`. Rows may differ in width.
pub fn parse_csv(text: &str) -> csv::Result<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Serialize rows, quoting only the fields that need it. Records end in `\n`.
pub fn stringify_csv(rows: &[Vec<String>]) -> csv::Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);

    for row in rows {
        writer.write_record(row)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

/// Column positions in the header row.
#[derive(Debug, Clone, Copy)]
pub struct Columns {
    pub source: usize,
    pub keyword: usize,
    pub context: usize,
    pub target: usize,
    pub status: usize,
    pub reason: usize,
}

/// One task row's input cells.
#[derive(Debug, Clone, Default)]
pub struct TaskRow {
    pub source_url: String,
    pub keyword: String,
    pub context: String,
    pub target_url: String,
}

impl TaskRow {
    pub fn has_required_fields(&self) -> bool {
        !self.source_url.is_empty() && !self.keyword.is_empty() && !self.target_url.is_empty()
    }
}

/// The CSV file held in memory for the duration of a run.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    raw: String,
    rows: Vec<Vec<String>>,
    columns: Columns,
    added_columns: Vec<String>,
}

impl CsvStore {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| InterlinkError::io(path, e))?;
        Self::from_text(path, raw)
    }

    pub fn from_text(path: &Path, raw: String) -> Result<Self> {
        let mut rows = parse_csv(&raw).map_err(|source| InterlinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if rows.is_empty() {
            return Err(InterlinkError::CsvEmpty {
                path: path.to_path_buf(),
            });
        }

        let header = &mut rows[0];
        let find = |header: &[String], name: &str| header.iter().position(|h| h == name);

        let source = find(header, COL_SOURCE_URL).or_else(|| find(header, COL_SOURCE_PAGE));
        let keyword = find(header, COL_KEYWORD);
        let context = find(header, COL_CONTEXT);
        let target = find(header, COL_TARGET);

        let (Some(source), Some(keyword), Some(context), Some(target)) =
            (source, keyword, context, target)
        else {
            let columns = [
                (source, COL_SOURCE_URL),
                (keyword, COL_KEYWORD),
                (context, COL_CONTEXT),
                (target, COL_TARGET),
            ]
            .iter()
            .filter(|(idx, _)| idx.is_none())
            .map(|(_, name)| name.to_string())
            .collect();
            return Err(InterlinkError::MissingColumns { columns });
        };

        let mut added_columns = Vec::new();
        let mut ensure = |header: &mut Vec<String>, name: &str| match find(header, name) {
            Some(idx) => idx,
            None => {
                header.push(name.to_string());
                added_columns.push(name.to_string());
                header.len() - 1
            }
        };
        let status = ensure(header, COL_STATUS);
        let reason = ensure(header, COL_REASON);

        let width = rows[0].len();
        for row in rows.iter_mut().skip(1) {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            raw,
            rows,
            columns: Columns {
                source,
                keyword,
                context,
                target,
                status,
                reason,
            },
            added_columns,
        })
    }

    /// Number of data rows (header excluded).
    pub fn len(&self) -> usize {
        self.rows.len() - 1
    }

    pub fn added_columns(&self) -> &[String] {
        &self.added_columns
    }

    pub fn task(&self, i: usize) -> TaskRow {
        let row = &self.rows[i + 1];
        let cell = |idx: usize| row.get(idx).cloned().unwrap_or_default();
        TaskRow {
            source_url: cell(self.columns.source),
            keyword: cell(self.columns.keyword),
            context: cell(self.columns.context),
            target_url: cell(self.columns.target),
        }
    }

    /// Current `interlink_status` cell of a data row.
    pub fn status(&self, i: usize) -> &str {
        &self.rows[i + 1][self.columns.status]
    }

    pub fn set_status(&mut self, i: usize, status: &RowStatus) {
        let row = &mut self.rows[i + 1];
        row[self.columns.status] = status.label().to_string();
        row[self.columns.reason] = status.reason().to_string();
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Write the table back, keeping the originally read text in a `.bak` sibling once.
    pub fn save(&self) -> Result<()> {
        let bak = self.backup_path();
        if !bak.exists() {
            fs::write(&bak, &self.raw).map_err(|e| InterlinkError::io(&bak, e))?;
            tracing::info!(path = %bak.display(), "wrote CSV backup");
        }
        let text = stringify_csv(&self.rows).map_err(|source| InterlinkError::Csv {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, text).map_err(|e| InterlinkError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), "saved CSV");
        Ok(())
    }
}
