//! Fatal error types. Row-level outcomes are not errors; see [`crate::planner::SkipReason`].

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum InterlinkError {
    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed CSV, or a table that could not be serialized.
    #[error("CSV error in {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("CSV appears empty: {path:?}")]
    CsvEmpty { path: PathBuf },

    #[error("CSV missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// Config file could not be parsed.
    #[error("config error in {path:?}: {message}")]
    Config { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, InterlinkError>;

impl InterlinkError {
    /// Wrap a `std::io::Error` with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InterlinkError::MissingColumns {
            columns: vec!["Keyword".to_string(), "Target page".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "CSV missing required columns: Keyword, Target page"
        );

        let err = InterlinkError::io(
            "links.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("links.csv"));
    }
}
