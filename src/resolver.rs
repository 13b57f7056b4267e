use std::path::{Path, PathBuf};

use url::Url;

/// Maps source page URLs to Markdown/MDX files under a content root.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    content_root: PathBuf,
}

impl SourceResolver {
    pub fn new(content_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
        }
    }

    /// Resolve `source_url` to the first existing file among
    /// `<path>.mdx`, `<path>.md`, `<path>/index.mdx`, `<path>/index.md`.
    pub fn resolve(&self, source_url: &str) -> Option<PathBuf> {
        let url = Url::parse(source_url).ok()?;
        let path = url.path();
        let path = path.strip_suffix('/').unwrap_or(path);
        let relative = path.trim_start_matches('/');

        let base = self.content_root.join(relative);
        let candidates = [
            with_suffix(&base, ".mdx"),
            with_suffix(&base, ".md"),
            base.join("index.mdx"),
            base.join("index.md"),
        ];

        candidates.into_iter().find(|candidate| candidate.is_file())
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
