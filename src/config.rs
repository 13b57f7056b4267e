//! Optional `.interlinker.toml` configuration.
//!
//! CLI flags override config file values, which override defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InterlinkError, Result};

pub const DEFAULT_CONFIG_FILE: &str = ".interlinker.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// CSV task list, relative to the run root unless absolute.
    #[serde(default = "default_csv")]
    pub csv: String,

    /// Directory under the run root that holds the Markdown/MDX content.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Successful insertions between CSV saves.
    #[serde(default = "default_save_every")]
    pub save_every: usize,

    #[serde(default)]
    pub planner: PlannerConfig,
}

/// `[planner]` section: placement tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Eligible words per allowed link; the per-document cap is `words / words_per_link`.
    #[serde(default = "default_words_per_link")]
    pub words_per_link: usize,

    /// Minimum word distance from the previous insertion in the preferred pass.
    #[serde(default = "default_min_spacing_words")]
    pub min_spacing_words: usize,

    /// A first block shorter than this is never linked.
    #[serde(default = "default_short_intro_words")]
    pub short_intro_words: usize,

    #[serde(default = "default_min_keyword_chars")]
    pub min_keyword_chars: usize,

    /// Keywords never linked (case-insensitive exact match).
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            csv: default_csv(),
            content_dir: default_content_dir(),
            save_every: default_save_every(),
            planner: PlannerConfig::default(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            words_per_link: default_words_per_link(),
            min_spacing_words: default_min_spacing_words(),
            short_intro_words: default_short_intro_words(),
            min_keyword_chars: default_min_keyword_chars(),
            denylist: default_denylist(),
        }
    }
}

fn default_csv() -> String {
    "scripts/data/interlinking.csv".into()
}
fn default_content_dir() -> String {
    "data".into()
}
fn default_save_every() -> usize {
    50
}
fn default_words_per_link() -> usize {
    200
}
fn default_min_spacing_words() -> usize {
    100
}
fn default_short_intro_words() -> usize {
    15
}
fn default_min_keyword_chars() -> usize {
    3
}
fn default_denylist() -> Vec<String> {
    vec!["prometheus or".into()]
}

impl Config {
    /// Load config from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|e| InterlinkError::io(path, e))?;
        Self::parse(&text).map_err(|message| InterlinkError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        if config.planner.words_per_link == 0 {
            return Err("planner.words_per_link must be greater than 0".into());
        }
        Ok(config)
    }
}

impl PlannerConfig {
    pub fn is_denylisted(&self, keyword: &str) -> bool {
        let key = keyword.trim().to_lowercase();
        self.denylist.iter().any(|d| d.trim().to_lowercase() == key)
    }
}
