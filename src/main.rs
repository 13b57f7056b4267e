mod blocks;
mod config;
mod csv_store;
mod document;
mod driver;
mod error;
mod planner;
mod protect;
mod resolver;

use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;

use config::{Config, DEFAULT_CONFIG_FILE};
use driver::{RunOptions, RunSummary};

/// interlinker - Insert CSV-driven interlinks into Markdown/MDX content
#[derive(Parser)]
#[command(name = "interlinker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// CSV task list (relative to --root)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Project root; content is resolved under <root>/data
    #[arg(long)]
    root: Option<PathBuf>,

    /// Compute everything but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Stop after N successful insertions (0 = unlimited)
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Stop before modifying more than N distinct sources (0 = unlimited)
    #[arg(long, value_name = "N")]
    source_limit: Option<usize>,

    /// Only process rows for this source URL
    #[arg(long, value_name = "URL")]
    only_source: Option<String>,

    /// Save the CSV every N successful insertions
    #[arg(long, value_name = "N")]
    save_every: Option<usize>,

    /// Process rows even if they already carry a status
    #[arg(long)]
    force_reprocess: bool,

    /// Config file path (relative to --root)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Quiet mode - suppress the summary
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = build_options(&cli).and_then(|options| driver::run(&options));

    match result {
        Ok(summary) => {
            if cli.json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("{}: {}", "error".red().bold(), e);
                        std::process::exit(1);
                    }
                }
            } else if !cli.quiet {
                print_summary(&summary);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbose {
        0 => "interlinker=warn",
        1 => "interlinker=info",
        2 => "interlinker=debug",
        _ => "interlinker=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Merge CLI flags over the config file over defaults.
fn build_options(cli: &Cli) -> error::Result<RunOptions> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().map_err(|e| error::InterlinkError::io(".", e))?,
    };
    let config = Config::load(&resolve_under(&root, &cli.config))?;

    let csv = cli.csv.clone().unwrap_or_else(|| PathBuf::from(&config.csv));
    let nonzero = |n: Option<usize>| n.filter(|&n| n > 0);

    Ok(RunOptions {
        csv_path: resolve_under(&root, &csv),
        content_root: root.join(&config.content_dir),
        dry_run: cli.dry_run,
        limit: nonzero(cli.limit),
        source_limit: nonzero(cli.source_limit),
        only_source: cli.only_source.clone(),
        save_every: cli.save_every.unwrap_or(config.save_every),
        force_reprocess: cli.force_reprocess,
        planner: config.planner,
    })
}

fn print_summary(summary: &RunSummary) {
    if summary.dry_run {
        println!("{}", "Dry run - no files written".yellow().bold());
    }
    println!("Processed rows:   {}", summary.processed.to_string().cyan());
    println!("Modified sources: {}", summary.modified_sources.to_string().cyan());

    if !summary.added_columns.is_empty() {
        println!("Added CSV columns: {}", summary.added_columns.join(", ").dimmed());
    }

    if !summary.skipped.is_empty() {
        println!();
        println!("{}", "Skipped".yellow().bold());
        for (reason, count) in &summary.skipped {
            println!("  {:>28} {}", reason.as_str(), count.to_string().cyan());
        }
    }

    if !summary.updated_paths.is_empty() {
        println!();
        println!("{}", "Updated sources:".green().bold());
        for path in &summary.updated_paths {
            println!(" - {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cli_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "csv = \"links/tasks.csv\"\ncontent_dir = \"content\"\nsave_every = 7\n[planner]\nshort_intro_words = 5\n",
        )
        .unwrap();

        let root = dir.path().to_string_lossy().to_string();
        let root = root.as_str();
        let cli = Cli::parse_from(["interlinker", "--root", root, "--limit", "0", "--source-limit", "3"]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options.csv_path, dir.path().join("links/tasks.csv"));
        assert_eq!(options.content_root, dir.path().join("content"));
        assert_eq!(options.save_every, 7);
        assert_eq!(options.limit, None);
        assert_eq!(options.source_limit, Some(3));
        assert_eq!(options.planner.short_intro_words, 5);
        assert_eq!(options.planner.min_spacing_words, 100);

        let cli = Cli::parse_from([
            "interlinker",
            "--root",
            root,
            "--csv",
            "/abs/other.csv",
            "--save-every",
            "2",
            "--dry-run",
            "--force-reprocess",
            "--only-source",
            "https://site.io/a",
        ]);
        let options = build_options(&cli).unwrap();
        assert_eq!(options.csv_path, PathBuf::from("/abs/other.csv"));
        assert_eq!(options.save_every, 2);
        assert!(options.dry_run);
        assert!(options.force_reprocess);
        assert_eq!(options.only_source.as_deref(), Some("https://site.io/a"));
    }

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let root = root.as_str();
        let cli = Cli::parse_from(["interlinker", "--root", root]);
        let options = build_options(&cli).unwrap();
        assert_eq!(
            options.csv_path,
            dir.path().join("scripts/data/interlinking.csv")
        );
        assert_eq!(options.content_root, dir.path().join("data"));
        assert_eq!(options.save_every, 50);
        assert!(!options.dry_run);
    }
}
