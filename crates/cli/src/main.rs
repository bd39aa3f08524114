//! svncompare command-line tool.
//!
//! Compares SVN working copies with repository revisions (three-way) or two
//! repository trees with each other (two-way), checks state filters against
//! working-copy items, and generates / validates configuration files.

mod compare;
mod progress;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use svncompare_core::config::AppConfig;
use svncompare_core::filter::{builtin, FilterManager};
use svncompare_core::resource::Revision;
use svncompare_core::svn::SvnClient;
use svncompare_core::working_copy::SnapshotWorkingCopy;

use crate::compare::OutputOptions;
use crate::progress::SpinnerMonitor;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// svncompare command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "svncompare",
    version,
    about = "Compare SVN working copies and repository trees"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to
    /// `<config dir>/svncompare/config.toml`; a missing default file means
    /// built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, overriding `logging.level` (e.g. "debug").
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Three-way compare of a working copy with the repository.
    Compare {
        /// Working copy root.
        #[arg(default_value = ".")]
        wc_path: PathBuf,

        /// Revision to compare with: a number, HEAD or BASE.
        #[arg(short, long, default_value = "HEAD")]
        revision: Revision,

        /// Repository URL to compare with instead of the working copy's own.
        #[arg(short, long)]
        url: Option<String>,

        /// Print the tree as JSON.
        #[arg(long)]
        json: bool,

        /// Include unchanged nodes.
        #[arg(short, long)]
        all: bool,
    },

    /// Two-way compare of two repository locations (`URL[@REV]`).
    CompareUrls {
        /// The newer tree.
        next: String,

        /// The older tree.
        prev: String,

        /// Print the tree as JSON.
        #[arg(long)]
        json: bool,

        /// Include unchanged nodes.
        #[arg(short, long)]
        all: bool,
    },

    /// Check whether working-copy items match a state filter.
    Check {
        /// Built-in filter name (see `svncompare filters`).
        filter: String,

        /// Items to check.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Working copy root.
        #[arg(long, default_value = ".")]
        wc: PathBuf,

        /// Also look inside folders.
        #[arg(short, long)]
        recursive: bool,
    },

    /// List the built-in state filters.
    Filters,

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The config file may set the log level, so it is read before the
    // subscriber exists; load errors surface again from `run`.
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let file_level = AppConfig::load_from_file(&config_path)
        .ok()
        .map(|config| config.logging.level);
    let directive = log_directive(cli.log_level.as_deref(), file_level.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let explicit_config = cli.config.is_some();
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);

    match cli.command {
        Commands::Init { output } => cmd_init(&output.unwrap_or(config_path)),
        Commands::Validate => cmd_validate(&config_path),
        Commands::Filters => cmd_filters(),
        command => {
            let config = load_config(&config_path, explicit_config)?;
            match command {
                Commands::Compare {
                    wc_path,
                    revision,
                    url,
                    json,
                    all,
                } => {
                    compare::cmd_compare(&config, &wc_path, url.as_deref(), revision, OutputOptions { json, all })
                        .await
                }
                Commands::CompareUrls { next, prev, json, all } => {
                    compare::cmd_compare_urls(&config, &next, &prev, OutputOptions { json, all }).await
                }
                Commands::Check {
                    filter,
                    paths,
                    wc,
                    recursive,
                } => cmd_check(&config, &filter, &paths, &wc, recursive).await,
                _ => unreachable!(),
            }
        }
    }
}

/// `--log-level` wins over the config file; "warn" otherwise.
fn log_directive(flag: Option<&str>, file: Option<&str>) -> String {
    flag.or(file)
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or("warn")
        .to_string()
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load the configuration. A missing file is only an error when the path
/// was given explicitly.
fn load_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if !explicit && !path.exists() {
        debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(AppConfig::default());
    }
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_check(config: &AppConfig, filter: &str, paths: &[PathBuf], wc: &Path, recursive: bool) -> Result<()> {
    let state_filter = builtin::by_name(filter).with_context(|| {
        format!("unknown filter '{}'; available: {}", filter, builtin::names().join(", "))
    })?;

    let root = compare::absolute(wc)?;
    let selection = paths
        .iter()
        .map(|p| compare::absolute(p))
        .collect::<Result<Vec<_>>>()?;

    let client = SvnClient::from_config(&config.svn);
    let monitor = SpinnerMonitor::start("reading working copy status");
    let snapshot = SnapshotWorkingCopy::capture(
        &client,
        &root,
        &config.filters,
        config.compare.ignore_externals,
        &monitor,
    )
    .await;
    monitor.finish();
    let snapshot = snapshot.context("failed to read working copy status")?;

    let manager = FilterManager::new(Arc::new(snapshot), config.filters.precise_enablements);
    let present = if recursive {
        manager.check_for_resources_presence_recursive(&selection, &state_filter)
    } else {
        manager.check_for_resources_presence(&selection, &state_filter)
    };
    debug!(stats = ?manager.stats(), "filter cache");

    let scope = if recursive { " (recursive)" } else { "" };
    if present {
        println!(
            "{}",
            style::success(&format!("{} matches the selection{}", state_filter.name(), scope))
        );
    } else {
        println!(
            "{}",
            style::error(&format!("{} does not match the selection{}", state_filter.name(), scope))
        );
    }
    Ok(())
}

fn cmd_filters() -> Result<()> {
    println!("{}", style::header("Built-in state filters"));
    for name in builtin::names() {
        println!("  {}", name);
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    let body = AppConfig::default()
        .to_toml_string()
        .context("failed to render default configuration")?;
    let contents = format!(
        "# svncompare configuration\n\
         # The SVN password is never stored here; set svn.password_env to the\n\
         # name of an environment variable holding it.\n\n{}",
        body
    );

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(output, contents).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your SVN username and ignore patterns");
    println!("  2. Set the environment variable named by svn.password_env, if any");
    println!("  3. Validate with: svncompare validate --config {}", output.display());
    println!("  4. Compare a working copy: svncompare compare --config {} <wc-path>", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    // Missing variables only warn.
    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  SVN binary      : {}", config.svn.binary);
    println!(
        "  SVN user        : {}",
        config.svn.username.as_deref().unwrap_or("(anonymous)")
    );
    println!(
        "  SVN password    : {}",
        match (&config.svn.password_env, &config.svn.password) {
            (None, _) => "not configured",
            (Some(_), Some(_)) => "set",
            (Some(_), None) => "NOT SET",
        }
    );
    println!("  Trust cert      : {}", config.svn.trust_server_cert);
    println!("  Precise filters : {}", config.filters.precise_enablements);
    println!("  Global ignores  : {}", config.filters.global_ignores.len());
    println!("  Ignore externals: {}", config.compare.ignore_externals);
    println!("  Fetch contents  : {}", config.compare.fetch_contents);
    println!("  Log level       : {}", config.logging.level);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

/// Shorten `s` to at most `max_len` characters, marking the cut with "...".
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directive_precedence() {
        assert_eq!(log_directive(Some("debug"), Some("info")), "debug");
        assert_eq!(log_directive(None, Some("info")), "info");
        assert_eq!(log_directive(None, None), "warn");
        assert_eq!(log_directive(Some("  "), None), "warn");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long message here", 10), "a long ...");
        assert_eq!(truncate("äöüäöüäöü", 5), "äö...");
    }

    #[test]
    fn test_cli_parses_compare() {
        let cli = Cli::try_parse_from(["svncompare", "compare", "wc", "-r", "42", "--url", "http://h/repo"]).unwrap();
        match cli.command {
            Commands::Compare { wc_path, revision, url, .. } => {
                assert_eq!(wc_path, PathBuf::from("wc"));
                assert_eq!(revision, Revision::Number(42));
                assert_eq!(url.as_deref(), Some("http://h/repo"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_check_requires_paths() {
        assert!(Cli::try_parse_from(["svncompare", "check", "modified"]).is_err());
        assert!(Cli::try_parse_from(["svncompare", "check", "modified", "a.txt", "-r"]).is_ok());
    }

    #[test]
    fn test_missing_default_config_uses_defaults() {
        let dir = std::env::temp_dir().join("svncompare-missing-config");
        let config = load_config(&dir.join("config.toml"), false).unwrap();
        assert_eq!(config.svn.binary, "svn");
        assert!(load_config(&dir.join("config.toml"), true).is_err());
    }

    #[test]
    fn test_init_then_validate_round_trip() {
        let dir = std::env::temp_dir().join(format!("svncompare-init-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");
        let _ = std::fs::remove_dir_all(&dir);

        cmd_init(&path).unwrap();
        assert!(cmd_init(&path).is_err());
        cmd_validate(&path).unwrap();
        let config = load_config(&path, true).unwrap();
        assert_eq!(config.logging.level, "warn");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
