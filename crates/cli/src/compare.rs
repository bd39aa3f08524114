//! `compare` and `compare-urls` subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use tracing::info;

use svncompare_core::compare::{CompareSession, CompareTree, ResourceElement};
use svncompare_core::config::AppConfig;
use svncompare_core::monitor::ProgressMonitor;
use svncompare_core::resource::{RepositoryResource, ResourceKind, Revision};
use svncompare_core::svn::{SvnClient, SvnConnector};
use svncompare_core::working_copy::SnapshotWorkingCopy;

use crate::progress::SpinnerMonitor;
use crate::style;

/// How the resulting tree is printed.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub all: bool,
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

/// Three-way compare of a working copy with a repository revision.
pub async fn cmd_compare(
    config: &AppConfig,
    wc_path: &Path,
    url: Option<&str>,
    revision: Revision,
    output: OutputOptions,
) -> Result<()> {
    let root = absolute(wc_path)?;
    let connector: Arc<dyn SvnConnector> = Arc::new(SvnClient::from_config(&config.svn));

    let monitor = Arc::new(SpinnerMonitor::start("reading working copy status"));
    monitor.cancel_on_interrupt();

    let snapshot = SnapshotWorkingCopy::capture(
        connector.as_ref(),
        &root,
        &config.filters,
        config.compare.ignore_externals,
        monitor.as_ref(),
    )
    .await;
    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(e) => {
            monitor.finish();
            return Err(e).context("failed to read working copy status");
        }
    };
    info!(root = %root.display(), entries = snapshot.len(), "working copy captured");

    let mut session = CompareSession::new(Arc::clone(&connector), &config.compare)
        .with_working_copy(Arc::new(snapshot), &config.filters);

    monitor.sub_task("comparing with repository");
    let progress: Arc<dyn ProgressMonitor> = monitor.clone();
    let opened = session.open_three_way(url, revision, progress).await.map(|_| ());
    monitor.finish();
    opened.context("compare failed")?;

    print_tree(session.tree()?, output, true)?;
    report_outcome(&session);
    let discarded = session.close();
    info!(discarded, "compare session closed");
    Ok(())
}

/// Two-way compare of two repository locations given as `URL[@REV]`.
pub async fn cmd_compare_urls(config: &AppConfig, next: &str, prev: &str, output: OutputOptions) -> Result<()> {
    let next = parse_target(next).with_context(|| format!("invalid target '{}'", next))?;
    let prev = parse_target(prev).with_context(|| format!("invalid target '{}'", prev))?;
    let connector: Arc<dyn SvnConnector> = Arc::new(SvnClient::from_config(&config.svn));

    let monitor = Arc::new(SpinnerMonitor::start("comparing repository trees"));
    monitor.cancel_on_interrupt();

    let mut session = CompareSession::new(connector, &config.compare);
    let progress: Arc<dyn ProgressMonitor> = monitor.clone();
    let opened = session.open_two_way(next, prev, progress).await.map(|_| ());
    monitor.finish();
    opened.context("compare failed")?;

    print_tree(session.tree()?, output, false)?;
    report_outcome(&session);
    session.close();
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_tree(tree: &CompareTree, output: OutputOptions, three_way: bool) -> Result<()> {
    let ids: Vec<_> = tree
        .walk()
        .into_iter()
        .filter(|&id| output.all || Some(id) == tree.root() || !tree.node(id).kind.is_no_change())
        .collect();

    if output.json {
        let nodes: Vec<_> = ids.iter().map(|&id| tree.node(id)).collect();
        let doc = serde_json::json!({
            "nodes": nodes,
            "errors": tree.errors(),
        });
        println!("{}", serde_json::to_string_pretty(&doc).context("failed to encode tree")?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if three_way {
        table.set_header(vec!["Path", "", "Change", "Local", "Base", "Remote", "Error"]);
    } else {
        table.set_header(vec!["Path", "", "Change", "Next", "Prev", "Error"]);
    }

    for id in ids {
        let node = tree.node(id);
        let mut name = format!("{}{}", "  ".repeat(tree.depth(id)), node.name);
        if node.is_folder() {
            name.push('/');
        }
        let color = style::direction_color(node.kind);
        let mut row = vec![
            Cell::new(name),
            Cell::new(style::direction_arrow(node.kind)).fg(color),
            Cell::new(node.kind.to_string()).fg(color),
            Cell::new(revision_label(&node.left)),
        ];
        if three_way {
            row.push(Cell::new(revision_label(&node.ancestor)));
        }
        row.push(Cell::new(revision_label(&node.right)));
        let error = node.error.as_deref().map(truncate_error).unwrap_or_default();
        row.push(Cell::new(error).fg(comfy_table::Color::Red));
        table.add_row(row);
    }
    println!("{table}");

    if !tree.errors().is_empty() {
        println!();
        println!("{}", style::header("Errors"));
        for error in tree.errors() {
            println!("  {}", style::error(&format!("{}: {}", error.path, error.message)));
        }
    }
    Ok(())
}

fn report_outcome(session: &CompareSession) {
    let Ok(tree) = session.tree() else {
        return;
    };
    let changes = tree
        .walk()
        .into_iter()
        .filter(|&id| !tree.node(id).kind.is_no_change())
        .count();
    let conflicts = tree
        .walk()
        .into_iter()
        .filter(|&id| tree.node(id).kind.is_conflicting())
        .count();

    println!();
    if session.was_cancelled() {
        println!("{}", style::warn("compare was cancelled; the tree is incomplete"));
    }
    if changes == 0 {
        println!("{}", style::success("no differences"));
    } else {
        println!(
            "{} {}",
            style::header(&format!("{} change(s), {} conflicting", changes, conflicts)),
            style::dim(&format!("(session {})", session.id()))
        );
    }
}

fn revision_label(element: &ResourceElement) -> String {
    if element.is_shown() {
        element.selected().to_string()
    } else {
        "-".into()
    }
}

fn truncate_error(message: &str) -> String {
    crate::truncate(message.lines().next().unwrap_or(message), 60)
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// Parse `URL[@REV]` into a folder resource. A missing or non-revision
/// suffix selects HEAD.
pub fn parse_target(target: &str) -> Result<RepositoryResource> {
    let (url, revision) = match target.rsplit_once('@') {
        Some((url, rev)) if !rev.contains('/') => {
            let revision = rev.parse::<Revision>().map_err(anyhow::Error::msg)?;
            (url, revision)
        }
        _ => (target, Revision::Head),
    };
    if url.is_empty() {
        anyhow::bail!("empty URL");
    }
    let mut resource = RepositoryResource::new(ResourceKind::Folder, url.trim_end_matches('/'), revision);
    resource.set_peg(Some(revision));
    Ok(resource)
}

/// Absolute form of a path without touching the file system.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}
