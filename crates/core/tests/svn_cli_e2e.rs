//! End-to-end tests for the `svn` CLI connector.
//!
//! These tests exercise the real `SvnClient` with:
//! - Local SVN repos via `svnadmin create` (file:// protocol)
//! - Real working copies checked out into temporary directories
//!
//! No network I/O: every URL is a `file://` URL.
//!
//! Tests skip gracefully if `svn` / `svnadmin` are not installed.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tempfile::TempDir;

use svncompare_core::compare::{CompareSession, EntryStatus};
use svncompare_core::config::{CompareConfig, FilterConfig};
use svncompare_core::filter::ResourceProvider;
use svncompare_core::monitor::NullMonitor;
use svncompare_core::resource::{ResourceState, Revision};
use svncompare_core::svn::{ConnectorOptions, Depth, EntryRef, SvnClient, SvnConnector};
use svncompare_core::working_copy::{SnapshotWorkingCopy, WorkingCopy};

// ===========================================================================
// Helpers
// ===========================================================================

fn svn_available() -> bool {
    let available = |binary: &str| {
        Command::new(binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    };
    available("svn") && available("svnadmin")
}

fn create_svn_repo(dir: &Path) -> String {
    let repo_dir = dir.join("svn_repo");
    let status = Command::new("svnadmin")
        .args(["create", repo_dir.to_str().unwrap()])
        .status()
        .expect("failed to run svnadmin create");
    assert!(status.success(), "svnadmin create failed");
    format!("file://{}", repo_dir.display())
}

fn svn(args: &[&str]) -> String {
    let output = Command::new("svn")
        .args(args)
        .arg("--non-interactive")
        .output()
        .expect("failed to run svn");
    assert!(
        output.status.success(),
        "svn {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn checkout(url: &str, wc_path: &Path) {
    svn(&["checkout", url, wc_path.to_str().unwrap()]);
}

fn commit_file(wc_path: &Path, filename: &str, content: &str) {
    let file_path = wc_path.join(filename);
    let is_new = !file_path.exists();
    std::fs::write(&file_path, content).unwrap();
    if is_new {
        svn(&["add", file_path.to_str().unwrap()]);
    }
    svn(&["commit", "-m", "update", wc_path.to_str().unwrap()]);
    svn(&["update", wc_path.to_str().unwrap()]);
}

/// Repository with `a.txt` at r1 ("one") and r2 ("two"), plus a working
/// copy still at r1 with a local edit of `a.txt`.
struct Fixture {
    _dir: TempDir,
    url: String,
    wc: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let url = create_svn_repo(dir.path());
    let wc = dir.path().join("wc");
    let other = dir.path().join("other");

    checkout(&url, &wc);
    commit_file(&wc, "a.txt", "one\n");
    checkout(&url, &other);
    commit_file(&other, "a.txt", "two\n");
    std::fs::write(wc.join("a.txt"), "mine\n").unwrap();

    Fixture { _dir: dir, url, wc }
}

// ===========================================================================
// Connector
// ===========================================================================

#[tokio::test]
async fn test_status_reports_local_modification() {
    if !svn_available() {
        eprintln!("svn not installed; skipping");
        return;
    }
    let fx = fixture();
    let client = SvnClient::new("svn");
    let entries = client
        .status(&fx.wc, Depth::Infinity, ConnectorOptions::default(), &NullMonitor)
        .await
        .unwrap();
    let a = entries
        .iter()
        .find(|e| e.path == fx.wc.join("a.txt"))
        .expect("a.txt in status");
    assert_eq!(a.text_status, EntryStatus::Modified);
    assert_eq!(a.revision, Some(1));
}

#[tokio::test]
async fn test_content_and_diff_between_revisions() {
    if !svn_available() {
        eprintln!("svn not installed; skipping");
        return;
    }
    let fx = fixture();
    let client = SvnClient::new("svn");
    let file_url = format!("{}/a.txt", fx.url);

    let old = client
        .content(&EntryRef::at(file_url.as_str(), Revision::Number(1)), &NullMonitor)
        .await
        .unwrap();
    assert_eq!(old, b"one\n");

    let records = client
        .diff_status(
            &EntryRef::at(fx.url.as_str(), Revision::Number(1)),
            &EntryRef::at(fx.url.as_str(), Revision::Number(2)),
            Depth::Infinity,
            ConnectorOptions::default(),
            &NullMonitor,
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].path_prev.ends_with("/a.txt"));
    assert_eq!(records[0].text_status, EntryStatus::Modified);
    assert_eq!(records[0].revision, Some(2));
}

#[tokio::test]
async fn test_diff_reports_escaped_looking_name_decoded_once() {
    if !svn_available() {
        eprintln!("svn not installed; skipping");
        return;
    }
    let fx = fixture();
    let other = fx.wc.parent().unwrap().join("other");
    commit_file(&other, "x%41.txt", "first\n");
    commit_file(&other, "x%41.txt", "second\n");

    let client = SvnClient::new("svn");
    let records = client
        .diff_status(
            &EntryRef::at(fx.url.as_str(), Revision::Number(3)),
            &EntryRef::at(fx.url.as_str(), Revision::Number(4)),
            Depth::Infinity,
            ConnectorOptions::default(),
            &NullMonitor,
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].path_prev.ends_with("/x%41.txt"), "{}", records[0].path_prev);
    assert!(records[0].path_next.ends_with("/x%41.txt"), "{}", records[0].path_next);
}

// ===========================================================================
// Session over a real working copy
// ===========================================================================

#[tokio::test]
async fn test_three_way_session_finds_conflict() {
    if !svn_available() {
        eprintln!("svn not installed; skipping");
        return;
    }
    let fx = fixture();
    let client: Arc<dyn SvnConnector> = Arc::new(SvnClient::new("svn"));
    let filters = FilterConfig::default();
    let snapshot = SnapshotWorkingCopy::capture(client.as_ref(), &fx.wc, &filters, true, &NullMonitor)
        .await
        .unwrap();
    assert_eq!(snapshot.local_resource(&fx.wc.join("a.txt")).state, ResourceState::Modified);
    assert!(snapshot.root_url().is_some());

    let mut session = CompareSession::new(client, &CompareConfig::default())
        .with_working_copy(Arc::new(snapshot), &filters);
    assert!(session.has_local_changes());
    let tree = session
        .open_three_way(None, Revision::Head, Arc::new(NullMonitor))
        .await
        .unwrap();

    let a = tree
        .walk()
        .into_iter()
        .map(|id| tree.node(id))
        .find(|node| node.name == "a.txt")
        .expect("node for a.txt");
    assert!(a.kind.is_conflicting());
    assert!(tree.errors().is_empty());
}
