//! Asynchronous SVN CLI client.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::connector::{ensure_not_cancelled, SvnConnector};
use super::parser::{parse_svn_diff_summarize, parse_svn_info, parse_svn_proplist, parse_svn_status};
use super::types::{
    ConnectorOptions, Depth, DiffStatusRecord, EntryRef, InfoEntry, PropertyRecord, StatusEntry,
};
use crate::config::SvnConfig;
use crate::errors::SvnError;
use crate::monitor::ProgressMonitor;
use crate::path::{decode_url, encode_url, join_url, normalize_url, relative_suffix};
use crate::resource::Revision;

/// [`SvnConnector`] backed by the `svn` command-line client.
#[derive(Debug, Clone)]
pub struct SvnClient {
    binary: String,
    username: Option<String>,
    password: Option<String>,
    trust_server_cert: bool,
}

impl SvnClient {
    /// Create a client running `binary` without explicit credentials.
    pub fn new(binary: impl Into<String>) -> Self {
        let client = Self {
            binary: binary.into(),
            username: None,
            password: None,
            trust_server_cert: false,
        };
        info!(binary = %client.binary, "created SvnClient");
        client
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Build a client from the `[svn]` config section. The password must
    /// already be resolved from its environment variable.
    pub fn from_config(config: &SvnConfig) -> Self {
        let mut client = Self::new(config.binary.clone());
        client.username = config.username.clone();
        client.password = config.password.clone();
        client.trust_server_cert = config.trust_server_cert;
        client
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run_svn(&self, args: &[String]) -> Result<String, SvnError> {
        let stdout = self.run_svn_raw(args).await?;
        Ok(String::from_utf8_lossy(&stdout).to_string())
    }

    async fn run_svn_raw(&self, args: &[String]) -> Result<Vec<u8>, SvnError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).arg("--non-interactive").arg("--no-auth-cache");
        if let Some(username) = &self.username {
            cmd.arg("--username").arg(username);
        }
        if let Some(password) = &self.password {
            cmd.arg("--password").arg(password);
        }
        if self.trust_server_cert {
            cmd.arg("--trust-server-cert-failures=unknown-ca,cn-mismatch,expired,not-yet-valid,other");
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        debug!(cmd = ?format!("{} {}", self.binary, args.join(" ")), "running svn command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SvnError::BinaryNotFound(self.binary.clone())
            } else {
                SvnError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, %stderr, "svn command failed");
            return Err(self.classify_failure(exit_code, stderr));
        }
        Ok(output.stdout)
    }

    fn classify_failure(&self, exit_code: i32, stderr: String) -> SvnError {
        if stderr.contains("E170001") || stderr.contains("E215004") {
            SvnError::AuthenticationFailed {
                username: self.username.clone().unwrap_or_default(),
                detail: stderr.trim().to_string(),
            }
        } else if stderr.contains("E170013") || stderr.contains("E175002") || stderr.contains("E731001") {
            SvnError::NetworkError(stderr.trim().to_string())
        } else {
            SvnError::CommandFailed { exit_code, stderr }
        }
    }
}

#[async_trait]
impl SvnConnector for SvnClient {
    #[instrument(skip(self, monitor), fields(path = %path.display()))]
    async fn status(
        &self,
        path: &Path,
        depth: Depth,
        options: ConnectorOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<StatusEntry>, SvnError> {
        ensure_not_cancelled(monitor)?;
        let mut args = vec![
            "status".to_string(),
            "--xml".to_string(),
            "-v".to_string(),
            "--depth".to_string(),
            depth.as_arg().to_string(),
        ];
        if options.ignore_externals {
            args.push("--ignore-externals".into());
        }
        if options.server_side {
            args.push("-u".into());
        }
        args.push(path.to_string_lossy().to_string());
        let output = self.run_svn(&args).await?;
        let entries = parse_svn_status(&output)?;
        debug!(count = entries.len(), "svn status completed");
        Ok(entries)
    }

    #[instrument(skip(self, monitor), fields(prev = %prev.target, next = %next.target))]
    async fn diff_status(
        &self,
        prev: &EntryRef,
        next: &EntryRef,
        depth: Depth,
        _options: ConnectorOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<DiffStatusRecord>, SvnError> {
        ensure_not_cancelled(monitor)?;
        let mut args = vec![
            "diff".to_string(),
            "--summarize".to_string(),
            "--xml".to_string(),
            "--depth".to_string(),
            depth.as_arg().to_string(),
            format!("--old={}", target_arg(&pegged(prev))),
            format!("--new={}", target_arg(&pegged(next))),
        ];
        let output = self.run_svn(&args).await?;
        let entries = parse_svn_diff_summarize(&output)?;

        // Targets are already decoded; only the paths svn reports are escaped.
        let prev_root = normalize_url(&prev.target);
        let next_root = normalize_url(&next.target);
        let next_revision = next.revision.and_then(Revision::number);

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            ensure_not_cancelled(monitor)?;
            let reported = normalize_url(&decode_url(&entry.path).map_err(path_failure)?);
            let suffix = match relative_suffix(&reported, &prev_root)
                .or_else(|| relative_suffix(&reported, &next_root))
            {
                Some(suffix) => suffix.to_string(),
                None => {
                    warn!(path = %reported, "diff entry outside both compared roots; skipping");
                    continue;
                }
            };
            let mut record = DiffStatusRecord::new(
                join_url(&prev_root, &suffix),
                join_url(&next_root, &suffix),
                entry.kind,
                entry.item,
                entry.props,
            );
            record.revision = next_revision;
            records.push(record);
        }
        debug!(count = records.len(), "svn diff --summarize completed");
        Ok(records)
    }

    #[instrument(skip(self, monitor), fields(target = %target.target))]
    async fn properties(
        &self,
        target: &EntryRef,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<PropertyRecord>, SvnError> {
        ensure_not_cancelled(monitor)?;
        let mut args = vec!["proplist".to_string(), "-v".to_string(), "--xml".to_string()];
        push_revision(&mut args, target);
        args.push(target_arg(target));
        let output = self.run_svn(&args).await?;
        parse_svn_proplist(&output)
    }

    #[instrument(skip(self, monitor), fields(target = %target.target))]
    async fn content(&self, target: &EntryRef, monitor: &dyn ProgressMonitor) -> Result<Vec<u8>, SvnError> {
        ensure_not_cancelled(monitor)?;
        let mut args = vec!["cat".to_string()];
        push_revision(&mut args, target);
        args.push(target_arg(target));
        let bytes = self.run_svn_raw(&args).await?;
        debug!(len = bytes.len(), "svn cat completed");
        Ok(bytes)
    }

    #[instrument(skip(self, monitor), fields(target = %target.target))]
    async fn info(
        &self,
        target: &EntryRef,
        depth: Depth,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<InfoEntry>, SvnError> {
        ensure_not_cancelled(monitor)?;
        let mut args = vec![
            "info".to_string(),
            "--xml".to_string(),
            "--depth".to_string(),
            depth.as_arg().to_string(),
        ];
        push_revision(&mut args, target);
        args.push(target_arg(target));
        let output = self.run_svn(&args).await?;
        parse_svn_info(&output)
    }
}

/// Diff sides carry their revision as a peg so `--old`/`--new` stay
/// self-contained.
fn pegged(entry: &EntryRef) -> EntryRef {
    let mut pegged = entry.clone();
    if pegged.peg.is_none() {
        pegged.peg = entry.revision.filter(|r| revision_arg(*r).is_some());
    }
    pegged.revision = None;
    pegged
}

fn target_arg(entry: &EntryRef) -> String {
    let target = if entry.is_url() {
        encode_url(&entry.target)
    } else {
        entry.target.clone()
    };
    match entry.peg.and_then(revision_arg) {
        Some(peg) => format!("{}@{}", target, peg),
        None => target,
    }
}

fn push_revision(args: &mut Vec<String>, entry: &EntryRef) {
    if let Some(rev) = entry.revision.and_then(revision_arg) {
        args.push("-r".into());
        args.push(rev);
    }
}

fn revision_arg(revision: Revision) -> Option<String> {
    match revision {
        Revision::Working | Revision::Invalid => None,
        other => Some(other.to_string()),
    }
}

fn path_failure(err: crate::errors::PathError) -> SvnError {
    SvnError::XmlParseError(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::CancelFlag;

    #[test]
    fn test_client_construction() {
        let client = SvnClient::new("svn").with_credentials("alice", "secret");
        assert_eq!(client.binary(), "svn");
        assert_eq!(client.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_from_config_copies_resolved_password() {
        let mut config = SvnConfig::default();
        config.username = Some("bob".into());
        config.password = Some("pw".into());
        config.trust_server_cert = true;
        let client = SvnClient::from_config(&config);
        assert_eq!(client.password.as_deref(), Some("pw"));
        assert!(client.trust_server_cert);
    }

    #[test]
    fn test_target_arg_encodes_urls_and_appends_peg() {
        let entry = EntryRef::new("https://svn.example.com/repo/a b.txt").with_peg(Some(Revision::Number(5)));
        assert_eq!(target_arg(&entry), "https://svn.example.com/repo/a%20b.txt@5");
        let local = EntryRef::new("/work/a b.txt");
        assert_eq!(target_arg(&local), "/work/a b.txt");
    }

    #[test]
    fn test_pegged_moves_revision_to_peg() {
        let entry = EntryRef::at("https://svn.example.com/repo", Revision::Head);
        let pegged = pegged(&entry);
        assert_eq!(pegged.peg, Some(Revision::Head));
        assert_eq!(pegged.revision, None);

        let working = EntryRef::at("/work", Revision::Working);
        assert_eq!(super::pegged(&working).peg, None);
    }

    #[test]
    fn test_classify_failure() {
        let client = SvnClient::new("svn").with_credentials("carol", "x");
        assert!(matches!(
            client.classify_failure(1, "svn: E170001: Authentication failed".into()),
            SvnError::AuthenticationFailed { ref username, .. } if username == "carol"
        ));
        assert!(matches!(
            client.classify_failure(1, "svn: E170013: Unable to connect".into()),
            SvnError::NetworkError(_)
        ));
        assert!(matches!(
            client.classify_failure(1, "svn: E155007: not a working copy".into()),
            SvnError::CommandFailed { exit_code: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_spawning() {
        let client = SvnClient::new("/nonexistent/svn-binary");
        let flag = CancelFlag::new();
        flag.cancel();
        let result = client
            .status(Path::new("/tmp"), Depth::Infinity, ConnectorOptions::default(), &flag)
            .await;
        assert!(matches!(result, Err(SvnError::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_binary_reported() {
        let client = SvnClient::new("/nonexistent/svn-binary");
        let result = client
            .content(&EntryRef::new("https://svn.example.com/repo/a.txt"), &crate::monitor::NullMonitor)
            .await;
        assert!(matches!(result, Err(SvnError::BinaryNotFound(_))));
    }
}
