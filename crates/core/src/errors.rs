//! Error types for the svncompare core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type. Cancellation is deliberately absent from the compare errors:
//! a cancelled build is reported through
//! [`BuildOutcome`](crate::compare::BuildOutcome) instead.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Svn(#[from] SvnError),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// SVN errors
// ---------------------------------------------------------------------------

/// Errors from SVN connector operations.
#[derive(Debug, Error)]
pub enum SvnError {
    /// The `svn` binary was not found on `$PATH`.
    #[error("svn binary not found: {0}")]
    BinaryNotFound(String),

    /// An `svn` command exited with a non-zero status.
    #[error("svn command failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        exit_code: i32,
        stderr: String,
    },

    /// Could not parse the XML output produced by `svn`.
    #[error("failed to parse svn XML output: {0}")]
    XmlParseError(String),

    /// An authentication problem with the SVN server.
    #[error("svn authentication failed for user '{username}': {detail}")]
    AuthenticationFailed {
        username: String,
        detail: String,
    },

    /// Network / connectivity issue.
    #[error("svn network error: {0}")]
    NetworkError(String),

    /// The operation noticed the progress monitor's cancellation flag before
    /// issuing any further work.
    #[error("svn operation cancelled")]
    Cancelled,

    /// Generic I/O wrapper.
    #[error("svn I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SvnError {
    /// Whether this error only signals a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SvnError::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Path errors
// ---------------------------------------------------------------------------

/// Errors raised while normalizing or decoding repository paths.
#[derive(Debug, Error)]
pub enum PathError {
    /// A URL could not be percent-decoded.
    #[error("malformed path '{url}': {detail}")]
    Malformed {
        url: String,
        detail: String,
    },

    /// A URL does not live below the root it was expected under.
    #[error("path '{url}' is not below '{root}'")]
    OutsideRoot {
        url: String,
        root: String,
    },
}

// ---------------------------------------------------------------------------
// Compare errors
// ---------------------------------------------------------------------------

/// Errors from the compare engine and compare sessions.
#[derive(Debug, Error)]
pub enum CompareError {
    /// A diff record reported a node kind that could not be resolved.
    #[error("unknown node kind for '{0}'")]
    UnknownNodeKind(String),

    /// The root of the comparison could not be located or synthesized.
    #[error("compare root not found: {0}")]
    RootNotFound(String),

    /// No node with the given key exists in the tree.
    #[error("no compare node for '{0}'")]
    NodeNotFound(String),

    /// The target side of a copy cannot be edited.
    #[error("'{path}' is read-only on the {side} side")]
    ReadOnly {
        path: String,
        side: String,
    },

    /// The source content of a copy has not been fetched yet.
    #[error("content of '{0}' is not available")]
    ContentUnavailable(String),

    /// The compare session has no tree yet.
    #[error("compare session has not been opened")]
    NotOpened,

    /// A background build task panicked or was aborted.
    #[error("compare task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Svn(#[from] SvnError),

    /// Generic I/O wrapper.
    #[error("compare I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
