//! svncompare core library.
//!
//! This crate provides the building blocks for comparing SVN working copies
//! with repository revisions: resource states and the state filter engine,
//! the per-selection filter cache, path utilities, the three-way and two-way
//! compare engines, compare sessions, the `svn` CLI connector, working-copy
//! providers and configuration.

pub mod compare;
pub mod config;
pub mod errors;
pub mod filter;
pub mod monitor;
pub mod path;
pub mod resource;
pub mod svn;
pub mod working_copy;

// Re-exports for convenience.
pub use compare::{CompareSession, CompareTree, DiffKind};
pub use config::AppConfig;
pub use filter::{FilterManager, StateFilter};
pub use monitor::{CancelFlag, NullMonitor, ProgressMonitor};
pub use svn::{SvnClient, SvnConnector};
pub use working_copy::{MemoryWorkingCopy, SnapshotWorkingCopy, WorkingCopy};
