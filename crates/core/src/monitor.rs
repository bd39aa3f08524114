//! Cooperative progress reporting and cancellation.
//!
//! Every long-running core operation takes a `&dyn ProgressMonitor` and
//! checks [`ProgressMonitor::is_cancelled`] at each per-path or per-child
//! iteration boundary. Cancellation is never preemptive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress and cancellation channel passed through long-running work.
pub trait ProgressMonitor: Send + Sync {
    /// Whether the caller asked the operation to stop.
    fn is_cancelled(&self) -> bool;

    /// Report `current` of `total` units done. `total` may be zero when
    /// the amount of work is unknown.
    fn report_progress(&self, current: u64, total: u64);

    /// Describe the step that is starting.
    fn sub_task(&self, _name: &str) {}
}

/// A monitor that is never cancelled and discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl ProgressMonitor for NullMonitor {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn report_progress(&self, _current: u64, _total: u64) {}
}

/// Shared cancellation flag usable as a monitor.
///
/// Clones share the same flag, so a UI or signal handler can keep one clone
/// and hand another to the background task.
#[derive(Debug, Default, Clone)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl ProgressMonitor for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn report_progress(&self, _current: u64, _total: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_null_monitor_never_cancels() {
        let monitor = NullMonitor;
        monitor.report_progress(1, 2);
        monitor.sub_task("noop");
        assert!(!monitor.is_cancelled());
    }
}
