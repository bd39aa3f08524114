//! Terminal progress reporting for long-running compares.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use svncompare_core::monitor::{CancelFlag, ProgressMonitor};

/// Spinner-backed [`ProgressMonitor`].
///
/// Cancellation comes from the shared [`CancelFlag`], which `Ctrl-C`
/// trips once [`SpinnerMonitor::cancel_on_interrupt`] is armed.
pub struct SpinnerMonitor {
    bar: ProgressBar,
    cancel: CancelFlag,
}

impl SpinnerMonitor {
    pub fn start(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.blue} {prefix:.dim} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            cancel: CancelFlag::new(),
        }
    }

    /// Spawn a task that cancels the monitor on the first interrupt.
    pub fn cancel_on_interrupt(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current item");
                cancel.cancel();
            }
        });
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressMonitor for SpinnerMonitor {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn report_progress(&self, current: u64, total: u64) {
        if total > 0 {
            self.bar.set_prefix(format!("{}/{}", current, total));
        }
    }

    fn sub_task(&self, name: &str) {
        self.bar.set_message(crate::truncate(name, 72));
    }
}
