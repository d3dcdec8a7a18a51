use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

/// Receives progress ticks from long-running operations
pub trait ProgressReporter: Send {
    /// Starts a new phase. `total` is `None` when the size is unknown.
    fn begin(&mut self, label: &str, total: Option<u64>);
    fn advance(&mut self, n: u64);
    /// Updates the total once it becomes known
    fn set_total(&mut self, total: u64);
    fn finish(&mut self, message: &str);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn begin(&mut self, _label: &str, _total: Option<u64>) {}
    fn advance(&mut self, _n: u64) {}
    fn set_total(&mut self, _total: u64) {}
    fn finish(&mut self, _message: &str) {}
}

/// Terminal progress bar on stderr; hidden when stderr is not a terminal
#[derive(Debug)]
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleProgress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    fn bounded(label: &str, total: u64) -> ProgressBar {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix} [{bar:40.cyan/blue}] {pos}/{len} ({percent:>3}%) {msg}",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(label.to_string());
        bar
    }

    fn spinner(label: &str) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {prefix} {pos} {msg}") {
            bar.set_style(style);
        }
        bar.set_prefix(label.to_string());
        bar
    }
}

impl ProgressReporter for ConsoleProgress {
    fn begin(&mut self, label: &str, total: Option<u64>) {
        self.bar.finish_and_clear();
        if !std::io::stderr().is_terminal() {
            self.bar = ProgressBar::hidden();
            return;
        }
        self.bar = match total {
            Some(total) => Self::bounded(label, total),
            None => Self::spinner(label),
        };
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn advance(&mut self, n: u64) {
        self.bar.inc(n);
    }

    fn set_total(&mut self, total: u64) {
        if self.bar.is_hidden() {
            return;
        }
        let label = self.bar.prefix();
        let pos = self.bar.position();
        self.bar.finish_and_clear();
        self.bar = Self::bounded(&label, total);
        self.bar.set_position(pos);
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn finish(&mut self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::ProgressReporter;

    /// Captures events for assertions
    #[derive(Debug, Default)]
    pub struct RecordingProgress {
        pub labels: Vec<String>,
        pub total: Option<u64>,
        pub advanced: u64,
        pub finished: Vec<String>,
    }

    impl ProgressReporter for RecordingProgress {
        fn begin(&mut self, label: &str, total: Option<u64>) {
            self.labels.push(label.to_string());
            self.total = total;
        }
        fn advance(&mut self, n: u64) {
            self.advanced += n;
        }
        fn set_total(&mut self, total: u64) {
            self.total = Some(total);
        }
        fn finish(&mut self, message: &str) {
            self.finished.push(message.to_string());
        }
    }
}
