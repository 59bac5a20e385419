use indicatif::{ProgressBar, ProgressStyle};

/// Observer for the progress of a computation.
///
/// The executor calls `start` once with the number of tasks in the graph, `advance` as chunk
/// reads and array operations finish, and `finish` when the result is ready. A computation that
/// fails after `start` calls `abandon` instead of `finish`.
///
pub trait Progress: Send + Sync {
    fn start(&self, total: u64);

    fn advance(&self, tasks: u64);

    fn finish(&self);

    fn abandon(&self);
}

/// Ignores progress
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&self, _total: u64) {}

    fn advance(&self, _tasks: u64) {}

    fn finish(&self) {}

    fn abandon(&self) {}
}

/// Draws a progress bar on the terminal
///
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new<S: Into<String>>(message: S) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} tasks ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message(message.into());

        Self { bar }
    }
}

impl Progress for ProgressReporter {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn advance(&self, tasks: u64) {
        self.bar.inc(tasks);
    }

    fn finish(&self) {
        self.bar.finish();
    }

    fn abandon(&self) {
        let message = format!("{} failed", self.bar.message());
        self.bar.abandon_with_message(message);
    }
}
