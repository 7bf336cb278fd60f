use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;

/// Receives byte-count deltas while parts stream in.
///
/// Rendering is entirely up to the implementation. `start` and `finish` are
/// optional lifecycle hooks; fetchers only ever call [`ProgressSink::add`].
pub trait ProgressSink: Send + Sync {
    fn add(&self, delta: u64);

    /// Called once the total size is known, before any part is fetched.
    fn start(&self, _total: u64, _resumed_from: u64) {}

    /// Called after the last part has been merged.
    fn finish(&self) {}

    /// Called when the run fails after [`ProgressSink::start`].
    fn abandon(&self) {}
}

impl ProgressSink for ProgressBar {
    fn add(&self, delta: u64) {
        self.inc(delta);
    }

    fn start(&self, total: u64, resumed_from: u64) {
        self.set_length(total);
        self.set_position(resumed_from);
    }

    fn finish(&self) {
        self.finish_with_message("Download completed");
    }

    fn abandon(&self) {
        self.abandon_with_message("Download failed");
    }
}

/// Discards all progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn add(&self, _delta: u64) {}
}

/// Creates a configured progress bar style for downloads.
///
/// Format: `Spinner [Elapsed] [Bar] Bytes/Total (Speed, ETA)`
/// Uses cyan/blue colors for the bar and green for the spinner.
pub fn style_download_bar() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// A styled bar with unknown length; [`ProgressSink::start`] sizes it.
pub fn download_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(style_download_bar());
    pb
}

/// Helper to format bytes into human-readable strings (KB, MB, GB) for logs.
pub fn format_bytes(bytes: u64) -> Cow<'static, str> {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64).into()
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64).into()
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64).into()
    } else {
        format!("{} B", bytes).into()
    }
}
