// ABOUTME: Where job progress is shown: a status line, a download link and blocking alerts
// ABOUTME: Includes the terminal implementation used by the CLI

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

use crate::remote::models::JobSnapshot;

/// Text shown before the first snapshot arrives.
pub const QUEUED_TEXT: &str = "Queued…";

/// Output surface of a submission and its poll loop.
///
/// Methods are synchronous and are called from the poll task, so
/// implementations must tolerate being driven from another thread.
pub trait StatusView: Send + Sync {
    fn set_status(&self, text: &str);
    /// Whole percentage of the latest snapshot, sent just before its status line.
    fn set_progress(&self, _percent: i64) {}
    fn hide_download(&self);
    fn reveal_download(&self, url: &str);
    /// A failure the user must see. Called at most once per poll loop.
    fn alert(&self, message: &str);
}

/// `"{status} {percent}% {message}"`, e.g. `"running 42% "`.
pub fn render_status_line(snapshot: &JobSnapshot) -> String {
    format!(
        "{} {}% {}",
        snapshot.status,
        snapshot.percent(),
        snapshot.message()
    )
}

/// Renders on stderr with an indicatif bar so stdout stays free for results.
pub struct TerminalView {
    bar: ProgressBar,
    download: Mutex<Option<String>>,
}

impl TerminalView {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            download: Mutex::new(None),
        }
    }

    /// Only the revealed link, if the job succeeded.
    pub fn download_url(&self) -> Option<String> {
        self.download.lock().ok().and_then(|d| d.clone())
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusView for TerminalView {
    fn set_status(&self, text: &str) {
        self.bar.set_message(text.trim_end().to_string());
    }

    fn set_progress(&self, percent: i64) {
        self.bar.set_position(percent.clamp(0, 100) as u64);
    }

    fn hide_download(&self) {
        if let Ok(mut d) = self.download.lock() {
            *d = None;
        }
    }

    fn reveal_download(&self, url: &str) {
        if let Ok(mut d) = self.download.lock() {
            *d = Some(url.to_string());
        }
        self.bar.set_position(100);
        self.bar.println(format!("Download ready: {}", url));
    }

    fn alert(&self, message: &str) {
        self.bar.suspend(|| eprintln!("{}", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(json: &str) -> JobSnapshot {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_render_running_without_message() {
        let line = render_status_line(&snap(r#"{"status":"running","progress":0.42}"#));
        assert_eq!(line, "running 42% ");
    }

    #[test]
    fn test_render_with_message() {
        let line = render_status_line(&snap(
            r#"{"status":"running","progress":0.1,"message":"Generating code"}"#,
        ));
        assert_eq!(line, "running 10% Generating code");
    }

    #[test]
    fn test_render_queued_defaults() {
        assert_eq!(render_status_line(&snap(r#"{"status":"queued"}"#)), "queued 0% ");
    }

    #[test]
    fn test_terminal_view_progress_independent_of_label() {
        let view = TerminalView::new();
        view.set_progress(42);
        view.set_status("waiting for gpu 42% ");
        assert_eq!(view.bar.position(), 42);
        view.set_status(" 0% ");
        assert_eq!(view.bar.position(), 42);
        view.set_progress(250);
        assert_eq!(view.bar.position(), 100);
        view.set_progress(-3);
        assert_eq!(view.bar.position(), 0);
        view.finish();
    }

    #[test]
    fn test_terminal_view_tracks_download() {
        let view = TerminalView::new();
        view.set_progress(42);
        view.set_status("running 42% ");
        assert_eq!(view.download_url(), None);
        view.reveal_download("http://x/api/jobs/a/download");
        assert_eq!(
            view.download_url().as_deref(),
            Some("http://x/api/jobs/a/download")
        );
        view.hide_download();
        assert_eq!(view.download_url(), None);
        view.finish();
    }
}
