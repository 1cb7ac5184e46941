//! Progress reporting abstraction for long-running operations.
//!
//! Repositories and use cases report chunk and page progress through
//! [`ProgressReporter`]; the CLI plugs in [`BarProgressReporter`], tests and
//! library callers use [`NoopProgressReporter`].

use std::sync::Arc;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

/// Reports progress for long-running operations.
///
/// `current` goes from 0.0 to `total`.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    /// Report progress. Implementations should be fire-and-forget (never fail the caller).
    async fn report(&self, current: f64, total: f64, message: Option<String>);

    /// Start a new phase of `total` units; earlier progress is discarded.
    async fn begin(&self, total: usize, message: &str) {
        self.report(0.0, total as f64, Some(message.to_string())).await;
    }

    /// Convenience: report a step out of N total steps.
    async fn step(&self, step: usize, total_steps: usize, message: &str) {
        self.report(step as f64, total_steps as f64, Some(message.to_string()))
            .await;
    }
}

/// No-op reporter for tests and library callers.
pub struct NoopProgressReporter;

#[async_trait]
impl ProgressReporter for NoopProgressReporter {
    async fn report(&self, _current: f64, _total: f64, _message: Option<String>) {}
}

/// Shorthand for creating a no-op reporter.
pub fn noop_progress() -> Arc<dyn ProgressReporter> {
    Arc::new(NoopProgressReporter)
}

/// Terminal progress bar on stderr. Hidden when stderr is not a terminal.
pub struct BarProgressReporter {
    bar: ProgressBar,
}

impl BarProgressReporter {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━━╸");
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        Self { bar }
    }
}

#[async_trait]
impl ProgressReporter for BarProgressReporter {
    async fn begin(&self, total: usize, message: &str) {
        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_message(message.to_string());
    }

    async fn report(&self, current: f64, total: f64, message: Option<String>) {
        self.bar.set_length(total.max(0.0) as u64);
        self.bar.set_position(current.max(0.0) as u64);
        if let Some(message) = message {
            self.bar.set_message(message);
        }
        if current >= total {
            self.bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test reporter that counts calls.
    struct CountingReporter {
        count: AtomicUsize,
    }

    #[async_trait]
    impl ProgressReporter for CountingReporter {
        async fn report(&self, _current: f64, _total: f64, _message: Option<String>) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn test_noop_reporter_does_nothing() {
        let reporter = noop_progress();
        reporter.report(0.5, 1.0, Some("test".into())).await;
        reporter.step(1, 3, "step one").await;
    }

    #[tokio::test]
    async fn test_step_convenience() {
        let reporter = CountingReporter {
            count: AtomicUsize::new(0),
        };
        reporter.step(1, 5, "chunk 1").await;
        reporter.step(2, 5, "chunk 2").await;
        assert_eq!(reporter.count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_bar_reporter_tracks_position() {
        let reporter = BarProgressReporter::new("upsert");
        reporter.report(2.0, 4.0, Some("chunk 2".into())).await;
        assert_eq!(reporter.bar.position(), 2);
        assert_eq!(reporter.bar.length(), Some(4));
        reporter.report(4.0, 4.0, None).await;
        assert!(reporter.bar.is_finished());
    }

    #[tokio::test]
    async fn test_bar_reporter_restarts_each_phase() {
        let reporter = BarProgressReporter::new("embeddings");
        reporter.begin(3, "upserting embeddings").await;
        reporter.step(3, 3, "upserting embeddings").await;
        assert_eq!(reporter.bar.position(), 3);

        reporter.begin(10, "reading embeddings").await;
        assert_eq!(reporter.bar.position(), 0);
        assert_eq!(reporter.bar.length(), Some(10));
        assert_eq!(reporter.bar.message(), "reading embeddings");
    }
}
