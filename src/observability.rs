//! Tracing setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    polls: AtomicU64,
    soft_errors: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    transfers_completed: AtomicU64,
    transfers_failed: AtomicU64,
    transfers_cancelled: AtomicU64,
    bytes_downloaded: AtomicU64,
    logins: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn soft_error(&self) {
        self.soft_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "soft_errors", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn transfer_completed(&self) {
        self.transfers_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_failed(&self) {
        self.transfers_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_cancelled(&self) {
        self.transfers_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_downloaded(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn login_attempted(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            soft_errors: self.soft_errors.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            transfers_completed: self.transfers_completed.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            transfers_cancelled: self.transfers_cancelled.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            logins: self.logins.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub soft_errors: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub transfers_completed: u64,
    pub transfers_failed: u64,
    pub transfers_cancelled: u64,
    pub bytes_downloaded: u64,
    pub logins: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = Metrics::new();
        metrics.poll();
        metrics.poll();
        metrics.soft_error();
        metrics.bytes_downloaded(8192);
        metrics.bytes_downloaded(100);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.polls, 2);
        assert_eq!(snapshot.soft_errors, 1);
        assert_eq!(snapshot.bytes_downloaded, 8292);
        assert_eq!(snapshot.jobs_failed, 0);
    }
}
