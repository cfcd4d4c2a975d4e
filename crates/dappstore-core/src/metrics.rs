//! Process-wide publishing counters.
//!
//! Incremented at the call site without locking; [`Metrics::flush`] emits
//! them as one `info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    uploads_completed: AtomicU64,
    bytes_uploaded: AtomicU64,
    upload_failures: AtomicU64,
    portal_submissions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            uploads_completed: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            upload_failures: AtomicU64::new(0),
            portal_submissions: AtomicU64::new(0),
        }
    }

    /// Record one successful upload of `bytes` bytes.
    pub fn record_upload(&self, bytes: u64) {
        self.uploads_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
        tracing::trace!(metric = "uploads_completed", bytes, "counter incremented");
    }

    pub fn inc_upload_failures(&self) {
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "upload_failures", "counter incremented");
    }

    /// Counts accepted portal submissions only.
    pub fn inc_portal_submissions(&self) {
        self.portal_submissions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "portal_submissions", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            uploads_completed = self.uploads_completed(),
            bytes_uploaded = self.bytes_uploaded(),
            upload_failures = self.upload_failures(),
            portal_submissions = self.portal_submissions(),
        );
    }

    pub fn uploads_completed(&self) -> u64 {
        self.uploads_completed.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }

    pub fn upload_failures(&self) -> u64 {
        self.upload_failures.load(Ordering::Relaxed)
    }

    pub fn portal_submissions(&self) -> u64 {
        self.portal_submissions.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.uploads_completed.store(0, Ordering::Relaxed);
        self.bytes_uploaded.store(0, Ordering::Relaxed);
        self.upload_failures.store(0, Ordering::Relaxed);
        self.portal_submissions.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_accumulate_count_and_bytes() {
        let m = Metrics::new();
        m.record_upload(512);
        m.record_upload(1024);
        m.inc_upload_failures();
        assert_eq!(m.uploads_completed(), 2);
        assert_eq!(m.bytes_uploaded(), 1536);
        assert_eq!(m.upload_failures(), 1);
        assert_eq!(m.portal_submissions(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.record_upload(10);
        m.inc_portal_submissions();
        m.reset();
        assert_eq!(m.uploads_completed(), 0);
        assert_eq!(m.bytes_uploaded(), 0);
        assert_eq!(m.portal_submissions(), 0);
    }
}
