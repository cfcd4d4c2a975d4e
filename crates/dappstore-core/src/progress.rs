//! Progress reporting on a fixed 0 to 100 scale.
//!
//! Any [`ProgressSink`] (closures included) can observe a run. The
//! orchestrator never talks to a sink directly; it goes through a
//! [`ProgressReporter`], which serialises reports and clamps the numerator so
//! it never decreases, even when reports arrive from concurrent tasks.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Fixed progress denominator.
pub const PROGRESS_TOTAL: u32 = 100;

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    /// Stage label (`validation`, `upload`, `metadata`, `nft`, `submit`, `complete`).
    pub stage: String,
    /// Human-readable step description.
    pub step: String,
    pub progress: u32,
    pub total: u32,
}

impl WorkflowProgress {
    pub fn new(stage: &str, step: impl Into<String>, progress: u32) -> Self {
        Self {
            stage: stage.to_string(),
            step: step.into(),
            progress: progress.min(PROGRESS_TOTAL),
            total: PROGRESS_TOTAL,
        }
    }
}

/// Receives progress updates. Must tolerate calls from several tasks.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: WorkflowProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(WorkflowProgress) + Send + Sync,
{
    fn report(&self, progress: WorkflowProgress) {
        self(progress)
    }
}

/// Sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _progress: WorkflowProgress) {}
}

/// Monotonic front for a [`ProgressSink`].
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<u32>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: Mutex::new(0),
        }
    }

    /// Forward an update, raising its numerator to the highest value already
    /// reported if it would otherwise go backwards.
    pub fn report(&self, mut progress: WorkflowProgress) {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if progress.progress < *last {
            progress.progress = *last;
        }
        *last = progress.progress;
        tracing::debug!(
            stage = %progress.stage,
            step = %progress.step,
            progress = progress.progress,
            "progress"
        );
        // Held across the call so observers see reports in numerator order.
        self.sink.report(progress);
    }

    /// Shorthand for [`report`](Self::report).
    pub fn emit(&self, stage: &str, step: impl Into<String>, progress: u32) {
        self.report(WorkflowProgress::new(stage, step, progress));
    }

    /// Highest numerator reported so far.
    pub fn current(&self) -> u32 {
        match self.last.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Map `current / total` of a sub-task onto the `[start, end]` band.
pub fn scale_into_band(start: u32, end: u32, current: u32, total: u32) -> u32 {
    if total == 0 || end <= start {
        return start;
    }
    let current = current.min(total);
    start + (end - start) * current / total
}
