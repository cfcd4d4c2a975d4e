//! Structured lifecycle events for publishing runs.
//!
//! A [`PublishSpan`] tags everything logged during one run with its run id.
//! The `emit_*` functions log one `info!` event per lifecycle step
//! (`warn!` for failures), keyed by an `event` field.

use tracing::{info, warn};

use crate::workflow::WorkflowState;

/// RAII guard for a run-scoped span.
///
/// ```ignore
/// let _span = PublishSpan::enter("3f2c...", "me.monkemob.twa");
/// ```
pub struct PublishSpan {
    _span: tracing::span::EnteredSpan,
}

impl PublishSpan {
    pub fn enter(run_id: &str, package_id: &str) -> Self {
        let span = tracing::info_span!("dappstore.publish", run_id = %run_id, package = %package_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, app_name: &str, mint_simulated: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        app = %app_name,
        mint_simulated,
    );
}

/// Emit event: the workflow moved from one state to another.
pub fn emit_stage_entered(from: WorkflowState, to: WorkflowState) {
    info!(event = "stage.entered", from = from.name(), to = to.name());
}

pub fn emit_asset_uploaded(label: &str, uri: &str, bytes: u64) {
    info!(event = "asset.uploaded", asset = %label, uri = %uri, bytes);
}

pub fn emit_upload_failed(label: &str, error: &dyn std::fmt::Display) {
    warn!(event = "asset.upload_failed", asset = %label, error = %error);
}

pub fn emit_mint_completed(app_mint: &str, release_mint: &str, simulated: bool) {
    info!(
        event = "mint.completed",
        app_mint = %app_mint,
        release_mint = %release_mint,
        simulated,
    );
}

pub fn emit_portal_submitted(accepted: bool) {
    if accepted {
        info!(event = "portal.submitted", accepted);
    } else {
        warn!(event = "portal.submitted", accepted);
    }
}

/// Emit event: run finished, with wall time and outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms,
        success,
    );
}
