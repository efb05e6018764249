//! Structured lifecycle events for bring-up runs.
//!
//! Every event carries an `event` field with a dotted name so log
//! pipelines can filter on it:
//!
//! - `orchestration.started` / `orchestration.finished`
//! - `wave.started`
//! - `service.phase_changed`
//! - `integration.phase`
//! - `error.classified` / `recovery.executed`
//!
//! Events go out at `info!` (failures at `warn!`). Set `RUST_LOG` to
//! filter and pass `--json` to the CLI for newline-delimited JSON.

use tracing::{info, warn};

use crate::domain::state::ServicePhase;

/// Run-scoped span; every event emitted inside it carries `run_id`.
/// Attach it to futures with `tracing::Instrument`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("fleet.run", run_id = %run_id)
}

pub fn emit_orchestration_started(run_id: &str, services: usize, waves: usize) {
    info!(
        event = "orchestration.started",
        run_id = %run_id,
        services = services,
        waves = waves,
    );
}

pub fn emit_wave_started(run_id: &str, wave: usize, services: &[String]) {
    info!(
        event = "wave.started",
        run_id = %run_id,
        wave = wave,
        services = ?services,
    );
}

/// Emit event: a service moved between phases.
pub fn emit_phase_changed(run_id: &str, service: &str, from: ServicePhase, to: ServicePhase) {
    if to.is_unsatisfiable() {
        warn!(
            event = "service.phase_changed",
            run_id = %run_id,
            service = %service,
            from = %from,
            to = %to,
        );
    } else {
        info!(
            event = "service.phase_changed",
            run_id = %run_id,
            service = %service,
            from = %from,
            to = %to,
        );
    }
}

pub fn emit_orchestration_finished(run_id: &str, duration_ms: u64, failed: usize, success: bool) {
    info!(
        event = "orchestration.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        failed = failed,
        success = success,
    );
}

/// Emit event: an integration phase completed.
pub fn emit_integration_phase(phase: &str, success: bool, duration_ms: u64) {
    if success {
        info!(event = "integration.phase", phase = %phase, success, duration_ms);
    } else {
        warn!(event = "integration.phase", phase = %phase, success, duration_ms);
    }
}

pub fn emit_error_classified(error_id: &str, category: &str, severity: &str, occurrences: u32) {
    warn!(
        event = "error.classified",
        error_id = %error_id,
        category = %category,
        severity = %severity,
        occurrences = occurrences,
    );
}

pub fn emit_recovery_executed(error_id: &str, action: &str, success: bool, duration_ms: u64) {
    info!(
        event = "recovery.executed",
        error_id = %error_id,
        action = %action,
        success = success,
        duration_ms = duration_ms,
    );
}
