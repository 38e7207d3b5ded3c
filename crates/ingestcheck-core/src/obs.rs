//! Structured observability hooks for verification runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via [`run_span`]
//! - Emission functions for the run lifecycle: start, polling rounds,
//!   unreachable producers, loss evaluation, agent observation, finish
//!
//! Events are emitted at `info!` level unless noted. For JSON output, pass
//! `json = true` to [`crate::telemetry::init_tracing`].

use tracing::{debug, info, warn};

/// Span tagging every event of one run with its run_id.
///
/// # Example
///
/// ```ignore
/// use tracing::Instrument;
/// verifier.run(&config).instrument(run_span("0b6f...")).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("ingestcheck.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, producers: usize, total_expected: u64) {
    info!(
        event = "verify.run_started",
        run_id = %run_id,
        producers = producers,
        total_expected = total_expected,
    );
}

/// Emit event: one polling round finished.
pub fn emit_round_completed(wait: &str, round: u64, outstanding: u64) {
    debug!(
        event = "verify.round_completed",
        wait = %wait,
        round = round,
        outstanding = outstanding,
    );
}

/// Emit event: a log source query failed (warning level).
pub fn emit_producer_unreachable(producer: &str, error: &dyn std::fmt::Display) {
    warn!(event = "verify.producer_unreachable", producer = %producer, error = %error);
}

/// Emit event: a decoded line number fell outside the expected range.
pub fn emit_unexpected_line_number(producer: &str, seq: u64, expected_lines: u64) {
    info!(
        event = "verify.unexpected_line_number",
        producer = %producer,
        seq = seq,
        expected_lines = expected_lines,
    );
}

/// Emit event: loss fraction compared against the tolerance.
pub fn emit_loss_evaluated(lost_fraction: f64, allowed: f64, passed: bool) {
    info!(
        event = "verify.loss_evaluated",
        lost_fraction = lost_fraction,
        allowed = allowed,
        passed = passed,
    );
}

/// Emit event: restart counter of one agent instance.
pub fn emit_agent_observed(agent: &str, node: &str, restart_count: u32) {
    info!(
        event = "verify.agent_observed",
        agent = %agent,
        node = %node,
        restart_count = restart_count,
    );
}

/// Emit event: run finished with its verdict.
pub fn emit_run_finished(run_id: &str, passed: bool, placement_passed: bool, violations: usize) {
    info!(
        event = "verify.run_finished",
        run_id = %run_id,
        passed = passed,
        placement_passed = placement_passed,
        violations = violations,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _entered = run_span("test-run-id").entered();
        emit_round_completed("completeness", 1, 10);
    }
}
