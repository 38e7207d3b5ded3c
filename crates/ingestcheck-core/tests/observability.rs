//! Structured events emitted during verification runs.
//!
//! `traced_test` captures every event, so these assert on the event names
//! that log pipelines filter on.

use std::sync::Arc;
use std::time::Duration;

use ingestcheck_core::fakes::{ManualClock, ScriptedLogSource, StaticInventory};
use ingestcheck_core::{
    emit_agent_observed, emit_loss_evaluated, emit_producer_unreachable, emit_round_completed,
    emit_run_finished, emit_run_started, emit_unexpected_line_number, run_span, AgentInstance,
    LossAggregator, NodeId, ProducerSpec, VerificationConfig, Verifier,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_lifecycle_events_carry_their_names() {
    emit_run_started("run-123", 2, 200);
    emit_loss_evaluated(0.01, 0.05, true);
    emit_run_finished("run-123", true, true, 0);

    assert!(logs_contain("verify.run_started"));
    assert!(logs_contain("verify.loss_evaluated"));
    assert!(logs_contain("verify.run_finished"));
    assert!(logs_contain("run-123"));
}

#[traced_test]
#[test]
fn test_loss_evaluation_alone_is_silent() {
    let verdict = LossAggregator::evaluate([3, 2], 100, 0.01);
    assert!(!verdict.passed);
    assert!(!logs_contain("verify.loss_evaluated"));
}

#[traced_test]
#[test]
fn test_producer_unreachable_is_a_warning() {
    emit_producer_unreachable("p7", &"connection refused");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("connection refused"));
}

#[traced_test]
#[test]
fn test_events_inside_run_span_carry_run_id() {
    let _entered = run_span("span-run-42").entered();
    emit_round_completed("liveness", 1, 3);
    emit_unexpected_line_number("p0", 120, 100);
    emit_agent_observed("fluentd-a", "n1", 2);

    assert!(logs_contain("span-run-42"));
    assert!(logs_contain("verify.unexpected_line_number"));
    assert!(logs_contain("verify.agent_observed"));
}

#[tokio::test]
#[traced_test]
async fn test_run_emits_start_and_finish() {
    let source = ScriptedLogSource::new("fluentd").with_lines(
        "p0",
        vec!["0 GET /x 200".to_string(), "1 GET /x 200".to_string()],
    );
    let inventory = StaticInventory::new(["n1"]).with_agents(
        "fluentd",
        vec![AgentInstance {
            name: "fluentd-a".to_string(),
            node: NodeId::new("n1"),
            restart_count: 0,
        }],
    );
    let config = VerificationConfig::new(
        vec![ProducerSpec::new("p0", None, 2, Duration::from_secs(10))],
        Duration::from_secs(60),
        0.0,
        0,
    );

    let report = Verifier::new(Arc::new(source), Arc::new(inventory))
        .with_clock(Arc::new(ManualClock::new()))
        .run(&config)
        .await
        .unwrap();

    assert!(report.exit_ok());
    assert!(logs_contain("verify.run_started"));
    assert!(logs_contain("verify.agent_observed"));
    assert!(logs_contain("verify.loss_evaluated"));
    assert!(logs_contain("verify.run_finished"));
    assert!(logs_contain(&report.run_id));
}
