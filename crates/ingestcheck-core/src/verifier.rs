//! Verification run orchestration.
//!
//! A run walks `NotStarted → Polling → {Converged | TimedOut} → Aggregated →
//! {Passed | Failed}`. Every violated invariant is collected into the report
//! rather than stopping at the first one.

use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::clock::{Clock, TokioClock};
use crate::codec::LineCodec;
use crate::config::VerificationConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::health::AgentHealthChecker;
use crate::loss::LossAggregator;
use crate::obs::{emit_loss_evaluated, emit_run_finished, emit_run_started, run_span};
use crate::poller::IngestionPoller;
use crate::producer::{start_producers, LogProducer, ProducerRecord};
use crate::report::{RunPhase, VerificationReport, Violation};
use crate::source::{LogSource, PlacementInventory};

/// Drives one or more verification runs against the same collaborators.
pub struct Verifier {
    source: Arc<dyn LogSource>,
    inventory: Arc<dyn PlacementInventory>,
    clock: Arc<dyn Clock>,
    codec: LineCodec,
}

impl Verifier {
    pub fn new(source: Arc<dyn LogSource>, inventory: Arc<dyn PlacementInventory>) -> Self {
        Self {
            source,
            inventory,
            clock: Arc::new(TokioClock),
            codec: LineCodec::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Initialise the source, start every producer, verify, then clean up.
    ///
    /// Cleanup runs whether or not verification succeeded.
    pub async fn start_and_run(
        &self,
        producer: &dyn LogProducer,
        config: &VerificationConfig,
    ) -> VerifyResult<VerificationReport> {
        config.validate()?;
        self.source.init().await?;

        let result = match start_producers(producer, &config.producers).await {
            Ok(mut records) => self.run_with_records(config, &mut records).await,
            Err(e) => Err(e),
        };

        self.source.cleanup().await;
        result
    }

    /// Verify producers that were started elsewhere.
    pub async fn run(&self, config: &VerificationConfig) -> VerifyResult<VerificationReport> {
        let mut records: Vec<ProducerRecord> = config
            .producers
            .iter()
            .cloned()
            .map(ProducerRecord::new)
            .collect();
        self.run_with_records(config, &mut records).await
    }

    /// Verify using caller-owned records, which hold the observed lines
    /// afterwards.
    ///
    /// Returns `Err` only for an invalid configuration; every other failure is
    /// a violation in the report.
    pub async fn run_with_records(
        &self,
        config: &VerificationConfig,
        records: &mut [ProducerRecord],
    ) -> VerifyResult<VerificationReport> {
        config.validate()?;
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id);
        self.execute(run_id, config, records).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: String,
        config: &VerificationConfig,
        records: &mut [ProducerRecord],
    ) -> VerifyResult<VerificationReport> {
        let started_at = Utc::now();
        emit_run_started(&run_id, records.len(), config.total_expected_lines());

        let poller = IngestionPoller::from_config(
            Arc::clone(&self.source),
            Arc::clone(&self.clock),
            self.codec.clone(),
            config,
        );
        let mut violations = Vec::new();

        let mut phase = RunPhase::NotStarted.advance(RunPhase::Polling)?;
        if config.require_liveness {
            match poller.wait_for_any_sign(records).await {
                Ok(()) => {}
                Err(VerifyError::NoSignOfIngestion { ingested, total }) => {
                    violations.push(Violation::NoSignOfIngestion { ingested, total });
                }
                Err(other) => return Err(other),
            }
        }

        let outcome = poller.wait_for_completeness(records).await;
        phase = phase.advance(outcome.termination.into())?;

        let loss = LossAggregator::evaluate_outcome(&outcome, config.max_allowed_lost_fraction);
        emit_loss_evaluated(loss.lost_fraction, loss.allowed_fraction, loss.passed);
        phase = phase.advance(RunPhase::Aggregated)?;
        if !loss.passed {
            violations.push(Violation::LossExceeded {
                observed: loss.lost_fraction,
                allowed: loss.allowed_fraction,
            });
        }

        let checker =
            AgentHealthChecker::new(Arc::clone(&self.inventory), self.source.agent_app_name());

        let (max_agent_restarts, agents) = match checker.observe_restarts().await {
            Ok(summary) => {
                if let Err(VerifyError::AgentInstability {
                    agent,
                    max_restarts,
                    allowed,
                }) = summary.verdict(config.max_allowed_agent_restarts)
                {
                    violations.push(Violation::AgentInstability {
                        agent,
                        max_restarts,
                        allowed,
                    });
                }
                (Some(summary.max_restarts), summary.observations)
            }
            Err(e) => {
                violations.push(Violation::AgentFleetUnavailable {
                    reason: e.to_string(),
                });
                (None, Vec::new())
            }
        };

        let placement_violations = match checker.placement_violations().await {
            Ok(found) => {
                violations.extend(found.iter().cloned().map(|violation| Violation::Placement {
                    violation,
                }));
                found
            }
            Err(e) => {
                violations.push(Violation::PlacementUnavailable {
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        let passed = violations.iter().all(Violation::is_placement);
        let placement_passed = !violations.iter().any(Violation::is_placement);
        phase = phase.advance(if passed {
            RunPhase::Passed
        } else {
            RunPhase::Failed
        })?;

        emit_run_finished(&run_id, passed, placement_passed, violations.len());

        Ok(VerificationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            phase,
            passed,
            placement_passed,
            termination: Some(outcome.termination),
            rounds: outcome.rounds,
            total_expected: loss.total_expected,
            total_missing: loss.total_missing,
            lost_fraction: loss.lost_fraction,
            allowed_lost_fraction: loss.allowed_fraction,
            shortfalls: outcome.shortfalls,
            max_agent_restarts,
            allowed_agent_restarts: config.max_allowed_agent_restarts,
            agents,
            placement_violations,
            violations,
        })
    }
}
