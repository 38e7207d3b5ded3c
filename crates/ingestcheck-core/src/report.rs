//! Terminal verdict of a verification run.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};
use crate::health::{AgentObservation, PlacementViolation};
use crate::poller::{PollTermination, ProducerShortfall};

/// Run-level lifecycle. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Polling,
    Converged,
    TimedOut,
    Aggregated,
    Passed,
    Failed,
}

impl RunPhase {
    fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Polling => 1,
            Self::Converged | Self::TimedOut => 2,
            Self::Aggregated => 3,
            Self::Passed | Self::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    /// Move to `next`, which must be the immediately following stage.
    pub fn advance(self, next: RunPhase) -> VerifyResult<RunPhase> {
        if next.rank() == self.rank() + 1 {
            Ok(next)
        } else {
            Err(VerifyError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl From<PollTermination> for RunPhase {
    fn from(termination: PollTermination) -> Self {
        match termination {
            PollTermination::Converged => Self::Converged,
            PollTermination::TimedOut => Self::TimedOut,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Polling => "polling",
            Self::Converged => "converged",
            Self::TimedOut => "timed_out",
            Self::Aggregated => "aggregated",
            Self::Passed => "passed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One violated invariant found during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    NoSignOfIngestion { ingested: usize, total: usize },
    LossExceeded { observed: f64, allowed: f64 },
    AgentInstability {
        agent: String,
        max_restarts: u32,
        allowed: u32,
    },
    AgentFleetUnavailable { reason: String },
    Placement { violation: PlacementViolation },
    PlacementUnavailable { reason: String },
}

impl Violation {
    /// Whether this belongs to the independent placement check.
    pub fn is_placement(&self) -> bool {
        matches!(
            self,
            Self::Placement { .. } | Self::PlacementUnavailable { .. }
        )
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSignOfIngestion { ingested, total } => write!(
                f,
                "{}",
                VerifyError::NoSignOfIngestion {
                    ingested: *ingested,
                    total: *total
                }
            ),
            Self::LossExceeded { observed, allowed } => write!(
                f,
                "{}",
                VerifyError::LossExceeded {
                    observed: *observed,
                    allowed: *allowed
                }
            ),
            Self::AgentInstability {
                agent,
                max_restarts,
                allowed,
            } => write!(
                f,
                "max agent restarts was {max_restarts} (instance {agent}), which is more than allowed {allowed}"
            ),
            Self::AgentFleetUnavailable { reason } => {
                write!(f, "failed to get agent instances: {reason}")
            }
            Self::Placement { violation } => write!(f, "{violation}"),
            Self::PlacementUnavailable { reason } => {
                write!(f, "failed to check agent placement: {reason}")
            }
        }
    }
}

/// Outcome of a verification run, immutable once returned by the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Final run phase (`passed` or `failed`).
    pub phase: RunPhase,

    /// Liveness, loss and restart decision.
    pub passed: bool,
    /// Independent placement decision.
    pub placement_passed: bool,

    pub termination: Option<PollTermination>,
    pub rounds: u64,
    pub total_expected: u64,
    pub total_missing: u64,
    pub lost_fraction: f64,
    pub allowed_lost_fraction: f64,
    pub shortfalls: Vec<ProducerShortfall>,

    /// `None` when agent instances could not be fetched.
    pub max_agent_restarts: Option<u32>,
    pub allowed_agent_restarts: u32,
    pub agents: Vec<AgentObservation>,
    pub placement_violations: Vec<PlacementViolation>,

    /// Every violated invariant, in discovery order.
    pub violations: Vec<Violation>,
}

impl VerificationReport {
    /// True only when both the ingestion decision and placement passed.
    pub fn exit_ok(&self) -> bool {
        self.passed && self.placement_passed
    }

    /// Summary message.
    pub fn message(&self) -> String {
        if self.violations.is_empty() {
            "All checks passed".to_string()
        } else {
            format!("Verification failed with {} violation(s)", self.violations.len())
        }
    }

    /// Producers that still miss lines.
    pub fn incomplete_producers(&self) -> impl Iterator<Item = &ProducerShortfall> {
        self.shortfalls.iter().filter(|s| s.missing > 0)
    }

    /// Human-readable rendering for terminals.
    pub fn render_text(&self) -> String {
        let mark = |ok: bool| if ok { "✓ PASSED" } else { "✗ FAILED" };
        let mut out = String::new();

        let _ = writeln!(out, "Run ID: {}", self.run_id);
        let _ = writeln!(out, "Ingestion: {}", mark(self.passed));
        let _ = writeln!(out, "Placement: {}", mark(self.placement_passed));
        let termination = match self.termination {
            Some(PollTermination::Converged) => "converged",
            Some(PollTermination::TimedOut) => "timed out",
            None => "not polled",
        };
        let _ = writeln!(out, "Polling: {} round(s), {}", self.rounds, termination);
        let _ = writeln!(
            out,
            "Lines: missing {} of {} ({:.2}%, allowed {:.2}%)",
            self.total_missing,
            self.total_expected,
            self.lost_fraction * 100.0,
            self.allowed_lost_fraction * 100.0
        );
        for shortfall in self.incomplete_producers() {
            let _ = writeln!(
                out,
                "  ✗ {}: missing {} of {}",
                shortfall.producer, shortfall.missing, shortfall.expected_lines
            );
        }

        match self.max_agent_restarts {
            Some(max) => {
                let _ = writeln!(
                    out,
                    "Agents: {} instance(s), max restarts {} (allowed {})",
                    self.agents.len(),
                    max,
                    self.allowed_agent_restarts
                );
            }
            None => {
                let _ = writeln!(out, "Agents: unavailable");
            }
        }

        if !self.violations.is_empty() {
            let _ = writeln!(out, "Violations:");
            for violation in &self.violations {
                let _ = writeln!(out, "  - {violation}");
            }
        }
        let _ = write!(out, "{}", self.message());
        out
    }
}
