//! Error types for ingestion verification.

use thiserror::Error;

use crate::health::PlacementViolation;

/// Errors produced while verifying a log-collection pipeline.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// One or more producers never showed a decodable line within the timeout.
    #[error("some logs were ingested for {ingested} producers out of {total}")]
    NoSignOfIngestion { ingested: usize, total: usize },

    /// Observed lost fraction exceeds the tolerated fraction.
    #[error(
        "lost {:.2}% of lines, but only loss of {:.2}% can be tolerated",
        .observed * 100.0,
        .allowed * 100.0
    )]
    LossExceeded { observed: f64, allowed: f64 },

    /// The most restarted agent instance restarted too often.
    #[error("max agent restarts was {max_restarts} (instance {agent}), which is more than allowed {allowed}")]
    AgentInstability {
        agent: String,
        max_restarts: u32,
        allowed: u32,
    },

    /// At least one eligible node does not run exactly one agent instance.
    #[error(
        "{} node(s) violate single-agent placement: {}",
        .violations.len(),
        join_violations(.violations)
    )]
    PlacementViolated { violations: Vec<PlacementViolation> },

    /// A query to the log source failed.
    #[error("log source query for producer '{producer}' failed: {reason}")]
    Transport { producer: String, reason: String },

    /// A query to the placement inventory failed.
    #[error("placement inventory query failed: {0}")]
    Inventory(String),

    /// A producer could not be started.
    #[error("failed to start producer '{producer}': {reason}")]
    ProducerStart { producer: String, reason: String },

    /// Configuration was rejected before the run began.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A run tried to move back to an earlier phase.
    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_violations(violations: &[PlacementViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience result alias.
pub type VerifyResult<T> = std::result::Result<T, VerifyError>;
