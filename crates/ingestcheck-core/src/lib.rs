//! ingestcheck core library
//!
//! Verifies that lines emitted by a set of log producers arrive in a log
//! backend completely, within a timeout and a tolerated loss fraction, and
//! that the log-collection agent fleet is stable and correctly placed.

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod fakes;
pub mod health;
pub mod local;
pub mod loss;
pub mod obs;
pub mod poller;
pub mod producer;
pub mod report;
pub mod source;
pub mod telemetry;
pub mod verifier;

pub use clock::{Clock, TokioClock};
pub use codec::{LineCodec, LogEntry, DEFAULT_FRAMEWORK_PREFIX};
pub use config::VerificationConfig;
pub use error::{VerifyError, VerifyResult};
pub use health::{AgentHealthChecker, AgentObservation, PlacementViolation, RestartSummary};
pub use local::{DirLogSource, FileLogProducer, InventorySnapshot, JsonInventory};
pub use loss::{LossAggregator, LossVerdict};
pub use poller::{CompletenessOutcome, IngestionPoller, PollTermination, ProducerShortfall};
pub use producer::{
    start_producers, Absorption, LogProducer, ProducerRecord, ProducerSpec, RestartPolicy,
    WorkloadDescriptor,
};
pub use report::{RunPhase, VerificationReport, Violation};
pub use source::{AgentInstance, LogSource, NodeId, PlacementInventory};
pub use verifier::Verifier;

pub use obs::{
    emit_agent_observed, emit_loss_evaluated, emit_producer_unreachable, emit_round_completed,
    emit_run_finished, emit_run_started, emit_unexpected_line_number, run_span,
};
pub use telemetry::init_tracing;

/// ingestcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
