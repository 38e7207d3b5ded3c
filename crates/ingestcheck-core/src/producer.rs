//! Producer descriptors and per-producer ingestion state.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::{LineCodec, LogEntry};
use crate::error::VerifyResult;
use crate::source::NodeId;

/// Container name used for generator workloads.
pub const LOGGING_CONTAINER_NAME: &str = "logging-container";

/// Image that emits numbered lines.
pub const LOGS_GENERATOR_IMAGE: &str = "gcr.io/google_containers/logs-generator:v0.1.0";

/// CPU request of a generator container, in millicores.
pub const LOGGING_CONTAINER_CPU_MILLIS: u32 = 10;

/// Memory request of a generator container, in bytes.
pub const LOGGING_CONTAINER_MEMORY_BYTES: u64 = 10 * 1024 * 1024;

/// Declared shape of one producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSpec {
    /// Producer name, also used as the container/workload name.
    pub name: String,

    /// Node the producer is pinned to; `None` lets the platform decide.
    #[serde(default)]
    pub placement: Option<NodeId>,

    /// Number of lines the producer will emit.
    pub expected_lines: u64,

    /// How long the producer spreads its lines over.
    #[serde(rename = "run_duration_secs", with = "crate::config::duration_secs")]
    pub run_duration: Duration,
}

impl ProducerSpec {
    pub fn new(
        name: impl Into<String>,
        placement: Option<NodeId>,
        expected_lines: u64,
        run_duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            placement,
            expected_lines,
            run_duration,
        }
    }

    /// Workload a platform needs to start this producer.
    pub fn workload(&self) -> WorkloadDescriptor {
        let mut env = BTreeMap::new();
        env.insert(
            "LOGS_GENERATOR_LINES_TOTAL".to_string(),
            self.expected_lines.to_string(),
        );
        env.insert(
            "LOGS_GENERATOR_DURATION".to_string(),
            generator_duration(self.run_duration),
        );

        WorkloadDescriptor {
            name: self.name.clone(),
            container_name: LOGGING_CONTAINER_NAME.to_string(),
            image: LOGS_GENERATOR_IMAGE.to_string(),
            env,
            cpu_request_millis: LOGGING_CONTAINER_CPU_MILLIS,
            memory_request_bytes: LOGGING_CONTAINER_MEMORY_BYTES,
            restart_policy: RestartPolicy::Never,
            node: self.placement.clone(),
        }
    }
}

/// Duration string understood by the generator image.
fn generator_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Restart policy of a generator workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    Never,
}

/// Platform-neutral description of a generator workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub name: String,
    pub container_name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub cpu_request_millis: u32,
    pub memory_request_bytes: u64,
    pub restart_policy: RestartPolicy,
    pub node: Option<NodeId>,
}

/// Capability that starts a producer workload.
///
/// Fire-and-forget: returning `Ok` means the request was accepted, not that
/// any line has been emitted.
#[async_trait]
pub trait LogProducer: Send + Sync {
    async fn start(&self, spec: &ProducerSpec) -> VerifyResult<()>;
}

/// Start every producer and return fresh records for them.
pub async fn start_producers(
    producer: &dyn LogProducer,
    specs: &[ProducerSpec],
) -> VerifyResult<Vec<ProducerRecord>> {
    let mut records = Vec::with_capacity(specs.len());
    for spec in specs {
        info!(producer = %spec.name, "Starting producer");
        producer.start(spec).await?;
        records.push(ProducerRecord::new(spec.clone()));
    }
    Ok(records)
}

/// Outcome of feeding one entry to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absorption {
    /// First time this sequence number was seen.
    Recorded(u64),
    /// Sequence number already present; nothing changed.
    Duplicate(u64),
    /// Decoded, but outside `0..expected_lines`.
    OutOfRange(u64),
    /// Not a numbered line.
    Noise,
}

/// Ingestion state of one producer.
///
/// `occurrences` only ever grows: the first entry seen for a sequence number
/// wins and later observations are no-ops.
#[derive(Debug, Clone)]
pub struct ProducerRecord {
    spec: ProducerSpec,
    occurrences: HashMap<u64, LogEntry>,
}

impl ProducerRecord {
    pub fn new(spec: ProducerSpec) -> Self {
        Self {
            spec,
            occurrences: HashMap::new(),
        }
    }

    pub fn spec(&self) -> &ProducerSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn placement(&self) -> Option<&NodeId> {
        self.spec.placement.as_ref()
    }

    pub fn expected_lines(&self) -> u64 {
        self.spec.expected_lines
    }

    pub fn run_duration(&self) -> Duration {
        self.spec.run_duration
    }

    /// Feed one entry.
    pub fn absorb(&mut self, entry: LogEntry, codec: &LineCodec) -> Absorption {
        let Some(seq) = entry.sequence_number(codec) else {
            return Absorption::Noise;
        };
        if seq >= self.spec.expected_lines {
            return Absorption::OutOfRange(seq);
        }
        if self.occurrences.contains_key(&seq) {
            return Absorption::Duplicate(seq);
        }
        self.occurrences.insert(seq, entry);
        Absorption::Recorded(seq)
    }

    /// Number of distinct sequence numbers recorded so far.
    pub fn observed_count(&self) -> u64 {
        self.occurrences.len() as u64
    }

    /// `expected_lines - observed_count`.
    pub fn missing(&self) -> u64 {
        self.spec
            .expected_lines
            .saturating_sub(self.observed_count())
    }

    pub fn has_seen(&self, seq: u64) -> bool {
        self.occurrences.contains_key(&seq)
    }

    /// Entry that satisfied `seq`, if any.
    pub fn entry(&self, seq: u64) -> Option<&LogEntry> {
        self.occurrences.get(&seq)
    }
}
