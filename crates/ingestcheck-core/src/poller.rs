//! Time-bounded polling of the log source.
//!
//! Two waits are offered:
//! - [`IngestionPoller::wait_for_any_sign`]: every producer shows at least one
//!   decodable line
//! - [`IngestionPoller::wait_for_completeness`]: every expected line arrived,
//!   or the timeout elapsed
//!
//! Rounds run strictly one after another with a fixed delay in between. A
//! producer that has satisfied the wait is never queried again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::codec::LineCodec;
use crate::config::VerificationConfig;
use crate::error::{VerifyError, VerifyResult};
use crate::obs::{emit_producer_unreachable, emit_round_completed, emit_unexpected_line_number};
use crate::producer::{Absorption, ProducerRecord};
use crate::source::LogSource;

/// How a completeness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollTermination {
    /// Every expected line was observed.
    Converged,
    /// The timeout elapsed with lines still missing.
    TimedOut,
}

/// Missing-line count of one producer at the end of a wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerShortfall {
    pub producer: String,
    pub expected_lines: u64,
    pub missing: u64,
}

/// Result of [`IngestionPoller::wait_for_completeness`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessOutcome {
    /// Missing lines summed across producers (0 when converged).
    pub total_missing: u64,
    /// Expected lines summed across producers.
    pub total_expected: u64,
    /// Final per-producer missing counts, in configuration order.
    pub shortfalls: Vec<ProducerShortfall>,
    /// Number of polling rounds executed.
    pub rounds: u64,
    pub termination: PollTermination,
    pub elapsed_ms: u64,
}

impl CompletenessOutcome {
    pub fn converged(&self) -> bool {
        self.termination == PollTermination::Converged
    }

    /// Producers that still miss lines.
    pub fn incomplete(&self) -> impl Iterator<Item = &ProducerShortfall> {
        self.shortfalls.iter().filter(|s| s.missing > 0)
    }
}

/// Retry loop converging on what the log source can prove was ingested.
pub struct IngestionPoller {
    source: Arc<dyn LogSource>,
    clock: Arc<dyn Clock>,
    codec: LineCodec,
    timeout: Duration,
    poll_interval: Duration,
}

impl IngestionPoller {
    pub fn new(
        source: Arc<dyn LogSource>,
        clock: Arc<dyn Clock>,
        codec: LineCodec,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            codec,
            timeout,
            poll_interval,
        }
    }

    /// Build a poller using the timeout and interval of `config`.
    pub fn from_config(
        source: Arc<dyn LogSource>,
        clock: Arc<dyn Clock>,
        codec: LineCodec,
        config: &VerificationConfig,
    ) -> Self {
        Self::new(
            source,
            clock,
            codec,
            config.ingestion_timeout,
            config.poll_interval,
        )
    }

    fn elapsed_since(&self, start: Instant) -> Duration {
        self.clock.now().saturating_duration_since(start)
    }

    /// Wait until every producer yielded at least one decodable entry.
    ///
    /// Query failures count as "no sign yet" for that round. Fails with
    /// [`VerifyError::NoSignOfIngestion`] when the timeout elapses first.
    pub async fn wait_for_any_sign(&self, records: &[ProducerRecord]) -> VerifyResult<()> {
        let total = records.len();
        let mut has_sign = vec![false; total];
        let mut with_sign = 0usize;
        let mut round = 0u64;

        let start = self.clock.now();
        while self.elapsed_since(start) < self.timeout {
            round += 1;
            for (idx, record) in records.iter().enumerate() {
                if has_sign[idx] {
                    continue;
                }

                let entries = match self.source.read_entries(record).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        emit_producer_unreachable(record.name(), &e);
                        continue;
                    }
                };
                if entries.is_empty() {
                    info!(producer = %record.name(), "No log entries from producer");
                    continue;
                }

                if entries
                    .iter()
                    .any(|entry| entry.sequence_number(&self.codec).is_some())
                {
                    info!(producer = %record.name(), "Found some log entries from producer");
                    has_sign[idx] = true;
                    with_sign += 1;
                }
            }

            emit_round_completed("liveness", round, (total - with_sign) as u64);
            if with_sign == total {
                break;
            }
            self.clock.sleep(self.poll_interval).await;
        }

        if with_sign < total {
            return Err(VerifyError::NoSignOfIngestion {
                ingested: with_sign,
                total,
            });
        }
        Ok(())
    }

    /// Wait until every expected line was observed or the timeout elapsed.
    ///
    /// Reaching the timeout is a normal outcome reported through
    /// [`PollTermination::TimedOut`]. A failed query counts the producer as
    /// fully missing for that round only.
    pub async fn wait_for_completeness(
        &self,
        records: &mut [ProducerRecord],
    ) -> CompletenessOutcome {
        let mut missing_by_producer: Vec<u64> =
            records.iter().map(ProducerRecord::expected_lines).collect();
        let total_expected: u64 = missing_by_producer.iter().sum();
        let mut total_missing = total_expected;
        let mut round = 0u64;

        let start = self.clock.now();
        while self.elapsed_since(start) < self.timeout {
            round += 1;
            let mut missing = 0u64;
            for (idx, record) in records.iter_mut().enumerate() {
                if missing_by_producer[idx] == 0 {
                    continue;
                }
                missing_by_producer[idx] = self.pull_missing_count(record).await;
                missing += missing_by_producer[idx];
            }

            total_missing = missing;
            emit_round_completed("completeness", round, total_missing);
            if total_missing == 0 {
                break;
            }
            info!(total_missing = total_missing, "Still missing lines in total");
            self.clock.sleep(self.poll_interval).await;
        }

        let elapsed = self.elapsed_since(start);
        let shortfalls: Vec<ProducerShortfall> = records
            .iter()
            .zip(&missing_by_producer)
            .map(|(record, missing)| ProducerShortfall {
                producer: record.name().to_string(),
                expected_lines: record.expected_lines(),
                missing: *missing,
            })
            .collect();

        let termination = if total_missing == 0 {
            PollTermination::Converged
        } else {
            PollTermination::TimedOut
        };

        if termination == PollTermination::TimedOut {
            let percent = if total_expected == 0 {
                0.0
            } else {
                total_missing as f64 / total_expected as f64 * 100.0
            };
            info!(
                timeout_secs = self.timeout.as_secs_f64(),
                total_missing = total_missing,
                "After timeout still missing {:.2}% of total number of lines",
                percent
            );
            for shortfall in shortfalls.iter().filter(|s| s.missing > 0) {
                info!(
                    producer = %shortfall.producer,
                    missing = shortfall.missing,
                    "Still missing lines for producer"
                );
            }
        }

        CompletenessOutcome {
            total_missing,
            total_expected,
            shortfalls,
            rounds: round,
            termination,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Query one producer and return its missing count, worst case on failure.
    async fn pull_missing_count(&self, record: &mut ProducerRecord) -> u64 {
        let entries = match self.source.read_entries(record).await {
            Ok(entries) => entries,
            Err(e) => {
                emit_producer_unreachable(record.name(), &e);
                return record.expected_lines();
            }
        };

        for entry in entries {
            if let Absorption::OutOfRange(seq) = record.absorb(entry, &self.codec) {
                emit_unexpected_line_number(record.name(), seq, record.expected_lines());
            }
        }
        record.missing()
    }
}
