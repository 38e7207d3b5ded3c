//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedLogSource`, `StaticInventory`, `ManualClock` and
//! `RecordingProducer`, which satisfy the trait contracts without a real
//! platform, log backend or wall clock.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::clock::Clock;
use crate::codec::LogEntry;
use crate::error::{VerifyError, VerifyResult};
use crate::producer::{LogProducer, ProducerRecord, ProducerSpec};
use crate::source::{AgentInstance, LogSource, NodeId, PlacementInventory};

/// Response of one `read_entries` call: the visible lines, or a failure reason.
pub type ScriptedRound = Result<Vec<String>, String>;

// ---------------------------------------------------------------------------
// ScriptedLogSource
// ---------------------------------------------------------------------------

/// Log source replaying a per-producer script of responses.
///
/// The n-th call for a producer returns the n-th round; once the script is
/// exhausted the last round repeats. Producers without a script have no
/// entries.
#[derive(Debug)]
pub struct ScriptedLogSource {
    app_name: String,
    scripts: Mutex<HashMap<String, Vec<ScriptedRound>>>,
    calls: Mutex<HashMap<String, usize>>,
    initialized: AtomicBool,
    cleaned_up: AtomicBool,
}

impl ScriptedLogSource {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            cleaned_up: AtomicBool::new(false),
        }
    }

    /// Script a producer whose visible lines never change.
    pub fn with_lines(self, producer: &str, lines: Vec<String>) -> Self {
        self.with_rounds(producer, vec![Ok(lines)])
    }

    /// Script a producer round by round.
    pub fn with_rounds(self, producer: &str, rounds: Vec<ScriptedRound>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(producer.to_string(), rounds);
        self
    }

    /// Append a round to a producer's script while a run is in flight.
    pub fn push_round(&self, producer: &str, round: ScriptedRound) {
        self.scripts
            .lock()
            .unwrap()
            .entry(producer.to_string())
            .or_default()
            .push(round);
    }

    /// Number of `read_entries` calls made for `producer`.
    pub fn calls(&self, producer: &str) -> usize {
        *self.calls.lock().unwrap().get(producer).unwrap_or(&0)
    }

    pub fn was_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn was_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSource for ScriptedLogSource {
    async fn init(&self) -> VerifyResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self) {
        self.cleaned_up.store(true, Ordering::SeqCst);
    }

    async fn read_entries(&self, producer: &ProducerRecord) -> VerifyResult<Vec<LogEntry>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(producer.name().to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let scripts = self.scripts.lock().unwrap();
        let Some(rounds) = scripts.get(producer.name()).filter(|r| !r.is_empty()) else {
            return Ok(Vec::new());
        };
        match &rounds[(call - 1).min(rounds.len() - 1)] {
            Ok(lines) => Ok(lines.iter().cloned().map(LogEntry::new).collect()),
            Err(reason) => Err(VerifyError::Transport {
                producer: producer.name().to_string(),
                reason: reason.clone(),
            }),
        }
    }

    fn agent_app_name(&self) -> &str {
        &self.app_name
    }
}

// ---------------------------------------------------------------------------
// StaticInventory
// ---------------------------------------------------------------------------

/// Fixed inventory of eligible nodes and agent instances per application.
#[derive(Debug, Default)]
pub struct StaticInventory {
    nodes: BTreeSet<NodeId>,
    agents: HashMap<String, Vec<AgentInstance>>,
    failure: Option<String>,
}

impl StaticInventory {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(NodeId::new).collect(),
            ..Self::default()
        }
    }

    pub fn with_agents(mut self, app_name: &str, instances: Vec<AgentInstance>) -> Self {
        self.agents
            .entry(app_name.to_string())
            .or_default()
            .extend(instances);
        self
    }

    /// Make every query fail with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    fn check_available(&self) -> VerifyResult<()> {
        match &self.failure {
            Some(reason) => Err(VerifyError::Inventory(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlacementInventory for StaticInventory {
    async fn eligible_nodes(&self) -> VerifyResult<BTreeSet<NodeId>> {
        self.check_available()?;
        Ok(self.nodes.clone())
    }

    async fn agent_instances(&self, app_name: &str) -> VerifyResult<Vec<AgentInstance>> {
        self.check_available()?;
        Ok(self.agents.get(app_name).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Virtual clock: `sleep` advances time and yields once to the runtime
/// instead of waiting.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
    sleeps: AtomicUsize,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: AtomicUsize::new(0),
        }
    }

    /// Move virtual time forward without counting a sleep.
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    /// Number of `sleep` calls so far.
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// RecordingProducer
// ---------------------------------------------------------------------------

/// Producer that only records which specs it was asked to start.
#[derive(Debug, Default)]
pub struct RecordingProducer {
    started: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to start the producer named `name`.
    pub fn failing_on(mut self, name: impl Into<String>) -> Self {
        self.fail_on = Some(name.into());
        self
    }

    /// Names of producers started so far, in order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogProducer for RecordingProducer {
    async fn start(&self, spec: &ProducerSpec) -> VerifyResult<()> {
        if self.fail_on.as_deref() == Some(spec.name.as_str()) {
            return Err(VerifyError::ProducerStart {
                producer: spec.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.started.lock().unwrap().push(spec.name.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn record(name: &str) -> ProducerRecord {
        ProducerRecord::new(ProducerSpec::new(name, None, 10, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_scripted_source_repeats_last_round() {
        let source = ScriptedLogSource::new("fluentd").with_rounds(
            "p0",
            vec![Ok(vec!["0 a".into()]), Ok(vec!["0 a".into(), "1 b".into()])],
        );
        let rec = record("p0");
        assert_eq!(source.read_entries(&rec).await.unwrap().len(), 1);
        assert_eq!(source.read_entries(&rec).await.unwrap().len(), 2);
        assert_eq!(source.read_entries(&rec).await.unwrap().len(), 2);
        assert_eq!(source.calls("p0"), 3);
    }

    #[tokio::test]
    async fn test_scripted_source_push_round_extends_script() {
        let source = ScriptedLogSource::new("fluentd");
        let rec = record("p0");
        assert!(source.read_entries(&rec).await.unwrap().is_empty());
        source.push_round("p0", Err("flaky".into()));
        source.push_round("p0", Ok(vec!["0 a".into()]));
        // the n-th call reads round n-1, so call 2 reads the second push
        assert_eq!(source.read_entries(&rec).await.unwrap().len(), 1);
        assert_eq!(source.calls("p0"), 2);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(30)).await;
        assert_eq!(clock.now() - start, Duration::from_secs(30));
        assert_eq!(clock.sleeps(), 1);
    }

    #[tokio::test]
    async fn test_manual_clock_sleep_lets_spawned_tasks_run() {
        let clock = ManualClock::new();
        let flag = Arc::new(AtomicUsize::new(0));
        let task_flag = Arc::clone(&flag);
        let handle = tokio::spawn(async move {
            task_flag.store(1, Ordering::SeqCst);
        });

        clock.sleep(Duration::from_millis(1)).await;
        assert_eq!(flag.load(Ordering::SeqCst), 1);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_static_inventory_failing() {
        let inventory = StaticInventory::new(["n1"]).failing("down");
        assert!(inventory.eligible_nodes().await.is_err());
        assert!(inventory.agent_instances("fluentd").await.is_err());
    }
}
