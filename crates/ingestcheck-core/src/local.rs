//! Filesystem-backed collaborators for running against a local pipeline.
//!
//! - [`DirLogSource`]: one `<producer>.log` file per producer in a directory
//! - [`JsonInventory`]: a JSON snapshot of nodes and agent instances
//! - [`FileLogProducer`]: tokio tasks writing numbered lines into that directory

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::codec::LogEntry;
use crate::error::{VerifyError, VerifyResult};
use crate::producer::{LogProducer, ProducerRecord, ProducerSpec};
use crate::source::{AgentInstance, LogSource, NodeId, PlacementInventory};

/// Path of the log file holding `producer`'s lines inside `dir`.
pub fn log_path(dir: &Path, producer: &str) -> VerifyResult<PathBuf> {
    if producer.is_empty()
        || producer == "."
        || producer == ".."
        || producer.contains(['/', '\\'])
    {
        return Err(VerifyError::Config(format!(
            "producer name '{producer}' cannot be used as a file name"
        )));
    }
    Ok(dir.join(format!("{producer}.log")))
}

/// The line a generator writes for sequence number `seq`.
pub fn generated_line(producer: &str, seq: u64) -> String {
    format!("{seq} GET /api/v1/producers/{producer} 200")
}

// ---------------------------------------------------------------------------
// DirLogSource
// ---------------------------------------------------------------------------

/// Log source reading `<dir>/<producer>.log`.
#[derive(Debug, Clone)]
pub struct DirLogSource {
    dir: PathBuf,
    app_name: String,
}

impl DirLogSource {
    pub fn new(dir: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            app_name: app_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl LogSource for DirLogSource {
    async fn init(&self) -> VerifyResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn read_entries(&self, producer: &ProducerRecord) -> VerifyResult<Vec<LogEntry>> {
        let path = log_path(&self.dir, producer.name())?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(VerifyError::Transport {
                    producer: producer.name().to_string(),
                    reason: format!("{}: {e}", path.display()),
                })
            }
        };
        // Undecodable bytes only spoil their own line.
        Ok(String::from_utf8_lossy(&raw)
            .lines()
            .map(LogEntry::new)
            .collect())
    }

    fn agent_app_name(&self) -> &str {
        &self.app_name
    }
}

// ---------------------------------------------------------------------------
// JsonInventory
// ---------------------------------------------------------------------------

/// One agent instance in an inventory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    /// Application the instance belongs to.
    pub app: String,
    pub node: NodeId,
    #[serde(default)]
    pub restart_count: u32,
}

/// On-disk inventory snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Ready and schedulable nodes.
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
}

/// Inventory re-reading a JSON snapshot file on every query.
#[derive(Debug, Clone)]
pub struct JsonInventory {
    path: PathBuf,
}

impl JsonInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> VerifyResult<InventorySnapshot> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| VerifyError::Inventory(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| VerifyError::Inventory(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl PlacementInventory for JsonInventory {
    async fn eligible_nodes(&self) -> VerifyResult<BTreeSet<NodeId>> {
        Ok(self.load().await?.nodes.into_iter().collect())
    }

    async fn agent_instances(&self, app_name: &str) -> VerifyResult<Vec<AgentInstance>> {
        let snapshot = self.load().await?;
        Ok(snapshot
            .agents
            .into_iter()
            .filter(|a| a.app == app_name)
            .map(|a| AgentInstance {
                name: a.name,
                node: a.node,
                restart_count: a.restart_count,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FileLogProducer
// ---------------------------------------------------------------------------

/// Producer writing numbered lines into `<dir>/<name>.log`, spread evenly
/// over the run duration.
#[derive(Debug)]
pub struct FileLogProducer {
    dir: PathBuf,
    tasks: Mutex<Vec<(String, JoinHandle<VerifyResult<()>>)>>,
}

impl FileLogProducer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Wait for every started producer to finish writing.
    pub async fn wait_all(&self) -> VerifyResult<()> {
        let tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();

        for (name, joined) in names.into_iter().zip(futures::future::join_all(handles).await) {
            match joined {
                Ok(result) => result?,
                Err(e) => {
                    return Err(VerifyError::ProducerStart {
                        producer: name,
                        reason: format!("generator task failed: {e}"),
                    })
                }
            }
        }
        Ok(())
    }
}

async fn emit_lines(
    path: PathBuf,
    name: String,
    total: u64,
    run_duration: Duration,
) -> VerifyResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .await?;

    let spacing = if total > 1 {
        Duration::from_secs_f64(run_duration.as_secs_f64() / total as f64)
    } else {
        Duration::ZERO
    };

    for seq in 0..total {
        let mut line = generated_line(&name, seq);
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        if seq + 1 < total && !spacing.is_zero() {
            tokio::time::sleep(spacing).await;
        }
    }
    debug!(producer = %name, lines = total, "Producer finished");
    Ok(())
}

#[async_trait]
impl LogProducer for FileLogProducer {
    async fn start(&self, spec: &ProducerSpec) -> VerifyResult<()> {
        let path = log_path(&self.dir, &spec.name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| VerifyError::ProducerStart {
                producer: spec.name.clone(),
                reason: e.to_string(),
            })?;

        let handle = tokio::spawn(emit_lines(
            path,
            spec.name.clone(),
            spec.expected_lines,
            spec.run_duration,
        ));
        match self.tasks.lock() {
            Ok(mut guard) => guard.push((spec.name.clone(), handle)),
            Err(poisoned) => poisoned.into_inner().push((spec.name.clone(), handle)),
        }
        Ok(())
    }
}
