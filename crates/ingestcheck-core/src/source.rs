//! Collaborator capabilities consumed by the verifier.
//!
//! These traits define the external seams:
//! - `LogSource`: reads whatever the backend currently holds for a producer
//! - `PlacementInventory`: enumerates eligible nodes and agent instances
//!
//! Both are read-only from the verifier's point of view and must tolerate
//! repeated calls. In-memory fakes live in the `fakes` module, filesystem
//! backed implementations in `local`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::LogEntry;
use crate::error::VerifyResult;
use crate::producer::ProducerRecord;

/// Identity of a placement target (a node of the platform).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        NodeId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One running instance of the collection agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInstance {
    /// Instance name (e.g. the pod name).
    pub name: String,
    /// Node the instance is scheduled on.
    pub node: NodeId,
    /// Restart counter of the agent's main container.
    pub restart_count: u32,
}

/// Backend holding ingested logs.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Prepare the source before producers start. Defaults to a no-op.
    async fn init(&self) -> VerifyResult<()> {
        Ok(())
    }

    /// Release anything acquired by `init`. Defaults to a no-op.
    async fn cleanup(&self) {}

    /// Return every entry currently visible for `producer`.
    ///
    /// Successive calls may return a growing superset.
    async fn read_entries(&self, producer: &ProducerRecord) -> VerifyResult<Vec<LogEntry>>;

    /// Application name of the agent fleet feeding this source.
    fn agent_app_name(&self) -> &str;
}

/// Platform view of nodes and agent placement.
#[async_trait]
pub trait PlacementInventory: Send + Sync {
    /// Nodes that are ready and schedulable.
    async fn eligible_nodes(&self) -> VerifyResult<BTreeSet<NodeId>>;

    /// Instances of the agent application `app_name`.
    async fn agent_instances(&self, app_name: &str) -> VerifyResult<Vec<AgentInstance>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_and_ordering() {
        let a = NodeId::new("node-a");
        let b = NodeId::new("node-b");
        assert_eq!(a.to_string(), "node-a");
        assert!(a < b);
    }

    #[test]
    fn test_node_id_serializes_transparently() {
        let json = serde_json::to_string(&NodeId::new("n1")).unwrap();
        assert_eq!(json, "\"n1\"");
    }
}
