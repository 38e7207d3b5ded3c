//! Health and placement checks of the collection-agent fleet.
//!
//! Restarts use a worst-case policy: the single most restarted instance is
//! compared to the tolerance, regardless of fleet size. Placement requires
//! exactly one instance on every eligible node.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};
use crate::obs::emit_agent_observed;
use crate::source::{AgentInstance, NodeId, PlacementInventory};

/// Restart counter and placement of one agent instance at observation time.
pub type AgentObservation = AgentInstance;

/// Restart counters of the whole fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSummary {
    pub observations: Vec<AgentObservation>,
    /// Highest restart count across instances (0 for an empty fleet).
    pub max_restarts: u32,
    /// Instance holding `max_restarts`.
    pub worst_agent: Option<String>,
}

impl RestartSummary {
    pub fn from_observations(observations: Vec<AgentObservation>) -> Self {
        let worst = observations
            .iter()
            .max_by_key(|o| o.restart_count)
            .map(|o| (o.name.clone(), o.restart_count));
        let (worst_agent, max_restarts) = match worst {
            Some((name, count)) => (Some(name), count),
            None => (None, 0),
        };
        Self {
            observations,
            max_restarts,
            worst_agent,
        }
    }

    /// `Err(AgentInstability)` when `max_restarts` exceeds `max_allowed`.
    pub fn verdict(&self, max_allowed: u32) -> VerifyResult<()> {
        if self.max_restarts > max_allowed {
            return Err(VerifyError::AgentInstability {
                agent: self.worst_agent.clone().unwrap_or_default(),
                max_restarts: self.max_restarts,
                allowed: max_allowed,
            });
        }
        Ok(())
    }
}

/// A node breaking the one-agent-per-node invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementViolation {
    /// No agent instance runs on the node.
    MissingAgent { node: NodeId },
    /// More than one agent instance runs on the node.
    DuplicateAgents { node: NodeId, count: usize },
}

impl PlacementViolation {
    pub fn node(&self) -> &NodeId {
        match self {
            Self::MissingAgent { node } | Self::DuplicateAgents { node, .. } => node,
        }
    }
}

impl std::fmt::Display for PlacementViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingAgent { node } => write!(f, "node {node} doesn't have an agent instance"),
            Self::DuplicateAgents { node, count } => write!(
                f,
                "node {node} contains {count} agent instances, expected exactly one"
            ),
        }
    }
}

/// Queries the inventory for agent restarts and placement.
///
/// Nothing is cached: every check fetches fresh state.
pub struct AgentHealthChecker {
    inventory: Arc<dyn PlacementInventory>,
    app_name: String,
}

impl AgentHealthChecker {
    pub fn new(inventory: Arc<dyn PlacementInventory>, app_name: impl Into<String>) -> Self {
        Self {
            inventory,
            app_name: app_name.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Fetch the restart counter of every agent instance.
    pub async fn observe_restarts(&self) -> VerifyResult<RestartSummary> {
        let instances = self.inventory.agent_instances(&self.app_name).await?;
        for instance in &instances {
            emit_agent_observed(&instance.name, instance.node.as_str(), instance.restart_count);
        }
        Ok(RestartSummary::from_observations(instances))
    }

    /// Fail when the most restarted instance exceeds `max_allowed`.
    pub async fn check_restarts(&self, max_allowed: u32) -> VerifyResult<RestartSummary> {
        let summary = self.observe_restarts().await?;
        summary.verdict(max_allowed)?;
        Ok(summary)
    }

    /// Every eligible node without exactly one agent instance.
    pub async fn placement_violations(&self) -> VerifyResult<Vec<PlacementViolation>> {
        let instances = self.inventory.agent_instances(&self.app_name).await?;
        let nodes = self.inventory.eligible_nodes().await?;

        let mut per_node: BTreeMap<&NodeId, usize> = BTreeMap::new();
        for instance in &instances {
            *per_node.entry(&instance.node).or_insert(0) += 1;
        }

        let violations = nodes
            .into_iter()
            .filter_map(|node| match per_node.get(&node).copied() {
                None => Some(PlacementViolation::MissingAgent { node }),
                Some(1) => None,
                Some(count) => Some(PlacementViolation::DuplicateAgents { node, count }),
            })
            .collect();
        Ok(violations)
    }

    /// Fail with every offending node when placement is broken.
    pub async fn check_placement(&self) -> VerifyResult<()> {
        let violations = self.placement_violations().await?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(VerifyError::PlacementViolated { violations })
        }
    }
}
