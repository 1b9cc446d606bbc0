//! Domain types shared across fleetscale.
//!
//! Snapshots are produced by the telemetry collector and only ever read by
//! the decision engine. Field aliases accept the collector's short keys
//! (`iid`, `gid`, `cid`) as well as the long names used on output.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Unique identifier for a managed cluster.
pub type ClusterId = String;

/// Cloud instance identifier of a node.
pub type InstanceId = String;

/// Identifier of an instance group within a cluster.
pub type GroupId = String;

/// The only cluster type the control loop resizes.
pub const PRESTO_CLUSTER_TYPE: &str = "Presto";

/// Node-group type of worker nodes eligible for scaling.
pub const TASK_GROUP_TYPE: &str = "TASK";

// ── Cluster registry ──────────────────────────────────────────────

/// Static identity of a cluster, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterDescriptor {
    pub id: ClusterId,
    /// Management (coordinator) IP address.
    pub ip: String,
    /// Cluster type, e.g. "Presto".
    #[serde(rename = "type")]
    pub cluster_type: String,
    /// Adapter-specific extras (region, profile, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ClusterDescriptor {
    /// Whether this cluster's type is one the control loop may resize.
    pub fn is_autoscalable(&self) -> bool {
        self.cluster_type == PRESTO_CLUSTER_TYPE
    }
}

// ── Snapshots ─────────────────────────────────────────────────────

/// Load metrics of a node (or averaged over a cluster).
///
/// Either metric may be missing from the collector's output.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeLoad {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<f64>,
}

impl NodeLoad {
    pub fn new(cpu: f64, mem: f64) -> Self {
        Self {
            cpu: Some(cpu),
            mem: Some(mem),
        }
    }
}

/// Operational state of a query-engine worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Active,
    ShuttingDown,
    Inactive,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Active => "ACTIVE",
            NodeState::ShuttingDown => "SHUTTING_DOWN",
            NodeState::Inactive => "INACTIVE",
        }
    }

    /// Nodes in a terminal state have finished draining and can be reaped.
    pub fn is_terminal(self) -> bool {
        self == NodeState::Inactive
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(NodeState::Active),
            "SHUTTING_DOWN" => Ok(NodeState::ShuttingDown),
            "INACTIVE" => Ok(NodeState::Inactive),
            other => Err(format!("unknown node state '{other}'")),
        }
    }
}

/// Unknown states from the collector are treated as absent.
fn lenient_state<'de, D>(deserializer: D) -> Result<Option<NodeState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// Per-node state within a cluster snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSnapshot {
    #[serde(alias = "iid")]
    pub instance_id: InstanceId,
    #[serde(alias = "gid")]
    pub group_id: GroupId,
    #[serde(alias = "cid")]
    pub cloud_id: String,
    pub host: String,
    /// Node-group type ("TASK", "CORE", "MASTER", ...).
    #[serde(rename = "type")]
    pub group_type: String,
    /// Active query count; absent means zero.
    #[serde(default)]
    pub queries: u32,
    #[serde(default)]
    pub load: NodeLoad,
    #[serde(
        default,
        deserialize_with = "lenient_state",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<NodeState>,
}

impl NodeSnapshot {
    pub fn is_task(&self) -> bool {
        self.group_type == TASK_GROUP_TYPE
    }

    pub fn is_idle(&self) -> bool {
        self.queries == 0
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_some_and(NodeState::is_terminal)
    }
}

/// Point-in-time view of a cluster used as input to scaling decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSnapshot {
    pub cluster_id: ClusterId,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub active: bool,
    /// Number of task nodes reported by the collector.
    #[serde(default)]
    pub node_count: u32,
    /// Load averaged over the monitoring window.
    #[serde(default)]
    pub average: NodeLoad,
    /// Nodes keyed by collector node key (unique within a snapshot).
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeSnapshot>,
}

impl ClusterSnapshot {
    /// Empty snapshot for a cluster; the collector fills in the rest.
    pub fn empty(cluster_id: impl Into<ClusterId>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            running: false,
            active: false,
            node_count: 0,
            average: NodeLoad::default(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn task_nodes(&self) -> impl Iterator<Item = &NodeSnapshot> {
        self.nodes.values().filter(|n| n.is_task())
    }

    /// Number of snapshot nodes assigned to the given instance group.
    pub fn nodes_in_group(&self, group_id: &str) -> usize {
        self.nodes.values().filter(|n| n.group_id == group_id).count()
    }

    /// Find a node by its host name.
    pub fn node_by_host(&self, host: &str) -> Option<&NodeSnapshot> {
        self.nodes.values().find(|n| n.host == host)
    }
}

// ── Instance groups ───────────────────────────────────────────────

/// Pricing/availability class of a cloud instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    OnDemand,
    Spot,
}

impl Market {
    pub fn as_str(self) -> &'static str {
        match self {
            Market::OnDemand => "ON_DEMAND",
            Market::Spot => "SPOT",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON_DEMAND" => Ok(Market::OnDemand),
            "SPOT" => Ok(Market::Spot),
            other => Err(format!("unknown instance market '{other}'")),
        }
    }
}

/// An instance group of a cluster, as reported by the fleet adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceGroup {
    pub id: GroupId,
    pub market: Market,
    /// Group role, e.g. "TASK".
    #[serde(default)]
    pub role: String,
}

// ── Decisions ─────────────────────────────────────────────────────

/// A node selected for graceful removal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminationCandidate {
    pub instance_id: InstanceId,
    pub cluster_id: String,
    pub group_id: GroupId,
    /// Resolved IP address of the node's host.
    pub ip: String,
}

/// Action taken for a cluster in one tick.
///
/// Serialized as its label: `NOTHING`, `DOWNSCALE(-k)`, `UPSCALE(+k)`, `N/A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ScalingAction {
    Nothing,
    Downscale(u32),
    Upscale(u32),
    NotApplicable,
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingAction::Nothing => f.write_str("NOTHING"),
            ScalingAction::Downscale(k) => write!(f, "DOWNSCALE(-{k})"),
            ScalingAction::Upscale(k) => write!(f, "UPSCALE(+{k})"),
            ScalingAction::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl FromStr for ScalingAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let count = |inner: &str| {
            inner
                .parse::<u32>()
                .map_err(|e| format!("bad count in action '{s}': {e}"))
        };
        match s {
            "NOTHING" => Ok(ScalingAction::Nothing),
            "N/A" => Ok(ScalingAction::NotApplicable),
            _ => {
                if let Some(inner) = s
                    .strip_prefix("DOWNSCALE(-")
                    .and_then(|r| r.strip_suffix(')'))
                {
                    Ok(ScalingAction::Downscale(count(inner)?))
                } else if let Some(inner) =
                    s.strip_prefix("UPSCALE(+").and_then(|r| r.strip_suffix(')'))
                {
                    Ok(ScalingAction::Upscale(count(inner)?))
                } else {
                    Err(format!("unknown scaling action '{s}'"))
                }
            }
        }
    }
}

impl From<ScalingAction> for String {
    fn from(action: ScalingAction) -> Self {
        action.to_string()
    }
}

impl TryFrom<String> for ScalingAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ── History ───────────────────────────────────────────────────────

/// One tick's outcome for a cluster, retained by the telemetry provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub cluster_id: ClusterId,
    /// Unix timestamp in milliseconds.
    pub recorded_at: u64,
    pub action: ScalingAction,
    pub snapshot: ClusterSnapshot,
}

impl HistoryRecord {
    /// Composite key for the history table: cluster first, then time.
    pub fn table_key(&self) -> (&str, u64) {
        (&self.cluster_id, self.recorded_at)
    }
}
