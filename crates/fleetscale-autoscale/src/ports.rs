//! Collaborator contracts consumed by the decision engine and control loop.
//!
//! Implementations own their transport and are expected to bound every
//! call with a timeout; the control loop only enforces an overall deadline
//! per cluster tick.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use fleetscale_expr::{ExprError, Value};
use fleetscale_state::{
    ClusterDescriptor, ClusterSnapshot, HistoryRecord, InstanceGroup, NodeSnapshot, NodeState,
};

use crate::error::{FleetError, ResolutionError, TelemetryError};

/// Boxed future returned by port methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cluster telemetry, expression evaluation and scaling history.
pub trait TelemetryProvider: Send + Sync {
    /// Snapshot of the cluster's nodes over the given lookback window.
    fn fetch_snapshot<'a>(
        &'a self,
        cluster: &'a ClusterDescriptor,
        window: Duration,
    ) -> BoxFuture<'a, Result<ClusterSnapshot, TelemetryError>>;

    /// Evaluate a scaling expression against a snapshot.
    fn evaluate_expression(
        &self,
        expr: &str,
        snapshot: &ClusterSnapshot,
    ) -> Result<Value, ExprError>;

    fn append_history(&self, record: HistoryRecord) -> BoxFuture<'_, Result<(), TelemetryError>>;

    /// Most recent records first.
    fn read_history<'a>(
        &'a self,
        cluster_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<HistoryRecord>, TelemetryError>>;
}

/// Instance-group queries and node lifecycle commands.
pub trait FleetAdapter: Send + Sync {
    /// Task-node instance groups of a cluster.
    fn list_task_groups<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<InstanceGroup>, FleetError>>;

    fn group_details<'a>(
        &'a self,
        cluster_id: &'a str,
        group_id: &'a str,
    ) -> BoxFuture<'a, Result<InstanceGroup, FleetError>>;

    /// Ask a query-engine worker to change state (graceful shutdown).
    fn set_node_state<'a>(
        &'a self,
        cluster_ip: &'a str,
        node_host: &'a str,
        state: NodeState,
    ) -> BoxFuture<'a, Result<(), FleetError>>;

    /// Grow a group from `current_count` by `count_to_add` nodes.
    fn spawn_nodes<'a>(
        &'a self,
        group_id: &'a str,
        current_count: usize,
        count_to_add: u32,
    ) -> BoxFuture<'a, Result<(), FleetError>>;

    /// Terminate machines whose workers already reached a terminal state.
    /// Returns how many were reaped.
    fn reap_terminal_nodes<'a>(
        &'a self,
        cluster_ip: &'a str,
        nodes: &'a [NodeSnapshot],
    ) -> BoxFuture<'a, Result<usize, FleetError>>;

    fn host_to_ip<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<String, ResolutionError>>;
}
