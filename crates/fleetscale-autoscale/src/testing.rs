//! In-memory port implementations for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use fleetscale_expr::{ExprError, Value};
use fleetscale_state::{
    ClusterDescriptor, ClusterSnapshot, HistoryRecord, InstanceGroup, Market, NodeLoad,
    NodeSnapshot, NodeState,
};

use crate::error::{FleetError, ResolutionError, TelemetryError};
use crate::ports::{BoxFuture, FleetAdapter, TelemetryProvider};
use crate::signal;

pub fn snapshot(cluster_id: &str) -> ClusterSnapshot {
    ClusterSnapshot::empty(cluster_id)
}

/// Adds node `key` with instance id `i-{key}` and host `{key}`.
pub fn add_node(
    snapshot: &mut ClusterSnapshot,
    key: &str,
    group_id: &str,
    group_type: &str,
    queries: u32,
    load: NodeLoad,
) {
    snapshot.nodes.insert(
        key.to_string(),
        NodeSnapshot {
            instance_id: format!("i-{key}"),
            group_id: group_id.to_string(),
            cloud_id: snapshot.cluster_id.clone(),
            host: key.to_string(),
            group_type: group_type.to_string(),
            queries,
            load,
            state: None,
        },
    );
}

pub fn group(id: &str, market: Market) -> InstanceGroup {
    InstanceGroup {
        id: id.to_string(),
        market,
        role: "TASK".to_string(),
    }
}

pub fn descriptor(id: &str, cluster_type: &str) -> ClusterDescriptor {
    ClusterDescriptor {
        id: id.to_string(),
        ip: format!("10.0.0.{}", id.len()),
        cluster_type: cluster_type.to_string(),
        metadata: Default::default(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FleetCall {
    ListGroups(String),
    GroupDetails(String),
    SetState { cluster_ip: String, host: String, state: NodeState },
    Spawn { group_id: String, current: usize, add: u32 },
    Reap { cluster_ip: String, terminal: usize },
}

#[derive(Default)]
pub struct FakeFleet {
    groups: HashMap<String, Vec<InstanceGroup>>,
    calls: Mutex<Vec<FleetCall>>,
    refuses_state: Option<String>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups(mut self, cluster_id: &str, groups: Vec<InstanceGroup>) -> Self {
        self.groups.insert(cluster_id.to_string(), groups);
        self
    }

    /// State changes sent to `node_host` fail without being recorded.
    pub fn failing_state_change(mut self, node_host: &str) -> Self {
        self.refuses_state = Some(node_host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FleetCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn group_lookups(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, FleetCall::GroupDetails(_)))
            .count()
    }

    fn record(&self, call: FleetCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FleetAdapter for FakeFleet {
    fn list_task_groups<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<InstanceGroup>, FleetError>> {
        Box::pin(async move {
            self.record(FleetCall::ListGroups(cluster_id.to_string()));
            Ok(self.groups.get(cluster_id).cloned().unwrap_or_default())
        })
    }

    fn group_details<'a>(
        &'a self,
        cluster_id: &'a str,
        group_id: &'a str,
    ) -> BoxFuture<'a, Result<InstanceGroup, FleetError>> {
        Box::pin(async move {
            self.record(FleetCall::GroupDetails(group_id.to_string()));
            self.groups
                .get(cluster_id)
                .and_then(|groups| groups.iter().find(|g| g.id == group_id))
                .cloned()
                .ok_or_else(|| FleetError(format!("no group {group_id}")))
        })
    }

    fn set_node_state<'a>(
        &'a self,
        cluster_ip: &'a str,
        node_host: &'a str,
        state: NodeState,
    ) -> BoxFuture<'a, Result<(), FleetError>> {
        Box::pin(async move {
            if self.refuses_state.as_deref() == Some(node_host) {
                return Err(FleetError(format!("{node_host} refused state change")));
            }
            self.record(FleetCall::SetState {
                cluster_ip: cluster_ip.to_string(),
                host: node_host.to_string(),
                state,
            });
            Ok(())
        })
    }

    fn spawn_nodes<'a>(
        &'a self,
        group_id: &'a str,
        current_count: usize,
        count_to_add: u32,
    ) -> BoxFuture<'a, Result<(), FleetError>> {
        Box::pin(async move {
            self.record(FleetCall::Spawn {
                group_id: group_id.to_string(),
                current: current_count,
                add: count_to_add,
            });
            Ok(())
        })
    }

    fn reap_terminal_nodes<'a>(
        &'a self,
        cluster_ip: &'a str,
        nodes: &'a [NodeSnapshot],
    ) -> BoxFuture<'a, Result<usize, FleetError>> {
        Box::pin(async move {
            let terminal = nodes.iter().filter(|n| n.is_terminal()).count();
            self.record(FleetCall::Reap {
                cluster_ip: cluster_ip.to_string(),
                terminal,
            });
            Ok(terminal)
        })
    }

    /// `a` resolves to `10.1.0.1`, `b` to `10.1.0.2`, and so on by first
    /// letter. Hosts starting with `unresolvable` fail.
    fn host_to_ip<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<String, ResolutionError>> {
        Box::pin(async move {
            if host.starts_with("unresolvable") {
                return Err(ResolutionError {
                    host: host.to_string(),
                    reason: "no such host".into(),
                });
            }
            let octet = host.bytes().next().map_or(0, |b| b.saturating_sub(b'a') + 1);
            Ok(format!("10.1.0.{octet}"))
        })
    }
}

/// Serves canned snapshots; expressions go through the real evaluator.
#[derive(Default)]
pub struct FakeTelemetry {
    snapshots: HashMap<String, ClusterSnapshot>,
    history: Mutex<Vec<HistoryRecord>>,
}

impl FakeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: ClusterSnapshot) -> Self {
        self.snapshots.insert(snapshot.cluster_id.clone(), snapshot);
        self
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.history.lock().unwrap().clone()
    }
}

impl TelemetryProvider for FakeTelemetry {
    fn fetch_snapshot<'a>(
        &'a self,
        cluster: &'a ClusterDescriptor,
        _window: Duration,
    ) -> BoxFuture<'a, Result<ClusterSnapshot, TelemetryError>> {
        Box::pin(async move {
            self.snapshots
                .get(&cluster.id)
                .cloned()
                .ok_or_else(|| TelemetryError(format!("collector has no data for {}", cluster.id)))
        })
    }

    fn evaluate_expression(
        &self,
        expr: &str,
        snapshot: &ClusterSnapshot,
    ) -> Result<Value, ExprError> {
        fleetscale_expr::evaluate(expr, &signal::snapshot_scope(snapshot))
    }

    fn append_history(&self, record: HistoryRecord) -> BoxFuture<'_, Result<(), TelemetryError>> {
        Box::pin(async move {
            self.history.lock().unwrap().push(record);
            Ok(())
        })
    }

    fn read_history<'a>(
        &'a self,
        cluster_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<HistoryRecord>, TelemetryError>> {
        Box::pin(async move {
            Ok(self
                .history()
                .into_iter()
                .rev()
                .filter(|r| r.cluster_id == cluster_id)
                .take(limit)
                .collect())
        })
    }
}
