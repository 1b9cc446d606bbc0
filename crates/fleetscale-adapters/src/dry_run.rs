//! Read-only wrapper around a fleet adapter.

use fleetscale_autoscale::{BoxFuture, FleetAdapter, FleetError, ResolutionError};
use fleetscale_state::{InstanceGroup, NodeSnapshot, NodeState};
use tracing::info;

/// Passes queries through to `F` and logs mutations instead of sending them.
pub struct DryRunFleet<F> {
    inner: F,
}

impl<F: FleetAdapter> DryRunFleet<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: FleetAdapter> FleetAdapter for DryRunFleet<F> {
    fn list_task_groups<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<InstanceGroup>, FleetError>> {
        self.inner.list_task_groups(cluster_id)
    }

    fn group_details<'a>(
        &'a self,
        cluster_id: &'a str,
        group_id: &'a str,
    ) -> BoxFuture<'a, Result<InstanceGroup, FleetError>> {
        self.inner.group_details(cluster_id, group_id)
    }

    fn set_node_state<'a>(
        &'a self,
        cluster_ip: &'a str,
        node_host: &'a str,
        state: NodeState,
    ) -> BoxFuture<'a, Result<(), FleetError>> {
        Box::pin(async move {
            info!(dry_run = true, %cluster_ip, node = %node_host, %state, "would change node state");
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
            info!(dry_run = true, group = %group_id, current = current_count, add = count_to_add, "would spawn nodes");
            Ok(())
        })
    }

    /// Reports how many nodes would be reaped.
    fn reap_terminal_nodes<'a>(
        &'a self,
        cluster_ip: &'a str,
        nodes: &'a [NodeSnapshot],
    ) -> BoxFuture<'a, Result<usize, FleetError>> {
        Box::pin(async move {
            let terminal = nodes.iter().filter(|n| n.is_terminal()).count();
            if terminal > 0 {
                info!(dry_run = true, %cluster_ip, terminal, "would reap terminal nodes");
            }
            Ok(terminal)
        })
    }

    fn host_to_ip<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<String, ResolutionError>> {
        self.inner.host_to_ip(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::JsonClient;
    use crate::fleet::HttpFleet;
    use crate::testing::{Canned, TestServer};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn reads_pass_through_and_writes_are_swallowed() {
        let server = TestServer::start(|_req| {
            Canned::json(200, json!([{"id": "ig-1", "market": "SPOT"}]))
        })
        .await;
        let fleet = DryRunFleet::new(HttpFleet::new(
            server.url(""),
            JsonClient::new(Duration::from_secs(2)),
        ));

        let groups = fleet.list_task_groups("j-1").await.unwrap();
        assert_eq!(groups[0].id, "ig-1");

        fleet.spawn_nodes("ig-1", 2, 3).await.unwrap();
        fleet
            .set_node_state("10.0.0.1", "10.0.0.7", NodeState::ShuttingDown)
            .await
            .unwrap();
        let terminal = NodeSnapshot {
            instance_id: "i-1".into(),
            group_id: "ig-1".into(),
            cloud_id: "j-1".into(),
            host: "h".into(),
            group_type: "TASK".into(),
            queries: 0,
            load: Default::default(),
            state: Some(NodeState::Inactive),
        };
        assert_eq!(
            fleet
                .reap_terminal_nodes("10.0.0.1", std::slice::from_ref(&terminal))
                .await
                .unwrap(),
            1
        );

        // Only the listing reached the agent.
        assert_eq!(server.requests().len(), 1);
        assert_eq!(fleet.host_to_ip("10.9.9.9").await.unwrap(), "10.9.9.9");
    }
}
