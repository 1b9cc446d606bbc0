//! Telemetry collector client with local history.
//!
//! Snapshots come from the collector's HTTP API:
//!
//! ```text
//! GET {collector}/clusters/{id}/snapshot?window={secs}  →  ClusterSnapshot (JSON)
//! ```
//!
//! Scaling expressions are evaluated in-process by `fleetscale-expr`, and
//! each tick's decision is appended to the redb `StateStore`, keeping the
//! newest `retention` records per cluster.

use std::time::Duration;

use fleetscale_autoscale::{BoxFuture, TelemetryError, TelemetryProvider, snapshot_scope};
use fleetscale_expr::{ExprError, Value};
use fleetscale_state::{ClusterDescriptor, ClusterSnapshot, HistoryRecord, StateStore};
use tracing::{debug, warn};

use crate::client::JsonClient;
use crate::error::AdapterError;

/// History records kept per cluster.
pub const DEFAULT_HISTORY_RETENTION: usize = 1000;

pub struct CollectorTelemetry {
    client: JsonClient,
    base_url: String,
    store: StateStore,
    retention: usize,
}

impl CollectorTelemetry {
    pub fn new(base_url: impl Into<String>, store: StateStore, client: JsonClient) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            store,
            retention: DEFAULT_HISTORY_RETENTION,
        }
    }

    pub fn with_retention(mut self, keep: usize) -> Self {
        self.retention = keep.max(1);
        self
    }

    pub fn snapshot_url(&self, cluster_id: &str, window: Duration) -> String {
        format!(
            "{}/clusters/{}/snapshot?window={}",
            self.base_url,
            cluster_id,
            window.as_secs()
        )
    }

    async fn fetch(
        &self,
        cluster: &ClusterDescriptor,
        window: Duration,
    ) -> Result<ClusterSnapshot, AdapterError> {
        let url = self.snapshot_url(&cluster.id, window);
        let mut snapshot: ClusterSnapshot = self.client.get(&url).await?;
        if snapshot.cluster_id != cluster.id {
            warn!(
                cluster = %cluster.id,
                reported = %snapshot.cluster_id,
                "collector answered for a different cluster id, using the requested one"
            );
            snapshot.cluster_id = cluster.id.clone();
        }
        debug!(cluster = %cluster.id, nodes = snapshot.nodes.len(), "snapshot fetched");
        Ok(snapshot)
    }

    fn record(&self, record: &HistoryRecord) -> Result<(), AdapterError> {
        self.store.append_history(record)?;
        let pruned = self.store.prune_history(&record.cluster_id, self.retention)?;
        if pruned > 0 {
            debug!(cluster = %record.cluster_id, pruned, "old history pruned");
        }
        Ok(())
    }
}

impl TelemetryProvider for CollectorTelemetry {
    fn fetch_snapshot<'a>(
        &'a self,
        cluster: &'a ClusterDescriptor,
        window: Duration,
    ) -> BoxFuture<'a, Result<ClusterSnapshot, TelemetryError>> {
        Box::pin(async move { Ok(self.fetch(cluster, window).await?) })
    }

    fn evaluate_expression(
        &self,
        expr: &str,
        snapshot: &ClusterSnapshot,
    ) -> Result<Value, ExprError> {
        fleetscale_expr::evaluate(expr, &snapshot_scope(snapshot))
    }

    fn append_history(&self, record: HistoryRecord) -> BoxFuture<'_, Result<(), TelemetryError>> {
        Box::pin(async move { Ok(self.record(&record)?) })
    }

    fn read_history<'a>(
        &'a self,
        cluster_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<HistoryRecord>, TelemetryError>> {
        Box::pin(async move {
            self.store
                .list_history(cluster_id, limit)
                .map_err(|e| TelemetryError::from(AdapterError::from(e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Canned, TestServer};
    use fleetscale_state::ScalingAction;
    use serde_json::json;

    fn cluster(id: &str) -> ClusterDescriptor {
        ClusterDescriptor {
            id: id.into(),
            ip: "10.0.0.1".into(),
            cluster_type: "Presto".into(),
            metadata: Default::default(),
        }
    }

    fn telemetry(base: &str) -> CollectorTelemetry {
        CollectorTelemetry::new(
            base,
            StateStore::open_in_memory().unwrap(),
            JsonClient::new(Duration::from_secs(2)),
        )
    }

    fn record(cluster_id: &str, at: u64) -> HistoryRecord {
        HistoryRecord {
            cluster_id: cluster_id.into(),
            recorded_at: at,
            action: ScalingAction::Nothing,
            snapshot: ClusterSnapshot::empty(cluster_id),
        }
    }

    #[tokio::test]
    async fn fetches_snapshot_over_window() {
        let server = TestServer::start(|_req| {
            Canned::json(
                200,
                json!({
                    "cluster_id": "j-1",
                    "running": true,
                    "active": true,
                    "node_count": 1,
                    "average": {"cpu": 0.42, "mem": 0.3},
                    "nodes": {
                        "n1": {"iid": "i-1", "gid": "g-1", "cid": "j-1",
                               "host": "ip-10-0-0-9", "type": "TASK", "queries": 2}
                    }
                }),
            )
        })
        .await;
        let telemetry = telemetry(&format!("{}/", server.url("")));

        let snapshot = telemetry
            .fetch_snapshot(&cluster("j-1"), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(snapshot.nodes["n1"].queries, 2);
        assert_eq!(snapshot.average.cpu, Some(0.42));
        assert_eq!(server.requests()[0].path, "/clusters/j-1/snapshot?window=600");

        let value = telemetry
            .evaluate_expression("tasknodes.count.idle + tasknodes.count.nodes", &snapshot)
            .unwrap();
        assert_eq!(value, Value::Int(1));
    }

    #[tokio::test]
    async fn collector_errors_become_telemetry_errors() {
        let server = TestServer::start(|_req| Canned::text(500, "boom")).await;
        let telemetry = telemetry(&server.url(""));

        let err = telemetry
            .fetch_snapshot(&cluster("j-1"), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn history_is_pruned_to_retention() {
        let telemetry = telemetry("http://127.0.0.1:1").with_retention(2);
        for at in [10, 20, 30] {
            telemetry.append_history(record("j-1", at)).await.unwrap();
        }
        telemetry.append_history(record("j-2", 15)).await.unwrap();

        let history = telemetry.read_history("j-1", 10).await.unwrap();
        let stamps: Vec<_> = history.iter().map(|r| r.recorded_at).collect();
        assert_eq!(stamps, vec![30, 20]);
        assert_eq!(telemetry.read_history("j-2", 10).await.unwrap().len(), 1);
    }
}
