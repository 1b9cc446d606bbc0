//! Fleet agent client and query-engine node control.
//!
//! Instance groups are managed through the fleet agent:
//!
//! ```text
//! GET  {agent}/clusters/{id}/groups?role=TASK   →  [InstanceGroup]
//! GET  {agent}/clusters/{id}/groups/{gid}       →  InstanceGroup
//! POST {agent}/groups/{gid}/spawn               ←  {"current": n, "add": k}
//! POST {agent}/clusters/reap                    ←  {"cluster_ip": ip, "instance_ids": [..]}
//! ```
//!
//! Worker state changes go straight to the query engine on the node:
//! `PUT http://{node}:{port}/v1/info/state` with a JSON string body.

use std::net::IpAddr;

use fleetscale_autoscale::{BoxFuture, FleetAdapter, FleetError, ResolutionError};
use fleetscale_state::{InstanceGroup, InstanceId, NodeSnapshot, NodeState};
use http::Method;
use serde::Serialize;
use tracing::{debug, info};

use crate::client::JsonClient;

/// Default HTTP port of the query engine's REST API on worker nodes.
pub const DEFAULT_PRESTO_PORT: u16 = 8889;

#[derive(Debug, Serialize)]
struct SpawnRequest {
    current: usize,
    add: u32,
}

#[derive(Debug, Serialize)]
struct ReapRequest<'a> {
    cluster_ip: &'a str,
    instance_ids: Vec<&'a InstanceId>,
}

pub struct HttpFleet {
    client: JsonClient,
    agent_url: String,
    presto_port: u16,
}

impl HttpFleet {
    pub fn new(agent_url: impl Into<String>, client: JsonClient) -> Self {
        Self {
            client,
            agent_url: agent_url.into().trim_end_matches('/').to_string(),
            presto_port: DEFAULT_PRESTO_PORT,
        }
    }

    pub fn with_presto_port(mut self, port: u16) -> Self {
        self.presto_port = port;
        self
    }

    fn node_state_url(&self, node_host: &str) -> String {
        // Bare IPv6 literals need brackets in an authority.
        match node_host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("http://[{v6}]:{}/v1/info/state", self.presto_port),
            _ => format!("http://{node_host}:{}/v1/info/state", self.presto_port),
        }
    }
}

impl FleetAdapter for HttpFleet {
    fn list_task_groups<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<InstanceGroup>, FleetError>> {
        Box::pin(async move {
            let url = format!("{}/clusters/{cluster_id}/groups?role=TASK", self.agent_url);
            Ok(self.client.get(&url).await?)
        })
    }

    fn group_details<'a>(
        &'a self,
        cluster_id: &'a str,
        group_id: &'a str,
    ) -> BoxFuture<'a, Result<InstanceGroup, FleetError>> {
        Box::pin(async move {
            let url = format!("{}/clusters/{cluster_id}/groups/{group_id}", self.agent_url);
            Ok(self.client.get(&url).await?)
        })
    }

    fn set_node_state<'a>(
        &'a self,
        cluster_ip: &'a str,
        node_host: &'a str,
        state: NodeState,
    ) -> BoxFuture<'a, Result<(), FleetError>> {
        Box::pin(async move {
            let url = self.node_state_url(node_host);
            self.client.send_json(Method::PUT, &url, state.as_str()).await?;
            debug!(%cluster_ip, node = %node_host, %state, "node state changed");
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
            let url = format!("{}/groups/{group_id}/spawn", self.agent_url);
            let body = SpawnRequest {
                current: current_count,
                add: count_to_add,
            };
            self.client.send_json(Method::POST, &url, &body).await?;
            Ok(())
        })
    }

    fn reap_terminal_nodes<'a>(
        &'a self,
        cluster_ip: &'a str,
        nodes: &'a [NodeSnapshot],
    ) -> BoxFuture<'a, Result<usize, FleetError>> {
        Box::pin(async move {
            let instance_ids: Vec<&InstanceId> = nodes
                .iter()
                .filter(|n| n.is_terminal())
                .map(|n| &n.instance_id)
                .collect();
            if instance_ids.is_empty() {
                return Ok(0);
            }
            let count = instance_ids.len();
            let url = format!("{}/clusters/reap", self.agent_url);
            let body = ReapRequest {
                cluster_ip,
                instance_ids,
            };
            self.client.send_json(Method::POST, &url, &body).await?;
            info!(%cluster_ip, count, "terminal nodes handed to the fleet agent");
            Ok(count)
        })
    }

    fn host_to_ip<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<String, ResolutionError>> {
        Box::pin(resolve_host(host))
    }
}

/// Resolve a host name to one address, preferring IPv4.
pub async fn resolve_host(host: &str) -> Result<String, ResolutionError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }
    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ResolutionError {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .map(|sa| sa.ip())
        .collect();

    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .map(IpAddr::to_string)
        .ok_or_else(|| ResolutionError {
            host: host.to_string(),
            reason: "no addresses".into(),
        })
}
