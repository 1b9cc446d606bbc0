//! Scaling decision engine.
//!
//! Given a snapshot and the current `ScalingConfig`, decides which idle
//! task nodes to shed or how many to add. The only I/O is through the
//! ports: expression evaluation, instance-group market lookups and host
//! resolution. Nothing here mutates the fleet.

use std::cmp::Ordering;
use std::collections::HashMap;

use fleetscale_core::ScalingConfig;
use fleetscale_state::{ClusterSnapshot, InstanceGroup, InstanceId, Market, NodeSnapshot, TerminationCandidate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConfigurationError, ScaleError};
use crate::ports::{FleetAdapter, TelemetryProvider};
use crate::signal;

/// Weights of the linear load score used to order removal candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadWeights {
    pub mem: f64,
    pub cpu: f64,
}

impl Default for LoadWeights {
    /// CPU counts double against memory.
    fn default() -> Self {
        Self { mem: 1.0, cpu: 2.0 }
    }
}

impl LoadWeights {
    /// `mem * w_mem + cpu * w_cpu`, a missing metric counting as 0.
    pub fn score(&self, node: &NodeSnapshot) -> f64 {
        node.load.mem.unwrap_or(0.0) * self.mem + node.load.cpu.unwrap_or(0.0) * self.cpu
    }
}

/// Outcome of the downscale computation, kept for the decision trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownscalePlan {
    /// Positive integer result of the downscale expression, if any.
    pub signal: Option<u32>,
    /// Instance ids of every eligible candidate, least loaded first.
    pub considered: Vec<InstanceId>,
    /// No idle node in the preferred market existed, so any market was used.
    pub market_fallback: bool,
    pub candidates: Vec<TerminationCandidate>,
}

/// Idle task nodes eligible for removal.
///
/// Nodes serving queries and non-task nodes are never returned. Unless
/// `ignore_preferred_market` is set, only nodes whose instance group is in
/// the configured preferred market are kept; each group's market is looked
/// up once per call.
pub async fn select_termination_candidates<'s>(
    snapshot: &'s ClusterSnapshot,
    config: &ScalingConfig,
    fleet: &dyn FleetAdapter,
    ignore_preferred_market: bool,
) -> Result<Vec<&'s NodeSnapshot>, ScaleError> {
    let idle = snapshot.task_nodes().filter(|n| n.is_idle());
    if ignore_preferred_market {
        return Ok(idle.collect());
    }

    let preferred = config.preferred_upscale_instance_market;
    let mut markets: HashMap<&str, Market> = HashMap::new();
    let mut candidates = Vec::new();
    for node in idle {
        let market = match markets.get(node.group_id.as_str()) {
            Some(market) => *market,
            None => {
                let group = fleet
                    .group_details(&snapshot.cluster_id, &node.group_id)
                    .await?;
                markets.insert(node.group_id.as_str(), group.market);
                group.market
            }
        };
        if market == preferred {
            candidates.push(node);
        }
    }
    Ok(candidates)
}

/// Order nodes by weighted load, ascending unless `descending`. Ties keep
/// their input order.
pub fn rank_by_load<'s>(
    mut nodes: Vec<&'s NodeSnapshot>,
    weights: LoadWeights,
    descending: bool,
) -> Vec<&'s NodeSnapshot> {
    nodes.sort_by(|a, b| {
        let ord = compare_load(a, b, weights);
        if descending { ord.reverse() } else { ord }
    });
    nodes
}

/// Decide which nodes to terminate this tick.
///
/// The downscale expression yields the number of nodes to remove; an
/// evaluation error or any result other than a positive integer means no
/// downscale. Candidates from the preferred market are used when any exist,
/// otherwise all idle task nodes are. At most `n` of the least loaded are
/// taken, so fewer are returned when fewer are eligible.
pub async fn compute_downscale(
    snapshot: &ClusterSnapshot,
    config: &ScalingConfig,
    telemetry: &dyn TelemetryProvider,
    fleet: &dyn FleetAdapter,
) -> Result<DownscalePlan, ScaleError> {
    let result = telemetry.evaluate_expression(&config.downscale_expr, snapshot);
    if let Err(e) = &result {
        warn!(cluster = %snapshot.cluster_id, error = %e, "downscale expression failed, treating as no signal");
    }
    let Some(wanted) = signal::node_count(&result) else {
        return Ok(DownscalePlan::default());
    };
    debug!(cluster = %snapshot.cluster_id, wanted, "downscale signal");

    let mut plan = DownscalePlan {
        signal: Some(wanted),
        ..Default::default()
    };

    let mut eligible = select_termination_candidates(snapshot, config, fleet, false).await?;
    if eligible.is_empty() {
        eligible = select_termination_candidates(snapshot, config, fleet, true).await?;
        plan.market_fallback = !eligible.is_empty();
    }

    let ranked = rank_by_load(eligible, LoadWeights::default(), false);
    plan.considered = ranked.iter().map(|n| n.instance_id.clone()).collect();

    for node in ranked.into_iter().take(wanted as usize) {
        let ip = fleet.host_to_ip(&node.host).await?;
        plan.candidates.push(TerminationCandidate {
            instance_id: node.instance_id.clone(),
            cluster_id: node.cloud_id.clone(),
            group_id: node.group_id.clone(),
            ip,
        });
    }
    Ok(plan)
}

/// Number of task nodes to add this tick (0 for none).
///
/// Only a count: which machines join is up to the fleet adapter's spawn.
pub fn compute_upscale(
    snapshot: &ClusterSnapshot,
    config: &ScalingConfig,
    telemetry: &dyn TelemetryProvider,
) -> u32 {
    let result = telemetry.evaluate_expression(&config.upscale_expr, snapshot);
    if let Err(e) = &result {
        warn!(cluster = %snapshot.cluster_id, error = %e, "upscale expression failed, treating as no signal");
    }
    signal::node_count(&result).unwrap_or(0)
}

/// Pick the task-node group to grow.
///
/// A single group is used whatever its market. Among several, the first in
/// the preferred market wins; if none is, selection is impossible.
pub fn select_target_group(
    groups: &[InstanceGroup],
    preferred: Market,
) -> Result<&InstanceGroup, ConfigurationError> {
    match groups {
        [] => Err(ConfigurationError::NoTaskGroups),
        [only] => Ok(only),
        _ => groups
            .iter()
            .find(|g| g.market == preferred)
            .ok_or_else(|| ConfigurationError::no_preferred_market(preferred, groups)),
    }
}

/// Order in which [`rank_by_load`] places two nodes.
pub fn compare_load(a: &NodeSnapshot, b: &NodeSnapshot, weights: LoadWeights) -> Ordering {
    weights.score(a).total_cmp(&weights.score(b))
}
