//! Control loop: one `FETCH → EVALUATE → ACT → RECORD` pass per cluster.
//!
//! Clusters are processed sequentially in registry order. Each cluster's
//! pass runs in its own task under a deadline, so an error, a hang or a
//! panic in one cluster is reported in its outcome and the next cluster
//! still runs.

use std::error::Error as StdError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fleetscale_core::{ClusterRegistry, ScalingConfig, SettingsHandle};
use fleetscale_state::{
    ClusterDescriptor, ClusterId, ClusterSnapshot, GroupId, HistoryRecord, InstanceId,
    NodeSnapshot, NodeState, ScalingAction, TerminationCandidate,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine;
use crate::error::ScaleError;
use crate::hysteresis::{Direction, HysteresisGate};
use crate::ports::{FleetAdapter, TelemetryProvider};

/// Default overall deadline for one cluster's pass.
pub const DEFAULT_TICK_DEADLINE: Duration = Duration::from_secs(120);

/// What the loop saw and did for one cluster in one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionTrace {
    pub downscale_signal: Option<u32>,
    /// Eligible removal candidates, least loaded first.
    pub considered: Vec<InstanceId>,
    pub market_fallback: bool,
    /// Nodes sent to `SHUTTING_DOWN`.
    pub terminated: Vec<TerminationCandidate>,
    /// Set when a state change failed after earlier nodes were already
    /// told to shut down; the action then covers only those nodes.
    pub downscale_error: Option<String>,
    pub upscale_signal: Option<u32>,
    pub target_group: Option<GroupId>,
    /// Snapshot nodes in the target group before spawning.
    pub current_group_nodes: Option<usize>,
    pub configuration_error: Option<String>,
    /// A signal was seen but has not yet held for enough ticks.
    pub held_by_hysteresis: bool,
    pub reaped: usize,
    pub reap_error: Option<String>,
}

/// Result of one cluster's pass. `action` is absent when the pass failed.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterOutcome {
    pub cluster_id: ClusterId,
    pub action: Option<ScalingAction>,
    pub trace: Option<DecisionTrace>,
    pub error: Option<String>,
}

impl ClusterOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives scaling for every registered cluster.
pub struct Autoscaler {
    registry: Arc<ClusterRegistry>,
    settings: Arc<SettingsHandle>,
    telemetry: Arc<dyn TelemetryProvider>,
    fleet: Arc<dyn FleetAdapter>,
    gate: Arc<Mutex<HysteresisGate>>,
    tick_deadline: Duration,
}

impl Autoscaler {
    pub fn new(
        registry: Arc<ClusterRegistry>,
        settings: Arc<SettingsHandle>,
        telemetry: Arc<dyn TelemetryProvider>,
        fleet: Arc<dyn FleetAdapter>,
    ) -> Self {
        Self {
            registry,
            settings,
            telemetry,
            fleet,
            gate: Arc::new(Mutex::new(HysteresisGate::new())),
            tick_deadline: DEFAULT_TICK_DEADLINE,
        }
    }

    pub fn with_tick_deadline(mut self, deadline: Duration) -> Self {
        self.tick_deadline = deadline;
        self
    }

    /// Run one pass over every registered cluster.
    ///
    /// The configuration is read once up front and shared by all clusters
    /// in this tick. Returns one outcome per cluster, in registry order.
    pub async fn tick(&self) -> Vec<ClusterOutcome> {
        let config = self.settings.current();
        let mut outcomes = Vec::with_capacity(self.registry.len());

        for cluster in self.registry.iter() {
            let pass = ClusterPass {
                cluster: cluster.clone(),
                config: config.clone(),
                telemetry: self.telemetry.clone(),
                fleet: self.fleet.clone(),
                gate: self.gate.clone(),
            };
            let deadline = self.tick_deadline;
            let handle = tokio::spawn(async move { tokio::time::timeout(deadline, pass.run()).await });

            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(_elapsed)) => Err(ScaleError::Timeout(deadline)),
                Err(join) => Err(ScaleError::Aborted(join_failure(join))),
            };

            let outcome = match result {
                Ok((action, trace)) => {
                    let error = trace.downscale_error.clone();
                    match &error {
                        None => {
                            info!(cluster = %cluster.id, action = %action, "cluster tick complete");
                        }
                        Some(chain) => {
                            error!(
                                cluster = %cluster.id,
                                action = %action,
                                error = %chain,
                                "downscale stopped partway"
                            );
                        }
                    }
                    ClusterOutcome {
                        cluster_id: cluster.id.clone(),
                        action: Some(action),
                        trace: Some(trace),
                        error,
                    }
                }
                Err(e) => {
                    let chain = error_chain(&e);
                    error!(cluster = %cluster.id, error = %chain, "cluster tick failed");
                    ClusterOutcome {
                        cluster_id: cluster.id.clone(),
                        action: None,
                        trace: None,
                        error: Some(chain),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Tick, sleep for the configured interval, repeat until `shutdown`
    /// flips to true or its sender goes away.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(clusters = self.registry.len(), "autoscaler started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.settings.refresh();
            self.tick().await;

            let interval = self.settings.current().loop_interval();
            debug!(interval_secs = interval.as_secs(), "sleeping until next tick");
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("autoscaler shutting down");
    }

    /// Gracefully stop one task node of a registered cluster.
    pub async fn restart_node(
        &self,
        cluster_id: &str,
        host: &str,
    ) -> Result<TerminationCandidate, ScaleError> {
        let cluster = self
            .registry
            .get(cluster_id)
            .ok_or_else(|| ScaleError::UnknownCluster(cluster_id.to_string()))?;
        let window = self.settings.current().monitoring_window();
        let snapshot = self.telemetry.fetch_snapshot(cluster, window).await?;

        let node = snapshot
            .node_by_host(host)
            .filter(|n| n.is_task())
            .ok_or_else(|| ScaleError::NotTaskNode {
                cluster_id: cluster_id.to_string(),
                host: host.to_string(),
            })?;
        let ip = self.fleet.host_to_ip(&node.host).await?;
        self.fleet
            .set_node_state(&cluster.ip, &ip, NodeState::ShuttingDown)
            .await?;
        info!(cluster = %cluster_id, host, %ip, "node restart requested");

        Ok(TerminationCandidate {
            instance_id: node.instance_id.clone(),
            cluster_id: node.cloud_id.clone(),
            group_id: node.group_id.clone(),
            ip,
        })
    }

    /// Stored decisions for a cluster, most recent first.
    pub async fn history(
        &self,
        cluster_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, ScaleError> {
        Ok(self.telemetry.read_history(cluster_id, limit).await?)
    }
}

/// Everything one cluster's pass needs, owned so it can run in its own task.
struct ClusterPass {
    cluster: ClusterDescriptor,
    config: Arc<ScalingConfig>,
    telemetry: Arc<dyn TelemetryProvider>,
    fleet: Arc<dyn FleetAdapter>,
    gate: Arc<Mutex<HysteresisGate>>,
}

impl ClusterPass {
    async fn run(self) -> Result<(ScalingAction, DecisionTrace), ScaleError> {
        let cluster = &self.cluster;
        let config = &*self.config;

        let snapshot = self
            .telemetry
            .fetch_snapshot(cluster, config.monitoring_window())
            .await?;

        let mut trace = DecisionTrace::default();
        let action = if !cluster.is_autoscalable() || !config.is_managed(&cluster.id) {
            debug!(cluster = %cluster.id, kind = %cluster.cluster_type, "cluster not managed");
            ScalingAction::NotApplicable
        } else {
            let action = match self.act(&snapshot, &mut trace).await {
                Ok(action) => action,
                // Nodes already shutting down must still reach history.
                Err(e) if !trace.terminated.is_empty() => {
                    trace.downscale_error = Some(error_chain(&e));
                    ScalingAction::Downscale(terminated_count(&trace))
                }
                Err(e) => return Err(e),
            };

            let nodes: Vec<NodeSnapshot> = snapshot.nodes.values().cloned().collect();
            match self.fleet.reap_terminal_nodes(&cluster.ip, &nodes).await {
                Ok(reaped) => {
                    if reaped > 0 {
                        info!(cluster = %cluster.id, reaped, "reaped terminal nodes");
                    }
                    trace.reaped = reaped;
                }
                Err(e) => {
                    warn!(cluster = %cluster.id, error = %e, "reaping terminal nodes failed");
                    trace.reap_error = Some(e.to_string());
                }
            }
            action
        };

        self.telemetry
            .append_history(HistoryRecord {
                cluster_id: cluster.id.clone(),
                recorded_at: epoch_millis(),
                action,
                snapshot,
            })
            .await?;

        Ok((action, trace))
    }

    async fn act(
        &self,
        snapshot: &ClusterSnapshot,
        trace: &mut DecisionTrace,
    ) -> Result<ScalingAction, ScaleError> {
        let cluster = &self.cluster;
        let config = &*self.config;
        let telemetry = &*self.telemetry;
        let fleet = &*self.fleet;

        let plan = engine::compute_downscale(snapshot, config, telemetry, fleet).await?;
        trace.downscale_signal = plan.signal;
        trace.considered = plan.considered;
        trace.market_fallback = plan.market_fallback;

        if !plan.candidates.is_empty() {
            if !self.pass_gate(Direction::Down, config.downscale_trigger_iterations) {
                trace.held_by_hysteresis = true;
                return Ok(ScalingAction::Nothing);
            }
            for candidate in plan.candidates {
                fleet
                    .set_node_state(&cluster.ip, &candidate.ip, NodeState::ShuttingDown)
                    .await?;
                info!(
                    cluster = %cluster.id,
                    instance = %candidate.instance_id,
                    ip = %candidate.ip,
                    "node asked to shut down"
                );
                trace.terminated.push(candidate);
            }
            return Ok(ScalingAction::Downscale(terminated_count(trace)));
        }

        let wanted = engine::compute_upscale(snapshot, config, telemetry);
        if wanted == 0 {
            self.clear_gate();
            return Ok(ScalingAction::Nothing);
        }
        trace.upscale_signal = Some(wanted);
        if !self.pass_gate(Direction::Up, config.upscale_trigger_iterations) {
            trace.held_by_hysteresis = true;
            return Ok(ScalingAction::Nothing);
        }

        let groups = fleet.list_task_groups(&cluster.id).await?;
        let group = match engine::select_target_group(
            &groups,
            config.preferred_upscale_instance_market,
        ) {
            Ok(group) => group,
            Err(e) => {
                warn!(cluster = %cluster.id, error = %e, "cannot pick a group to grow");
                trace.configuration_error = Some(e.to_string());
                return Ok(ScalingAction::Nothing);
            }
        };

        let current = snapshot.nodes_in_group(&group.id);
        fleet.spawn_nodes(&group.id, current, wanted).await?;
        info!(
            cluster = %cluster.id,
            group = %group.id,
            market = %group.market,
            current,
            add = wanted,
            "task nodes requested"
        );
        trace.target_group = Some(group.id.clone());
        trace.current_group_nodes = Some(current);
        Ok(ScalingAction::Upscale(wanted))
    }

    /// Always passes unless hysteresis is enabled.
    fn pass_gate(&self, direction: Direction, threshold: u32) -> bool {
        if !self.config.hysteresis {
            return true;
        }
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.observe(&self.cluster.id, direction, threshold)
    }

    fn clear_gate(&self) {
        if self.config.hysteresis {
            let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            gate.clear(&self.cluster.id);
        }
    }
}

/// `outer: cause: root cause`
fn terminated_count(trace: &DecisionTrace) -> u32 {
    u32::try_from(trace.terminated.len()).unwrap_or(u32::MAX)
}

fn error_chain(err: &dyn StdError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

fn join_failure(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
