//! Error kinds of the decision engine and control loop.

use std::time::Duration;

use fleetscale_state::{InstanceGroup, Market};
use thiserror::Error;

/// Policy cannot pick a task-node group. Degrades to "no action".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no task-node groups available for scaling")]
    NoTaskGroups,

    #[error("no task-node group in preferred market {preferred} among [{}]", .groups.join(", "))]
    NoPreferredMarket {
        preferred: Market,
        /// `id(MARKET)` of every group considered.
        groups: Vec<String>,
    },
}

impl ConfigurationError {
    pub(crate) fn no_preferred_market(preferred: Market, groups: &[InstanceGroup]) -> Self {
        ConfigurationError::NoPreferredMarket {
            preferred,
            groups: groups
                .iter()
                .map(|g| format!("{}({})", g.id, g.market))
                .collect(),
        }
    }
}

/// The telemetry collector or history storage failed.
#[derive(Debug, Error)]
#[error("telemetry: {0}")]
pub struct TelemetryError(pub String);

/// The fleet adapter failed to list, spawn, reap or change a node.
#[derive(Debug, Error)]
#[error("fleet adapter: {0}")]
pub struct FleetError(pub String);

/// A node host name could not be resolved.
#[derive(Debug, Error)]
#[error("cannot resolve host '{host}': {reason}")]
pub struct ResolutionError {
    pub host: String,
    pub reason: String,
}

/// Faults surfaced at a cluster's tick boundary.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("cluster tick exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("cluster tick aborted: {0}")]
    Aborted(String),

    #[error("unknown cluster '{0}'")]
    UnknownCluster(String),

    #[error("host '{host}' is not a task node of cluster '{cluster_id}'")]
    NotTaskNode { cluster_id: String, host: String },
}
