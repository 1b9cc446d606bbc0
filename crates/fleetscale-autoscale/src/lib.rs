//! fleetscale-autoscale — expression-driven scaling of task-node pools.
//!
//! Each tick, for every registered cluster:
//!
//! ```text
//! FETCH     snapshot over the monitoring window
//! EVALUATE  unmanaged or non-Presto cluster  -> N/A (no fleet calls)
//!           downscale expression = n > 0      -> shut down n least-loaded idle task nodes
//!           upscale expression   = k > 0      -> spawn k nodes in the target group
//!           otherwise                         -> NOTHING
//!           reap nodes that finished draining
//! RECORD    (snapshot, action) to history
//! ```
//!
//! The engine only talks to the outside world through the two ports in
//! [`ports`]; HTTP implementations live in `fleetscale-adapters`.

pub mod engine;
pub mod error;
pub mod hysteresis;
pub mod ports;
pub mod scaler;
pub mod signal;

#[cfg(test)]
mod testing;

pub use engine::{
    compute_downscale, compute_upscale, rank_by_load, select_target_group,
    select_termination_candidates, DownscalePlan, LoadWeights,
};
pub use error::{ConfigurationError, FleetError, ResolutionError, ScaleError, TelemetryError};
pub use hysteresis::{Direction, HysteresisGate};
pub use ports::{BoxFuture, FleetAdapter, TelemetryProvider};
pub use scaler::{Autoscaler, ClusterOutcome, DecisionTrace};
pub use signal::{node_count, snapshot_scope};
