//! Optional damping of scaling signals.
//!
//! When enabled, a cluster must produce the same signal on N consecutive
//! ticks before the loop acts on it. Any other outcome resets the streak.

use std::collections::HashMap;

use fleetscale_state::ClusterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Default)]
pub struct HysteresisGate {
    streaks: HashMap<ClusterId, (Direction, u32)>,
}

impl HysteresisGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal and report whether it has now held for `threshold`
    /// consecutive ticks. The streak restarts once it passes.
    pub fn observe(&mut self, cluster_id: &str, direction: Direction, threshold: u32) -> bool {
        let entry = self
            .streaks
            .entry(cluster_id.to_string())
            .or_insert((direction, 0));
        if entry.0 != direction {
            *entry = (direction, 0);
        }
        entry.1 += 1;
        if entry.1 >= threshold.max(1) {
            self.streaks.remove(cluster_id);
            return true;
        }
        false
    }

    /// Forget a cluster's streak (no signal this tick).
    pub fn clear(&mut self, cluster_id: &str) {
        self.streaks.remove(cluster_id);
    }

    pub fn streak(&self, cluster_id: &str) -> Option<(Direction, u32)> {
        self.streaks.get(cluster_id).copied()
    }
}
