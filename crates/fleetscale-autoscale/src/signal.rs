//! Bridge between cluster snapshots and scaling expressions.

use fleetscale_expr::{ExprError, Scope, Value};
use fleetscale_state::ClusterSnapshot;

/// Flatten a snapshot into the variables scaling expressions may read.
pub fn snapshot_scope(snapshot: &ClusterSnapshot) -> Scope {
    let idle = snapshot
        .task_nodes()
        .filter(|n| n.is_idle())
        .count();

    let mut scope = Scope::new();
    scope.insert("tasknodes.running", Value::Bool(snapshot.running));
    scope.insert("tasknodes.active", Value::Bool(snapshot.active));
    scope.insert(
        "tasknodes.count.nodes",
        Value::Int(i64::from(snapshot.node_count)),
    );
    scope.insert("tasknodes.count.idle", Value::Int(idle as i64));
    scope.insert(
        "tasknodes.average.cpu",
        Value::Float(snapshot.average.cpu.unwrap_or(0.0)),
    );
    scope.insert(
        "tasknodes.average.mem",
        Value::Float(snapshot.average.mem.unwrap_or(0.0)),
    );
    scope
}

/// A node-count signal: only a positive integer counts.
pub fn node_count(result: &Result<Value, ExprError>) -> Option<u32> {
    match result {
        Ok(Value::Int(n)) if *n > 0 => Some(u32::try_from(*n).unwrap_or(u32::MAX)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_state::{NodeLoad, NodeSnapshot};

    #[test]
    fn scope_exposes_cluster_aggregates() {
        let mut snapshot = ClusterSnapshot::empty("j-1");
        snapshot.running = true;
        snapshot.node_count = 2;
        snapshot.average = NodeLoad { cpu: Some(0.25), mem: None };
        for (key, queries) in [("a", 0), ("b", 4)] {
            snapshot.nodes.insert(
                key.to_string(),
                NodeSnapshot {
                    instance_id: format!("i-{key}"),
                    group_id: "g".into(),
                    cloud_id: "j-1".into(),
                    host: key.into(),
                    group_type: "TASK".into(),
                    queries,
                    load: NodeLoad::default(),
                    state: None,
                },
            );
        }

        let scope = snapshot_scope(&snapshot);
        assert_eq!(scope.get("tasknodes.running"), Some(Value::Bool(true)));
        assert_eq!(scope.get("tasknodes.active"), Some(Value::Bool(false)));
        assert_eq!(scope.get("tasknodes.count.nodes"), Some(Value::Int(2)));
        assert_eq!(scope.get("tasknodes.count.idle"), Some(Value::Int(1)));
        assert_eq!(scope.get("tasknodes.average.cpu"), Some(Value::Float(0.25)));
        assert_eq!(scope.get("tasknodes.average.mem"), Some(Value::Float(0.0)));
    }

    #[test]
    fn only_positive_integers_are_signals() {
        assert_eq!(node_count(&Ok(Value::Int(3))), Some(3));
        assert_eq!(node_count(&Ok(Value::Int(0))), None);
        assert_eq!(node_count(&Ok(Value::Int(-2))), None);
        assert_eq!(node_count(&Ok(Value::Float(2.0))), None);
        assert_eq!(node_count(&Ok(Value::Bool(true))), None);
        assert_eq!(node_count(&Err(ExprError::DivisionByZero)), None);
    }
}
