//! Target JSON wire form (spec.md §6): 4-decimal-precision allocations, a
//! top-level `rebalancing_targets` array and a small `metadata` summary.

use serde_json::{json, Value};

use crate::types::RebalancingTarget;

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Render one rebalance date's targets into the stable wire contract.
/// `timestamp` is supplied by the caller (the engine has no wall-clock).
pub fn targets_to_json(targets: &[RebalancingTarget], timestamp: &str) -> Value {
    let mut actions_summary = std::collections::BTreeMap::<&'static str, u64>::new();
    let mut total_target_allocation = 0.0;

    let rebalancing_targets: Vec<Value> = targets
        .iter()
        .map(|t| {
            *actions_summary.entry(t.action.as_str()).or_insert(0) += 1;
            if t.action.as_str() != "close" {
                total_target_allocation += t.target_alloc;
            }
            json!({
                "asset": t.asset,
                "target_allocation_pct": round4(t.target_alloc),
                "current_allocation_pct": round4(t.current_alloc),
                "action": t.action.as_str(),
                "priority": t.priority.as_str(),
                "score": round4(t.score),
                "reason": t.reason,
            })
        })
        .collect();

    json!({
        "rebalancing_targets": rebalancing_targets,
        "metadata": {
            "total_targets": targets.len(),
            "actions_summary": actions_summary,
            "total_target_allocation": round4(total_target_allocation),
            "timestamp": timestamp,
        }
    })
}
