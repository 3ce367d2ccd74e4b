use serde::{Deserialize, Serialize};

use crate::automation::{RuleDef, TimerDef};
use crate::cascade::CascadeDef;
use crate::enums::Strength;

/// A node to register at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  pub capacitance: u64,
  /// Charge deposited right after registration.
  #[serde(default)]
  pub initial_charge: u64,
}

/// A bond to create at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondDef {
  pub source: String,
  pub target: String,
  #[serde(default)]
  pub strength: Strength,
}

/// Cascade engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
  /// Wait before the single retry of a failed step.
  pub retry_backoff_ms: u64,
  /// Number of dispatch batches the scheduler keeps.
  pub history_limit: usize,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      retry_backoff_ms: 1000,
      history_limit: 100,
    }
  }
}

/// Simulated failure injection for the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultSettings {
  /// Probability in [0, 1] that a send fails.
  pub failure_rate: f64,
  /// Upper bound of the uniform per-send latency.
  pub max_latency_ms: u64,
}

impl Default for FaultSettings {
  fn default() -> Self {
    Self {
      failure_rate: 0.05,
      max_latency_ms: 50,
    }
  }
}

/// Everything needed to assemble a network.
///
/// `cascades` are registered on top of the built-ins, replacing any with the
/// same name. Empty `rules` or `timers` mean "use the built-in set"; non-empty
/// ones replace it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkDef {
  pub nodes: Vec<NodeDef>,
  pub bonds: Vec<BondDef>,
  pub cascades: Vec<CascadeDef>,
  pub rules: Vec<RuleDef>,
  pub timers: Vec<TimerDef>,
  pub engine: EngineSettings,
  pub faults: FaultSettings,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_network_def_fills_defaults() {
    let def: NetworkDef = serde_json::from_str(
      r#"{
        "nodes": [{ "node_id": "A", "capacitance": 100 }],
        "bonds": [{ "source": "A", "target": "B" }]
      }"#,
    )
    .unwrap();

    assert_eq!(def.nodes[0].initial_charge, 0);
    assert_eq!(def.bonds[0].strength, Strength::Weak);
    assert_eq!(def.engine.retry_backoff_ms, 1000);
    assert_eq!(def.faults.failure_rate, 0.05);
    assert!(def.cascades.is_empty());
  }

  #[test]
  fn test_rule_def_enabled_by_default() {
    let rule: RuleDef =
      serde_json::from_str(r#"{ "trigger": "t", "action": "a", "priority": "high" }"#).unwrap();
    assert!(rule.enabled);
    assert_eq!(rule.priority, crate::Priority::High);
  }
}
