//! Actions automation rules can run.

use std::sync::Arc;

use async_trait::async_trait;
use settle_cascade::{CascadeEngine, ChainStatus};
use settle_graph::BondGraph;
use settle_store::CapacityStore;
use tracing::info;

use crate::error::AutomationError;

/// Prefix of the per-cascade trigger actions.
pub const TRIGGER_CASCADE_PREFIX: &str = "trigger_cascade:";
pub const REPAIR_BONDS: &str = "repair_bonds";
pub const REBALANCE_CHARGE: &str = "rebalance_charge";
pub const REPORT_HEALTH: &str = "report_health";

/// Name of the action that triggers `cascade`.
pub fn trigger_cascade_action(cascade: &str) -> String {
  format!("{}{}", TRIGGER_CASCADE_PREFIX, cascade)
}

/// Something a rule does when its trigger fires.
#[async_trait]
pub trait RuleAction: Send + Sync {
  /// Run with the data the trigger was dispatched with.
  async fn run(&self, data: &serde_json::Value) -> Result<serde_json::Value, AutomationError>;
}

/// Starts a cascade with the trigger data and waits for the chain to finish.
///
/// The rule succeeds once the chain is terminal, whatever its status; the
/// status is reported in the output.
pub struct TriggerCascade {
  engine: Arc<CascadeEngine>,
  cascade: String,
}

impl TriggerCascade {
  pub fn new(engine: Arc<CascadeEngine>, cascade: &str) -> Self {
    Self {
      engine,
      cascade: cascade.to_string(),
    }
  }
}

#[async_trait]
impl RuleAction for TriggerCascade {
  async fn run(&self, data: &serde_json::Value) -> Result<serde_json::Value, AutomationError> {
    let chain = self.engine.trigger(&self.cascade, data.clone()).await?;

    Ok(serde_json::json!({
      "chain_id": chain.chain_id,
      "cascade": chain.cascade,
      "status": chain.status,
      "completed": chain.status == ChainStatus::Completed,
      "steps": chain.steps.len(),
      "duration_ms": chain.duration_ms,
    }))
  }
}

/// Reactivates every broken bond.
pub struct RepairBonds {
  graph: Arc<BondGraph>,
}

impl RepairBonds {
  pub fn new(graph: Arc<BondGraph>) -> Self {
    Self { graph }
  }
}

#[async_trait]
impl RuleAction for RepairBonds {
  async fn run(&self, _data: &serde_json::Value) -> Result<serde_json::Value, AutomationError> {
    let repaired = self.graph.repair_all();
    Ok(serde_json::json!({ "repaired": repaired }))
  }
}

/// Pulls outlying nodes back to the mean charge.
pub struct RebalanceCharge {
  store: Arc<CapacityStore>,
}

impl RebalanceCharge {
  pub fn new(store: Arc<CapacityStore>) -> Self {
    Self { store }
  }
}

#[async_trait]
impl RuleAction for RebalanceCharge {
  async fn run(&self, _data: &serde_json::Value) -> Result<serde_json::Value, AutomationError> {
    let adjusted = self.store.balance();
    Ok(serde_json::json!({ "adjusted": adjusted }))
  }
}

/// Snapshot of graph, store, and engine figures.
pub struct ReportHealth {
  graph: Arc<BondGraph>,
  store: Arc<CapacityStore>,
  engine: Arc<CascadeEngine>,
}

impl ReportHealth {
  pub fn new(graph: Arc<BondGraph>, store: Arc<CapacityStore>, engine: Arc<CascadeEngine>) -> Self {
    Self {
      graph,
      store,
      engine,
    }
  }
}

#[async_trait]
impl RuleAction for ReportHealth {
  async fn run(&self, _data: &serde_json::Value) -> Result<serde_json::Value, AutomationError> {
    let collective_strength = self.graph.collective_strength();
    let graph = self.graph.stats();
    let store = self.store.stats();
    let engine = self.engine.stats();

    info!(
      collective_strength,
      active_bonds = graph.active_bonds,
      total_charge = store.total_charge,
      utilization_pct = store.utilization_pct,
      active_chains = engine.active,
      "network_health"
    );

    Ok(serde_json::json!({
      "collective_strength": collective_strength,
      "graph": graph,
      "store": store,
      "engine": engine,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use settle_config::Strength;

  #[test]
  fn test_trigger_cascade_action_name() {
    assert_eq!(trigger_cascade_action("commerce"), "trigger_cascade:commerce");
  }

  #[tokio::test]
  async fn test_repair_bonds_reports_count() {
    let graph = Arc::new(BondGraph::new());
    let bond = graph.connect("A", "B", Strength::Weak);
    graph.break_bond(&bond.bond_id).unwrap();

    let action = RepairBonds::new(graph.clone());
    let out = action.run(&serde_json::json!({})).await.unwrap();
    assert_eq!(out["repaired"], 1);

    let out = action.run(&serde_json::json!({})).await.unwrap();
    assert_eq!(out["repaired"], 0);
  }

  #[tokio::test]
  async fn test_rebalance_charge_reports_adjusted() {
    let store = Arc::new(CapacityStore::new(Arc::new(BondGraph::new())));
    store.register("A", 100).unwrap();
    store.register("B", 100).unwrap();
    store.deposit("A", 200).unwrap();

    let out = RebalanceCharge::new(store.clone())
      .run(&serde_json::json!({}))
      .await
      .unwrap();

    assert_eq!(out["adjusted"], 2);
    assert_eq!(store.node("A").unwrap().current_charge, 100);
    assert_eq!(store.node("B").unwrap().current_charge, 100);
  }
}
