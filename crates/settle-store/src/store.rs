//! The node registry and charge operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use settle_graph::BondGraph;
use tracing::{info, instrument, warn};

use crate::error::StoreError;
use crate::node::{Node, NodeCell, NodeReport, NodeStatus};

/// Network-wide charge figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
  pub total_nodes: usize,
  pub active_nodes: usize,
  pub total_capacitance: u64,
  pub total_charge: u64,
  pub total_max_charge: u64,
  pub utilization_pct: f64,
  pub deposits: u64,
  pub withdrawals: u64,
  pub transfers_completed: u64,
  pub transfers_failed: u64,
}

type NodeHandle = Arc<Mutex<NodeCell>>;

/// Owns every node's charge.
///
/// Each node sits behind its own mutex, which is the single writer for that
/// node's charge. No node lock is held across an await point, so concurrent
/// transfers in opposite directions cannot deadlock.
pub struct CapacityStore {
  graph: Arc<BondGraph>,
  nodes: RwLock<HashMap<String, NodeHandle>>,
  total_capacitance: AtomicU64,
  transfers_completed: AtomicU64,
  transfers_failed: AtomicU64,
}

impl CapacityStore {
  pub fn new(graph: Arc<BondGraph>) -> Self {
    Self {
      graph,
      nodes: RwLock::new(HashMap::new()),
      total_capacitance: AtomicU64::new(0),
      transfers_completed: AtomicU64::new(0),
      transfers_failed: AtomicU64::new(0),
    }
  }

  /// The bond graph transfers are routed through.
  pub fn graph(&self) -> &Arc<BondGraph> {
    &self.graph
  }

  /// Register a node. Capacitance is fixed for the node's lifetime.
  pub fn register(&self, node_id: &str, capacitance: u64) -> Result<Node, StoreError> {
    if capacitance == 0 {
      return Err(StoreError::InvalidCapacitance(node_id.to_string()));
    }

    let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
    if nodes.contains_key(node_id) {
      return Err(StoreError::AlreadyRegistered(node_id.to_string()));
    }

    let cell = NodeCell::new(node_id, capacitance);
    let node = cell.snapshot();
    nodes.insert(node_id.to_string(), Arc::new(Mutex::new(cell)));
    let total = self.total_capacitance.fetch_add(capacitance, Ordering::SeqCst) + capacitance;

    info!(
      node_id = %node_id,
      capacitance,
      max_charge = node.max_charge,
      total_capacitance = total,
      "node_registered"
    );

    Ok(node)
  }

  /// Add charge. Rejected in full if it would exceed the node's capacity.
  ///
  /// Charge reserved for refunds of the node's in-flight outgoing transfers
  /// counts against capacity, so while one is pending the room left can be
  /// below `max_charge - current_charge`.
  pub fn deposit(&self, node_id: &str, amount: u64) -> Result<(), StoreError> {
    let handle = self.handle(node_id)?;
    let mut cell = lock(&handle);
    credit(&mut cell, amount)
  }

  /// Remove charge. Rejected in full if the node holds less than `amount`.
  pub fn withdraw(&self, node_id: &str, amount: u64) -> Result<(), StoreError> {
    let handle = self.handle(node_id)?;
    let mut cell = lock(&handle);
    debit(&mut cell, amount)
  }

  /// Move charge from `source_id` to `target_id` across an active bond.
  ///
  /// Order of checks: source charge, then the bond, then target capacity. On
  /// any failure after the withdrawal, the amount is refunded to the source
  /// before returning, and the target is left untouched. Dropping the future
  /// mid-transmission (a timeout or an aborted task) refunds the same way and
  /// counts as a failed transfer.
  #[instrument(name = "store_transfer", skip(self))]
  pub async fn transfer(
    &self,
    source_id: &str,
    target_id: &str,
    amount: u64,
  ) -> Result<(), StoreError> {
    let result = self.transfer_inner(source_id, target_id, amount).await;

    match &result {
      Ok(()) => {
        self.transfers_completed.fetch_add(1, Ordering::Relaxed);
        info!(source = %source_id, target = %target_id, amount, "transfer_completed");
      }
      Err(e) => {
        self.transfers_failed.fetch_add(1, Ordering::Relaxed);
        warn!(source = %source_id, target = %target_id, amount, error = %e, "transfer_failed");
      }
    }

    result
  }

  async fn transfer_inner(
    &self,
    source_id: &str,
    target_id: &str,
    amount: u64,
  ) -> Result<(), StoreError> {
    if source_id == target_id {
      return Err(StoreError::SelfTransfer(source_id.to_string()));
    }

    let source = self.handle(source_id)?;
    {
      let mut cell = lock(&source);
      debit(&mut cell, amount)?;
      cell.reserved += amount;
    }
    let in_flight = InFlight {
      source,
      amount,
      failed: &self.transfers_failed,
      armed: true,
    };

    let Some(bond) = self.graph.find_active_between(source_id, target_id) else {
      in_flight.refund();
      return Err(StoreError::NoConnection {
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
      });
    };

    let payload = serde_json::json!({
      "source": source_id,
      "target": target_id,
      "amount": amount,
    });
    if let Err(e) = self.graph.transmit(&bond.bond_id, &payload).await {
      in_flight.refund();
      return Err(e.into());
    }

    let deposited = self
      .handle(target_id)
      .and_then(|target| credit(&mut lock(&target), amount));
    if let Err(e) = deposited {
      in_flight.refund();
      return Err(e);
    }

    in_flight.settle();
    Ok(())
  }

  /// Pull outlying active nodes to the network mean.
  ///
  /// Every active node whose charge differs from the mean by more than 10% of
  /// the mean is reset directly to the mean (clamped to what the node can
  /// hold). No bonds are used. Returns the number of nodes adjusted.
  pub fn balance(&self) -> usize {
    let handles = self.handles();

    // The mean is a snapshot; charge that moves before the second pass is
    // measured against it as-is.

    let charges: Vec<u64> = handles
      .iter()
      .map(|h| lock(h))
      .filter(|cell| cell.is_active())
      .map(|cell| cell.charge)
      .collect();
    if charges.is_empty() {
      return 0;
    }

    let mean = charges.iter().sum::<u64>() as f64 / charges.len() as f64;
    let threshold = mean * 0.1;
    let target = mean.round() as u64;

    let mut adjusted = 0;
    for handle in &handles {
      let mut cell = lock(handle);
      if !cell.is_active() || (cell.charge as f64 - mean).abs() <= threshold {
        continue;
      }
      let ceiling = cell.max_charge - cell.reserved;
      let before = cell.charge;
      cell.charge = target.min(ceiling);
      adjusted += 1;

      info!(
        node_id = %cell.node_id,
        before,
        after = cell.charge,
        "node_rebalanced"
      );
    }

    info!(mean, adjusted, "balance_completed");
    adjusted
  }

  /// Activate or deactivate a node. Inactive nodes are skipped by `balance`.
  pub fn set_status(&self, node_id: &str, status: NodeStatus) -> Result<(), StoreError> {
    let handle = self.handle(node_id)?;
    lock(&handle).status = status;
    Ok(())
  }

  pub fn node(&self, node_id: &str) -> Result<Node, StoreError> {
    let handle = self.handle(node_id)?;
    let node = lock(&handle).snapshot();
    Ok(node)
  }

  pub fn node_report(&self, node_id: &str) -> Result<NodeReport, StoreError> {
    self.node(node_id).map(|node| NodeReport::from(&node))
  }

  /// Snapshots of every node, sorted by id.
  pub fn nodes(&self) -> Vec<Node> {
    let mut nodes: Vec<Node> = self.handles().iter().map(|h| lock(h).snapshot()).collect();
    nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    nodes
  }

  pub fn stats(&self) -> StoreStats {
    let mut stats = StoreStats {
      total_capacitance: self.total_capacitance.load(Ordering::SeqCst),
      transfers_completed: self.transfers_completed.load(Ordering::Relaxed),
      transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
      ..StoreStats::default()
    };

    for node in self.nodes() {
      stats.total_nodes += 1;
      if node.status == NodeStatus::Active {
        stats.active_nodes += 1;
      }
      stats.total_charge += node.current_charge;
      stats.total_max_charge += node.max_charge;
      stats.deposits += node.deposits;
      stats.withdrawals += node.withdrawals;
    }
    if stats.total_max_charge > 0 {
      stats.utilization_pct = stats.total_charge as f64 / stats.total_max_charge as f64 * 100.0;
    }

    stats
  }

  fn handle(&self, node_id: &str) -> Result<NodeHandle, StoreError> {
    self
      .nodes
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(node_id)
      .cloned()
      .ok_or_else(|| StoreError::NodeNotFound(node_id.to_string()))
  }

  fn handles(&self) -> Vec<NodeHandle> {
    self
      .nodes
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect()
  }
}

fn lock(handle: &NodeHandle) -> MutexGuard<'_, NodeCell> {
  handle.lock().unwrap_or_else(PoisonError::into_inner)
}

fn credit(cell: &mut NodeCell, amount: u64) -> Result<(), StoreError> {
  let available = cell.available();
  if amount > available {
    return Err(StoreError::CapacityExceeded {
      node_id: cell.node_id.clone(),
      requested: amount,
      available,
    });
  }
  cell.charge += amount;
  cell.deposits += 1;
  Ok(())
}

fn debit(cell: &mut NodeCell, amount: u64) -> Result<(), StoreError> {
  if amount > cell.charge {
    return Err(StoreError::InsufficientCharge {
      node_id: cell.node_id.clone(),
      requested: amount,
      available: cell.charge,
    });
  }
  cell.charge -= amount;
  cell.withdrawals += 1;
  Ok(())
}

/// Charge withdrawn from a source and not yet credited to its target.
///
/// Refunds the source when dropped while still armed, so a transfer future
/// that is cancelled mid-transmission never loses charge.
struct InFlight<'a> {
  source: NodeHandle,
  amount: u64,
  failed: &'a AtomicU64,
  armed: bool,
}

impl InFlight<'_> {
  /// Return the amount to the source, releasing the reservation.
  fn refund(mut self) {
    self.armed = false;
    self.restore();
  }

  fn restore(&self) -> String {
    let mut cell = lock(&self.source);
    cell.reserved -= self.amount;
    cell.charge += self.amount;
    cell.deposits += 1;
    cell.node_id.clone()
  }

  /// The target holds the amount; release the reservation only.
  fn settle(mut self) {
    self.armed = false;
    lock(&self.source).reserved -= self.amount;
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let node_id = self.restore();
    self.failed.fetch_add(1, Ordering::Relaxed);
    warn!(source = %node_id, amount = self.amount, "transfer_abandoned");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use settle_graph::Strength;

  fn store() -> CapacityStore {
    CapacityStore::new(Arc::new(BondGraph::new()))
  }

  #[test]
  fn test_register_derives_max_charge() {
    let store = store();
    let node = store.register("X", 1000).unwrap();

    assert_eq!(node.max_charge, 10_000);
    assert_eq!(node.current_charge, 0);
    assert_eq!(node.voltage, 0.0);
    assert_eq!(store.stats().total_capacitance, 1000);
  }

  #[test]
  fn test_register_rejects_duplicates_and_zero() {
    let store = store();
    store.register("X", 10).unwrap();

    assert_eq!(
      store.register("X", 20),
      Err(StoreError::AlreadyRegistered("X".to_string()))
    );
    assert_eq!(
      store.register("Y", 0),
      Err(StoreError::InvalidCapacitance("Y".to_string()))
    );
    assert_eq!(store.node("X").unwrap().capacitance, 10);
  }

  #[test]
  fn test_deposit_up_to_capacity() {
    let store = store();
    store.register("X", 1000).unwrap();

    store.deposit("X", 10_000).unwrap();
    let node = store.node("X").unwrap();
    assert_eq!(node.current_charge, 10_000);
    assert_eq!(node.voltage, 10.0);

    let err = store.deposit("X", 1).unwrap_err();
    assert!(matches!(err, StoreError::CapacityExceeded { available: 0, .. }));
    assert_eq!(store.node("X").unwrap().current_charge, 10_000);
  }

  #[test]
  fn test_withdraw_rejects_overdraw() {
    let store = store();
    store.register("X", 10).unwrap();
    store.deposit("X", 40).unwrap();

    let err = store.withdraw("X", 41).unwrap_err();
    assert!(matches!(
      err,
      StoreError::InsufficientCharge {
        requested: 41,
        available: 40,
        ..
      }
    ));

    store.withdraw("X", 15).unwrap();
    let node = store.node("X").unwrap();
    assert_eq!(node.current_charge, 25);
    assert_eq!(node.voltage, 2.5);
  }

  #[test]
  fn test_unknown_node() {
    let store = store();
    assert_eq!(
      store.deposit("nope", 1),
      Err(StoreError::NodeNotFound("nope".to_string()))
    );
    assert_eq!(
      store.withdraw("nope", 1),
      Err(StoreError::NodeNotFound("nope".to_string()))
    );
  }

  #[test]
  fn test_balance_resets_outliers_to_mean() {
    let store = store();
    store.register("A", 100).unwrap();
    store.register("B", 100).unwrap();
    store.register("C", 100).unwrap();
    store.deposit("A", 100).unwrap();
    store.deposit("B", 200).unwrap();
    store.deposit("C", 300).unwrap();

    // mean 200, threshold 20: A and C move, B stays.
    assert_eq!(store.balance(), 2);
    for id in ["A", "B", "C"] {
      assert_eq!(store.node(id).unwrap().current_charge, 200);
    }
    assert_eq!(store.balance(), 0);
  }

  #[test]
  fn test_balance_ignores_inactive_nodes() {
    let store = store();
    store.register("A", 100).unwrap();
    store.register("B", 100).unwrap();
    store.register("C", 100).unwrap();
    store.deposit("A", 100).unwrap();
    store.deposit("B", 100).unwrap();
    store.deposit("C", 900).unwrap();
    store.set_status("C", NodeStatus::Inactive).unwrap();

    assert_eq!(store.balance(), 0);
    assert_eq!(store.node("C").unwrap().current_charge, 900);
  }

  #[test]
  fn test_balance_clamps_to_node_capacity() {
    let store = store();
    store.register("small", 1).unwrap();
    store.register("big", 1000).unwrap();
    store.deposit("big", 1000).unwrap();

    // mean 500, but "small" can only hold 10.
    assert_eq!(store.balance(), 2);
    assert_eq!(store.node("small").unwrap().current_charge, 10);
    assert_eq!(store.node("big").unwrap().current_charge, 500);
  }

  #[test]
  fn test_node_report() {
    let store = store();
    store.register("X", 10).unwrap();
    assert_eq!(store.node_report("X").unwrap().deposit_withdraw_ratio, None);

    store.deposit("X", 50).unwrap();
    store.deposit("X", 10).unwrap();
    store.withdraw("X", 20).unwrap();

    let report = store.node_report("X").unwrap();
    assert_eq!(report.utilization_pct, 40.0);
    assert_eq!(report.available_capacity, 60);
    assert_eq!(report.deposit_withdraw_ratio, Some(2.0));
  }

  #[test]
  fn test_stats_totals() {
    let store = store();
    store.graph().connect("A", "B", Strength::Weak);
    store.register("A", 10).unwrap();
    store.register("B", 30).unwrap();
    store.deposit("A", 100).unwrap();

    let stats = store.stats();
    assert_eq!(stats.total_nodes, 2);
    assert_eq!(stats.total_capacitance, 40);
    assert_eq!(stats.total_charge, 100);
    assert_eq!(stats.total_max_charge, 400);
    assert_eq!(stats.utilization_pct, 25.0);
  }
}
