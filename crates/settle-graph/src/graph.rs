//! The bond registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use settle_config::Strength;
use tracing::{debug, info, instrument};

use crate::bond::{Bond, BondStatus, Transmission};
use crate::delay::{DelayPolicy, ResistanceDelay};
use crate::error::GraphError;

/// Aggregate view of the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
  pub total_bonds: usize,
  pub active_bonds: usize,
  pub broken_bonds: usize,
  pub weak_bonds: usize,
  pub medium_bonds: usize,
  pub strong_bonds: usize,
  /// Mean resistance over active bonds, 0 when there are none.
  pub average_resistance: f64,
  pub total_transmissions: u64,
  pub aggregate_capacitance: u64,
}

#[derive(Default)]
struct GraphState {
  bonds: HashMap<String, Bond>,
  /// Sum of capacitance over active bonds.
  aggregate_capacitance: u64,
  active_count: usize,
  total_transmissions: u64,
}

/// Owns every bond in the network.
///
/// All mutations of a bond and of the capacitance aggregate happen under the
/// same write lock, so the aggregate always equals the sum over active bonds.
pub struct BondGraph {
  state: RwLock<GraphState>,
  delay: Arc<dyn DelayPolicy>,
  sequence: AtomicU64,
}

impl BondGraph {
  /// Create an empty graph with [`ResistanceDelay`] latency.
  pub fn new() -> Self {
    Self::with_delay(Arc::new(ResistanceDelay))
  }

  /// Create an empty graph with a custom latency policy.
  pub fn with_delay(delay: Arc<dyn DelayPolicy>) -> Self {
    Self {
      state: RwLock::new(GraphState::default()),
      delay,
      sequence: AtomicU64::new(0),
    }
  }

  /// Create a bond. Duplicate pairs are allowed and tracked independently.
  pub fn connect(&self, source: &str, target: &str, strength: Strength) -> Bond {
    let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
    let bond = Bond::new(source, target, strength, sequence);

    let mut state = self.write();
    state.aggregate_capacitance += bond.capacitance;
    state.active_count += 1;
    state.bonds.insert(bond.bond_id.clone(), bond.clone());

    info!(
      bond_id = %bond.bond_id,
      source = %source,
      target = %target,
      strength = ?strength,
      aggregate_capacitance = state.aggregate_capacitance,
      "bond_created"
    );

    bond
  }

  /// Mark a bond broken and remove its capacitance from the aggregate.
  ///
  /// Breaking an already broken bond changes nothing.
  pub fn break_bond(&self, bond_id: &str) -> Result<(), GraphError> {
    let mut state = self.write();
    let bond = state
      .bonds
      .get_mut(bond_id)
      .ok_or_else(|| GraphError::NotFound(bond_id.to_string()))?;

    if !bond.is_active() {
      return Ok(());
    }

    bond.status = BondStatus::Broken;
    let capacitance = bond.capacitance;
    state.aggregate_capacitance -= capacitance;
    state.active_count -= 1;

    info!(bond_id = %bond_id, capacitance, "bond_broken");
    Ok(())
  }

  /// Reactivate every broken bond. Returns how many were repaired.
  pub fn repair_all(&self) -> usize {
    let mut state = self.write();
    let mut repaired = 0;
    let mut restored = 0;

    for bond in state.bonds.values_mut() {
      if bond.status == BondStatus::Broken {
        bond.status = BondStatus::Active;
        restored += bond.capacitance;
        repaired += 1;
      }
    }

    state.aggregate_capacitance += restored;
    state.active_count += repaired;

    if repaired > 0 {
      info!(repaired, restored_capacitance = restored, "bonds_repaired");
    }

    repaired
  }

  /// Advance a bond one strength tier.
  pub fn strengthen(&self, bond_id: &str) -> Result<Strength, GraphError> {
    let mut state = self.write();
    let bond = state
      .bonds
      .get_mut(bond_id)
      .ok_or_else(|| GraphError::NotFound(bond_id.to_string()))?;

    let next = bond
      .strength
      .next()
      .ok_or_else(|| GraphError::AlreadyMax(bond_id.to_string()))?;

    let before = bond.capacitance;
    bond.set_strength(next);
    let after = bond.capacitance;

    // A broken bond contributes nothing now; repair adds its new value.
    if bond.is_active() {
      state.aggregate_capacitance = state.aggregate_capacitance - before + after;
    }

    info!(bond_id = %bond_id, strength = ?next, "bond_strengthened");
    Ok(next)
  }

  /// Send a payload across a bond.
  ///
  /// Fails immediately for unknown or broken bonds. Otherwise suspends for the
  /// policy's delay, counts the transmission, and always succeeds.
  #[instrument(name = "bond_transmit", skip(self, payload))]
  pub async fn transmit(
    &self,
    bond_id: &str,
    payload: &serde_json::Value,
  ) -> Result<Transmission, GraphError> {
    let delay = {
      let state = self.read();
      let bond = state
        .bonds
        .get(bond_id)
        .ok_or_else(|| GraphError::NotFound(bond_id.to_string()))?;
      if !bond.is_active() {
        return Err(GraphError::NotActive(bond_id.to_string()));
      }
      self.delay.delay(bond)
    };

    let started = tokio::time::Instant::now();
    tokio::time::sleep(delay).await;
    let elapsed = started.elapsed();

    let mut state = self.write();
    state.total_transmissions += 1;
    let bond = state
      .bonds
      .get_mut(bond_id)
      .ok_or_else(|| GraphError::NotFound(bond_id.to_string()))?;
    bond.transmission_count += 1;

    debug!(
      bond_id = %bond_id,
      delay_ms = elapsed.as_millis() as u64,
      payload = %payload,
      "transmission_completed"
    );

    Ok(Transmission {
      bond_id: bond_id.to_string(),
      delay_ms: elapsed.as_millis() as u64,
      strength: bond.strength,
    })
  }

  /// Sum of strength values over active bonds.
  pub fn collective_strength(&self) -> u32 {
    self
      .read()
      .bonds
      .values()
      .filter(|b| b.is_active())
      .map(|b| b.strength.value())
      .sum()
  }

  pub fn aggregate_capacitance(&self) -> u64 {
    self.read().aggregate_capacitance
  }

  pub fn bond(&self, bond_id: &str) -> Result<Bond, GraphError> {
    self
      .read()
      .bonds
      .get(bond_id)
      .cloned()
      .ok_or_else(|| GraphError::NotFound(bond_id.to_string()))
  }

  /// Every bond touching `node_id`, in creation order.
  pub fn bonds_for(&self, node_id: &str) -> Vec<Bond> {
    let mut bonds: Vec<Bond> = self
      .read()
      .bonds
      .values()
      .filter(|b| b.touches(node_id))
      .cloned()
      .collect();
    bonds.sort_by_key(|b| b.sequence);
    bonds
  }

  /// Every active bond, in creation order.
  pub fn active_bonds(&self) -> Vec<Bond> {
    let mut bonds: Vec<Bond> = self
      .read()
      .bonds
      .values()
      .filter(|b| b.is_active())
      .cloned()
      .collect();
    bonds.sort_by_key(|b| b.sequence);
    bonds
  }

  /// The best active bond between two nodes, in either direction.
  ///
  /// Prefers the strongest tier, then the earliest created.
  pub fn find_active_between(&self, a: &str, b: &str) -> Option<Bond> {
    self
      .read()
      .bonds
      .values()
      .filter(|bond| bond.is_active() && bond.connects(a, b))
      .min_by_key(|bond| (std::cmp::Reverse(bond.strength), bond.sequence))
      .cloned()
  }

  pub fn stats(&self) -> GraphStats {
    let state = self.read();
    let mut stats = GraphStats {
      total_bonds: state.bonds.len(),
      active_bonds: state.active_count,
      broken_bonds: state.bonds.len() - state.active_count,
      total_transmissions: state.total_transmissions,
      aggregate_capacitance: state.aggregate_capacitance,
      ..GraphStats::default()
    };

    let mut resistance_sum = 0.0;
    for bond in state.bonds.values().filter(|b| b.is_active()) {
      match bond.strength {
        Strength::Weak => stats.weak_bonds += 1,
        Strength::Medium => stats.medium_bonds += 1,
        Strength::Strong => stats.strong_bonds += 1,
      }
      resistance_sum += bond.resistance;
    }
    if state.active_count > 0 {
      stats.average_resistance = resistance_sum / state.active_count as f64;
    }

    stats
  }

  fn read(&self) -> RwLockReadGuard<'_, GraphState> {
    self.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
    self.state.write().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for BondGraph {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connect_adds_capacitance() {
    let graph = BondGraph::new();
    graph.connect("A", "B", Strength::Weak);
    graph.connect("B", "C", Strength::Medium);

    assert_eq!(graph.aggregate_capacitance(), 600);
    assert_eq!(graph.stats().active_bonds, 2);
  }

  #[test]
  fn test_duplicate_pairs_are_independent() {
    let graph = BondGraph::new();
    let first = graph.connect("A", "B", Strength::Weak);
    let second = graph.connect("A", "B", Strength::Weak);

    graph.break_bond(&first.bond_id).unwrap();

    assert!(!graph.bond(&first.bond_id).unwrap().is_active());
    assert!(graph.bond(&second.bond_id).unwrap().is_active());
    assert_eq!(graph.aggregate_capacitance(), 100);
  }

  #[test]
  fn test_break_twice_subtracts_once() {
    let graph = BondGraph::new();
    let bond = graph.connect("A", "B", Strength::Medium);

    graph.break_bond(&bond.bond_id).unwrap();
    graph.break_bond(&bond.bond_id).unwrap();

    assert_eq!(graph.aggregate_capacitance(), 0);
    assert_eq!(graph.stats().broken_bonds, 1);
  }

  #[test]
  fn test_break_unknown_bond() {
    let graph = BondGraph::new();
    assert_eq!(
      graph.break_bond("missing"),
      Err(GraphError::NotFound("missing".to_string()))
    );
  }

  #[test]
  fn test_repair_all_is_idempotent() {
    let graph = BondGraph::new();
    let a = graph.connect("A", "B", Strength::Weak);
    let b = graph.connect("B", "C", Strength::Strong);
    graph.break_bond(&a.bond_id).unwrap();
    graph.break_bond(&b.bond_id).unwrap();
    assert_eq!(graph.aggregate_capacitance(), 0);

    assert_eq!(graph.repair_all(), 2);
    assert_eq!(graph.aggregate_capacitance(), 1100);
    assert_eq!(graph.repair_all(), 0);
    assert_eq!(graph.aggregate_capacitance(), 1100);
  }

  #[test]
  fn test_strengthen_is_monotonic() {
    let graph = BondGraph::new();
    let bond = graph.connect("A", "B", Strength::Weak);

    assert_eq!(graph.strengthen(&bond.bond_id), Ok(Strength::Medium));
    assert_eq!(graph.aggregate_capacitance(), 500);
    assert_eq!(graph.strengthen(&bond.bond_id), Ok(Strength::Strong));
    assert_eq!(graph.aggregate_capacitance(), 1000);

    let before = graph.bond(&bond.bond_id).unwrap();
    assert_eq!(
      graph.strengthen(&bond.bond_id),
      Err(GraphError::AlreadyMax(bond.bond_id.clone()))
    );
    assert_eq!(graph.bond(&bond.bond_id).unwrap(), before);
    assert_eq!(graph.aggregate_capacitance(), 1000);
  }

  #[test]
  fn test_strengthen_broken_bond_restores_new_value_on_repair() {
    let graph = BondGraph::new();
    let bond = graph.connect("A", "B", Strength::Weak);
    graph.break_bond(&bond.bond_id).unwrap();

    graph.strengthen(&bond.bond_id).unwrap();
    assert_eq!(graph.aggregate_capacitance(), 0);

    graph.repair_all();
    assert_eq!(graph.aggregate_capacitance(), 500);
  }

  #[test]
  fn test_collective_strength_skips_broken() {
    let graph = BondGraph::new();
    graph.connect("A", "B", Strength::Weak);
    graph.connect("B", "C", Strength::Medium);
    let strong = graph.connect("C", "D", Strength::Strong);

    assert_eq!(graph.collective_strength(), 16);
    graph.break_bond(&strong.bond_id).unwrap();
    assert_eq!(graph.collective_strength(), 6);
  }

  #[test]
  fn test_find_active_between_prefers_strongest() {
    let graph = BondGraph::new();
    let weak = graph.connect("A", "B", Strength::Weak);
    let medium = graph.connect("B", "A", Strength::Medium);

    let found = graph.find_active_between("A", "B").unwrap();
    assert_eq!(found.bond_id, medium.bond_id);

    graph.break_bond(&medium.bond_id).unwrap();
    let found = graph.find_active_between("A", "B").unwrap();
    assert_eq!(found.bond_id, weak.bond_id);

    graph.break_bond(&weak.bond_id).unwrap();
    assert!(graph.find_active_between("A", "B").is_none());
  }

  #[test]
  fn test_stats_by_tier() {
    let graph = BondGraph::new();
    graph.connect("A", "B", Strength::Weak);
    graph.connect("A", "C", Strength::Strong);

    let stats = graph.stats();
    assert_eq!(stats.weak_bonds, 1);
    assert_eq!(stats.strong_bonds, 1);
    assert_eq!(stats.medium_bonds, 0);
    assert_eq!(stats.average_resistance, 5.5);
    assert_eq!(graph.bonds_for("A").len(), 2);
    assert_eq!(graph.bonds_for("B").len(), 1);
  }
}
