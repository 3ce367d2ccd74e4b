use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settle_config::Strength;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStatus {
  Active,
  Broken,
}

/// A weighted connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
  pub bond_id: String,
  pub source: String,
  pub target: String,
  pub strength: Strength,
  /// `100 × strength.value()`.
  pub capacitance: u64,
  /// `10 / strength.value()`.
  pub resistance: f64,
  pub status: BondStatus,
  pub transmission_count: u64,
  pub created_at: DateTime<Utc>,
  /// Creation sequence within the owning graph.
  pub sequence: u64,
}

impl Bond {
  pub(crate) fn new(source: &str, target: &str, strength: Strength, sequence: u64) -> Self {
    let created_at = Utc::now();
    let bond_id = format!(
      "bond-{}-{}-{}-{}",
      source,
      target,
      created_at.timestamp_millis(),
      sequence
    );

    Self {
      bond_id,
      source: source.to_string(),
      target: target.to_string(),
      strength,
      capacitance: capacitance_of(strength),
      resistance: resistance_of(strength),
      status: BondStatus::Active,
      transmission_count: 0,
      created_at,
      sequence,
    }
  }

  /// Change the strength tier, keeping capacitance and resistance in step.
  pub(crate) fn set_strength(&mut self, strength: Strength) {
    self.strength = strength;
    self.capacitance = capacitance_of(strength);
    self.resistance = resistance_of(strength);
  }

  pub fn is_active(&self) -> bool {
    self.status == BondStatus::Active
  }

  /// Whether this bond joins `a` and `b`, in either direction.
  pub fn connects(&self, a: &str, b: &str) -> bool {
    (self.source == a && self.target == b) || (self.source == b && self.target == a)
  }

  pub fn touches(&self, node_id: &str) -> bool {
    self.source == node_id || self.target == node_id
  }
}

fn capacitance_of(strength: Strength) -> u64 {
  100 * u64::from(strength.value())
}

fn resistance_of(strength: Strength) -> f64 {
  10.0 / f64::from(strength.value())
}

/// Outcome of a completed transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
  pub bond_id: String,
  pub delay_ms: u64,
  pub strength: Strength,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_derived_values_follow_strength() {
    let mut bond = Bond::new("A", "B", Strength::Weak, 0);
    assert_eq!(bond.capacitance, 100);
    assert_eq!(bond.resistance, 10.0);

    bond.set_strength(Strength::Medium);
    assert_eq!(bond.capacitance, 500);
    assert_eq!(bond.resistance, 2.0);

    bond.set_strength(Strength::Strong);
    assert_eq!(bond.capacitance, 1000);
    assert_eq!(bond.resistance, 1.0);
  }

  #[test]
  fn test_connects_either_direction() {
    let bond = Bond::new("A", "B", Strength::Weak, 0);
    assert!(bond.connects("A", "B"));
    assert!(bond.connects("B", "A"));
    assert!(!bond.connects("A", "C"));
    assert!(bond.touches("B"));
  }

  #[test]
  fn test_same_pair_gets_distinct_ids() {
    let first = Bond::new("A", "B", Strength::Weak, 0);
    let second = Bond::new("A", "B", Strength::Weak, 1);
    assert_ne!(first.bond_id, second.bond_id);
  }
}
