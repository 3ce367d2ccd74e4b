//! Transmission latency policies.

use std::time::Duration;

use crate::bond::Bond;

/// Decides how long a transmission across a bond takes.
///
/// Injected into [`crate::BondGraph`] so tests can supply fixed values.
pub trait DelayPolicy: Send + Sync {
  fn delay(&self, bond: &Bond) -> Duration;
}

/// `round(resistance × 10)` milliseconds: weak 100ms, medium 20ms, strong 10ms.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResistanceDelay;

impl DelayPolicy for ResistanceDelay {
  fn delay(&self, bond: &Bond) -> Duration {
    Duration::from_millis((bond.resistance * 10.0).round() as u64)
  }
}

/// The same delay for every bond.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl DelayPolicy for FixedDelay {
  fn delay(&self, _bond: &Bond) -> Duration {
    self.0
  }
}

impl<F> DelayPolicy for F
where
  F: Fn(&Bond) -> Duration + Send + Sync,
{
  fn delay(&self, bond: &Bond) -> Duration {
    self(bond)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use settle_config::Strength;

  #[test]
  fn test_resistance_delay_per_tier() {
    let mut bond = Bond::new("A", "B", Strength::Weak, 0);
    assert_eq!(ResistanceDelay.delay(&bond), Duration::from_millis(100));

    bond.set_strength(Strength::Medium);
    assert_eq!(ResistanceDelay.delay(&bond), Duration::from_millis(20));

    bond.set_strength(Strength::Strong);
    assert_eq!(ResistanceDelay.delay(&bond), Duration::from_millis(10));
  }

  #[test]
  fn test_closure_policy() {
    let bond = Bond::new("A", "B", Strength::Weak, 0);
    let policy = |_: &Bond| Duration::from_millis(3);
    assert_eq!(policy.delay(&bond), Duration::from_millis(3));
  }
}
