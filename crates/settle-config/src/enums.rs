use serde::{Deserialize, Serialize};

/// Strength tier of a bond. Ordered weak < medium < strong.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
  #[default]
  Weak,
  Medium,
  Strong,
}

impl Strength {
  /// Numeric weight of the tier (weak=1, medium=5, strong=10).
  pub fn value(self) -> u32 {
    match self {
      Strength::Weak => 1,
      Strength::Medium => 5,
      Strength::Strong => 10,
    }
  }

  /// The next tier up, or `None` at the top.
  pub fn next(self) -> Option<Strength> {
    match self {
      Strength::Weak => Some(Strength::Medium),
      Strength::Medium => Some(Strength::Strong),
      Strength::Strong => None,
    }
  }
}

/// What the engine does when a cascade step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
  ContinueWithRetry,
  Rollback,
}

/// Rule priority. Ordered low < medium < high.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
}

impl Priority {
  /// Numeric sort key; higher runs first.
  pub fn rank(self) -> u8 {
    match self {
      Priority::Low => 0,
      Priority::Medium => 1,
      Priority::High => 2,
    }
  }
}
