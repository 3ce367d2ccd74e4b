use serde::{Deserialize, Serialize};

use crate::enums::ErrorPolicy;

/// Step target that routes to an internal action instead of a node.
pub const SYSTEM_TARGET: &str = "system";

/// Step target that fans out to every known node.
pub const BROADCAST_TARGET: &str = "all";

/// A named, ordered workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeDef {
  pub name: String,
  pub steps: Vec<StepDef>,
  pub error_policy: ErrorPolicy,
  #[serde(default)]
  pub retry_failed: bool,
}

/// One step of a cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  /// 1-based position; strictly increasing within a cascade.
  pub order: u32,
  pub action: String,
  /// A node id, `"system"`, or `"all"`.
  pub target: String,
  pub timeout_ms: u64,
}

impl StepDef {
  pub fn new(order: u32, action: &str, target: &str, timeout_ms: u64) -> Self {
    Self {
      order,
      action: action.to_string(),
      target: target.to_string(),
      timeout_ms,
    }
  }

  pub fn is_internal(&self) -> bool {
    self.target == SYSTEM_TARGET
  }

  pub fn is_broadcast(&self) -> bool {
    self.target == BROADCAST_TARGET
  }
}
