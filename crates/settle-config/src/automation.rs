use serde::{Deserialize, Serialize};

use crate::enums::Priority;

/// Binds a trigger name to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
  pub trigger: String,
  pub action: String,
  #[serde(default)]
  pub priority: Priority,
  #[serde(default = "default_enabled")]
  pub enabled: bool,
}

impl RuleDef {
  pub fn new(trigger: &str, action: &str, priority: Priority) -> Self {
    Self {
      trigger: trigger.to_string(),
      action: action.to_string(),
      priority,
      enabled: true,
    }
  }
}

fn default_enabled() -> bool {
  true
}

/// A periodic timer that dispatches `trigger` with empty data every
/// `interval_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerDef {
  pub trigger: String,
  pub interval_secs: u64,
}

impl TimerDef {
  pub fn new(trigger: &str, interval_secs: u64) -> Self {
    Self {
      trigger: trigger.to_string(),
      interval_secs,
    }
  }
}
