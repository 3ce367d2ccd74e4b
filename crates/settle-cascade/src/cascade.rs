//! Validated cascade definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use settle_config::{BROADCAST_TARGET, CascadeDef, ErrorPolicy, SYSTEM_TARGET};

use crate::error::CascadeError;

/// Where a step is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum StepTarget {
  /// A registered internal action.
  System,
  /// Every target the router knows.
  All,
  /// One named target.
  Node(String),
}

impl StepTarget {
  pub fn parse(target: &str) -> Self {
    match target {
      SYSTEM_TARGET => StepTarget::System,
      BROADCAST_TARGET => StepTarget::All,
      other => StepTarget::Node(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      StepTarget::System => SYSTEM_TARGET,
      StepTarget::All => BROADCAST_TARGET,
      StepTarget::Node(target) => target,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
  pub order: u32,
  pub action: String,
  pub target: StepTarget,
  pub timeout: Duration,
}

/// A cascade that passed validation and can be triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cascade {
  pub name: String,
  /// Sorted by `order`, strictly increasing.
  pub steps: Vec<Step>,
  pub error_policy: ErrorPolicy,
  pub retry_failed: bool,
}

impl Cascade {
  /// Validate a definition.
  ///
  /// `has_action` reports whether an internal action is registered; every
  /// `system` step must name one.
  pub fn from_def(
    def: CascadeDef,
    has_action: impl Fn(&str) -> bool,
  ) -> Result<Self, CascadeError> {
    let invalid = |message: String| CascadeError::InvalidCascade {
      cascade: def.name.clone(),
      message,
    };

    if def.name.trim().is_empty() {
      return Err(invalid("name must not be empty".to_string()));
    }
    if def.steps.is_empty() {
      return Err(invalid("cascade has no steps".to_string()));
    }

    let mut steps = Vec::with_capacity(def.steps.len());
    let mut previous = 0;
    for step in &def.steps {
      if step.order <= previous {
        return Err(invalid(format!(
          "step order {} must be greater than {}",
          step.order, previous
        )));
      }
      if step.timeout_ms == 0 {
        return Err(invalid(format!("step {} has a zero timeout", step.order)));
      }
      if step.action.trim().is_empty() {
        return Err(invalid(format!("step {} has no action", step.order)));
      }

      let target = StepTarget::parse(&step.target);
      if target == StepTarget::System && !has_action(&step.action) {
        return Err(CascadeError::UnknownAction {
          cascade: def.name.clone(),
          action: step.action.clone(),
        });
      }

      previous = step.order;
      steps.push(Step {
        order: step.order,
        action: step.action.clone(),
        target,
        timeout: Duration::from_millis(step.timeout_ms),
      });
    }

    Ok(Self {
      name: def.name,
      steps,
      error_policy: def.error_policy,
      retry_failed: def.retry_failed,
    })
  }

  pub fn step(&self, order: u32) -> Option<&Step> {
    self.steps.iter().find(|s| s.order == order)
  }
}
