//! Chain (cascade instance) records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
  Running,
  Completed,
  Failed,
  RolledBack,
  Error,
}

impl ChainStatus {
  pub fn is_terminal(self) -> bool {
    self != ChainStatus::Running
  }
}

/// Outcome of one attempt at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
  pub order: u32,
  pub action: String,
  pub target: String,
  /// 1 for the first attempt, 2 for the retry.
  pub attempt: u32,
  pub duration_ms: u64,
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<StepError>,
}

/// What rollback did for one previously-succeeded step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
  /// The step's action reversed its own effect.
  Compensated,
  /// Nothing to run; the intent was only logged.
  Advisory,
  /// Compensation was attempted and failed.
  CompensationFailed { error: StepError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackEntry {
  pub order: u32,
  pub action: String,
  #[serde(flatten)]
  pub outcome: RollbackOutcome,
}

/// One runtime instance of a triggered cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
  pub chain_id: String,
  pub cascade: String,
  pub status: ChainStatus,
  /// Appended in step order; a retry repeats the order with `attempt = 2`.
  pub steps: Vec<StepRecord>,
  /// Number of steps whose outcome is final.
  pub current_step_index: usize,
  pub started_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub rollback: Vec<RollbackEntry>,
}

impl Chain {
  pub(crate) fn start(cascade: &str) -> Self {
    Self {
      chain_id: uuid::Uuid::new_v4().to_string(),
      cascade: cascade.to_string(),
      status: ChainStatus::Running,
      steps: Vec::new(),
      current_step_index: 0,
      started_at: Utc::now(),
      completed_at: None,
      duration_ms: None,
      rollback: Vec::new(),
    }
  }

  pub(crate) fn finish(&mut self, status: ChainStatus, duration_ms: u64) {
    self.status = status;
    self.completed_at = Some(Utc::now());
    self.duration_ms = Some(duration_ms);
  }

  /// Records that failed, in order.
  pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
    self.steps.iter().filter(|r| !r.success)
  }

  pub fn last_error(&self) -> Option<&StepError> {
    self.steps.iter().rev().find_map(|r| r.error.as_ref())
  }
}
