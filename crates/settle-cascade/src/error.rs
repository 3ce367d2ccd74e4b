//! Cascade engine error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CascadeError {
  #[error("unknown cascade: {0}")]
  UnknownCascade(String),

  /// A cascade references an internal action nobody registered.
  #[error("cascade '{cascade}' references unknown action '{action}'")]
  UnknownAction { cascade: String, action: String },

  #[error("invalid cascade '{cascade}': {message}")]
  InvalidCascade { cascade: String, message: String },

  #[error("chain not found: {0}")]
  ChainNotFound(String),
}

/// Why a single step did not succeed. Captured into the chain, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
  #[error("step timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  #[error("step failed: {message}")]
  Failed { message: String },

  #[error("route failed: {source}")]
  Route {
    #[source]
    source: RouteError,
  },

  #[error("broadcast reached {failed} of {total} targets with errors")]
  Broadcast { failed: usize, total: usize },

  #[error("internal action not registered: {action}")]
  UnknownAction { action: String },

  #[error("step panicked: {message}")]
  Panicked { message: String },

  #[error("step cancelled")]
  Cancelled,
}

impl StepError {
  /// Errors that end the chain in `error` regardless of policy.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      StepError::UnknownAction { .. } | StepError::Panicked { .. } | StepError::Cancelled
    )
  }
}

impl From<RouteError> for StepError {
  fn from(source: RouteError) -> Self {
    StepError::Route { source }
  }
}

/// Errors surfaced by the router collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteError {
  #[error("unknown target: {target}")]
  UnknownTarget { target: String },

  #[error("target '{target}' rejected the payload: {message}")]
  Rejected { target: String, message: String },
}
