use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("bond not found: {0}")]
  NotFound(String),

  #[error("bond is not active: {0}")]
  NotActive(String),

  #[error("bond already at maximum strength: {0}")]
  AlreadyMax(String),
}
