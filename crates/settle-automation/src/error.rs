use settle_cascade::CascadeError;
use settle_store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutomationError {
  /// A rule names an action nobody registered.
  #[error("unknown rule action: {0}")]
  UnknownAction(String),

  #[error("cascade error: {0}")]
  Cascade(#[from] CascadeError),

  #[error("store error: {0}")]
  Store(#[from] StoreError),

  #[error("action '{action}' failed: {message}")]
  Action { action: String, message: String },
}
