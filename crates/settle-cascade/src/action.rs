//! Internal (`system` target) actions and the compensation capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::StepRecord;
use crate::error::StepError;

/// What an internal action sees when it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
  pub chain_id: String,
  pub cascade: String,
  pub order: u32,
  pub action: String,
  pub attempt: u32,
  /// The data the chain was triggered with.
  pub data: serde_json::Value,
}

/// An action executed in-process for steps targeting `system`.
#[async_trait]
pub trait InternalAction: Send + Sync {
  async fn execute(&self, ctx: &StepContext) -> Result<serde_json::Value, StepError>;

  /// Actions that mutate resources return their compensation here.
  ///
  /// Rollback only reverses steps whose action answers `Some`; for every
  /// other step it records advisory intent.
  fn compensator(&self) -> Option<&dyn Compensatable> {
    None
  }
}

/// Reverses the effect of a step that already succeeded.
#[async_trait]
pub trait Compensatable: Send + Sync {
  async fn compensate(&self, ctx: &StepContext, record: &StepRecord) -> Result<(), StepError>;
}

/// Final step of looping workflows; hands control back to the trigger source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueLoop;

#[async_trait]
impl InternalAction for ContinueLoop {
  async fn execute(&self, ctx: &StepContext) -> Result<serde_json::Value, StepError> {
    Ok(serde_json::json!({
      "continue": true,
      "cascade": ctx.cascade,
    }))
  }
}

/// Checks that a token payload carries a usable amount.
///
/// A missing `amount` is accepted; a present one must be a positive number.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateToken;

#[async_trait]
impl InternalAction for ValidateToken {
  async fn execute(&self, ctx: &StepContext) -> Result<serde_json::Value, StepError> {
    match ctx.data.get("amount") {
      None => Ok(serde_json::json!({ "valid": true })),
      Some(amount) => match amount.as_f64() {
        Some(value) if value > 0.0 => Ok(serde_json::json!({ "valid": true, "amount": amount })),
        _ => Err(StepError::Failed {
          message: format!("invalid token amount: {}", amount),
        }),
      },
    }
  }
}
