//! The charge-moving cascade action and the cascade built around it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use settle_cascade::{Compensatable, InternalAction, StepContext, StepError, StepRecord};
use settle_config::{CascadeDef, ErrorPolicy, StepDef};
use settle_store::CapacityStore;
use tracing::info;

pub const TRANSFER_CHARGE: &str = "transfer_charge";
pub const SETTLEMENT_CASCADE: &str = "settlement";

/// Payload fields `transfer_charge` reads from the chain data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
struct TransferRequest {
  source: String,
  target: String,
  amount: u64,
}

impl TransferRequest {
  fn from_data(data: &serde_json::Value) -> Result<Self, StepError> {
    serde_json::from_value(data.clone()).map_err(|e| StepError::Failed {
      message: format!("invalid transfer payload: {}", e),
    })
  }
}

/// Moves charge between two nodes through the capacity store.
///
/// Compensation transfers the same amount back, so it needs the bond to
/// still be active and the source to have room again.
pub struct TransferCharge {
  store: Arc<CapacityStore>,
}

impl TransferCharge {
  pub fn new(store: Arc<CapacityStore>) -> Self {
    Self { store }
  }
}

#[async_trait]
impl InternalAction for TransferCharge {
  async fn execute(&self, ctx: &StepContext) -> Result<serde_json::Value, StepError> {
    let request = TransferRequest::from_data(&ctx.data)?;

    self
      .store
      .transfer(&request.source, &request.target, request.amount)
      .await
      .map_err(|e| StepError::Failed {
        message: e.to_string(),
      })?;

    Ok(serde_json::json!({
      "source": request.source,
      "target": request.target,
      "amount": request.amount,
    }))
  }

  fn compensator(&self) -> Option<&dyn Compensatable> {
    Some(self)
  }
}

#[async_trait]
impl Compensatable for TransferCharge {
  async fn compensate(&self, ctx: &StepContext, _record: &StepRecord) -> Result<(), StepError> {
    let request = TransferRequest::from_data(&ctx.data)?;

    info!(
      chain_id = %ctx.chain_id,
      source = %request.target,
      target = %request.source,
      amount = request.amount,
      "reversing_transfer"
    );

    self
      .store
      .transfer(&request.target, &request.source, request.amount)
      .await
      .map_err(|e| StepError::Failed {
        message: format!("reversal failed: {}", e),
      })
  }
}

/// Validate, move charge, then tell everyone. Any failure is rolled back.
pub fn settlement_cascade() -> CascadeDef {
  CascadeDef {
    name: SETTLEMENT_CASCADE.to_string(),
    steps: vec![
      StepDef::new(1, "validate_token", "system", 2_000),
      StepDef::new(2, TRANSFER_CHARGE, "system", 5_000),
      StepDef::new(3, "notify_all", "all", 5_000),
    ],
    error_policy: ErrorPolicy::Rollback,
    retry_failed: false,
  }
}
