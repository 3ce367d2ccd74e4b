//! Built-in cascades and internal actions.

use std::sync::Arc;

use settle_config::{CascadeDef, ErrorPolicy, StepDef};

use crate::action::{ContinueLoop, InternalAction, ValidateToken};

pub const COMMERCE_CASCADE: &str = "commerce";
pub const TOKEN_CASCADE: &str = "token";

/// Purchase settlement: eight steps, each failure retried once.
pub fn commerce_cascade() -> CascadeDef {
  CascadeDef {
    name: COMMERCE_CASCADE.to_string(),
    steps: vec![
      StepDef::new(1, "collect_payment", "commerce", 5_000),
      StepDef::new(2, "record_transaction", "ledger", 3_000),
      StepDef::new(3, "mint_receipt", "token", 5_000),
      StepDef::new(4, "adjust_price", "pricing", 2_000),
      StepDef::new(5, "update_catalog", "catalog", 3_000),
      StepDef::new(6, "learn_pattern", "learning", 10_000),
      StepDef::new(7, "back_up", "archive", 10_000),
      StepDef::new(8, "continue_loop", "system", 1_000),
    ],
    error_policy: ErrorPolicy::ContinueWithRetry,
    retry_failed: true,
  }
}

/// Token movement: four steps, any failure rolls the chain back.
pub fn token_cascade() -> CascadeDef {
  CascadeDef {
    name: TOKEN_CASCADE.to_string(),
    steps: vec![
      StepDef::new(1, "validate_token", "system", 2_000),
      StepDef::new(2, "record_transaction", "ledger", 3_000),
      StepDef::new(3, "update_pricing", "pricing", 2_000),
      StepDef::new(4, "notify_all", "all", 5_000),
    ],
    error_policy: ErrorPolicy::Rollback,
    retry_failed: false,
  }
}

pub fn standard_cascades() -> Vec<CascadeDef> {
  vec![commerce_cascade(), token_cascade()]
}

pub fn standard_actions() -> Vec<(&'static str, Arc<dyn InternalAction>)> {
  vec![
    ("continue_loop", Arc::new(ContinueLoop) as Arc<dyn InternalAction>),
    ("validate_token", Arc::new(ValidateToken) as Arc<dyn InternalAction>),
  ]
}
