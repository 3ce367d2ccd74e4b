//! Settle Automation
//!
//! Ties a settle network together and keeps it running.
//!
//! - [`Scheduler`] maps trigger names to prioritized rules. `dispatch` runs
//!   every enabled rule for a trigger, highest priority first, and records
//!   the batch in a bounded history. `run_timers` synthesizes the periodic
//!   maintenance triggers.
//! - [`RuleAction`] implementations reach into the other components:
//!   triggering cascades, repairing bonds, rebalancing charge, and reporting
//!   health.
//! - [`TransferCharge`] is the cascade action that actually moves charge, and
//!   the only built-in step rollback can reverse.
//! - [`Network::from_def`] assembles graph, store, router, engine, and
//!   scheduler from a [`settle_config::NetworkDef`].

mod action;
mod error;
mod network;
mod scheduler;
mod transfer;

pub use action::{
  REBALANCE_CHARGE, REPAIR_BONDS, REPORT_HEALTH, RebalanceCharge, RepairBonds, ReportHealth,
  RuleAction, TRIGGER_CASCADE_PREFIX, TriggerCascade, trigger_cascade_action,
};
pub use error::AutomationError;
pub use network::Network;
pub use scheduler::{
  AutomationResult, CHARGE_REBALANCE, CONTRIBUTION_PROCESSED, HEALTH_CHECK, NETWORK_MAINTENANCE,
  PURCHASE_PROCESSED, RuleOutcome, Scheduler, default_rules, default_timers,
};
pub use transfer::{SETTLEMENT_CASCADE, TRANSFER_CHARGE, TransferCharge, settlement_cascade};
