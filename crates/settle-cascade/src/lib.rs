//! Settle Cascade Engine
//!
//! Runs named, ordered, multi-step workflows ("cascades"). Each run is a
//! [`Chain`] that records every step attempt, its timing, and how the run
//! ended.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CascadeEngine                          │
//! │  - cascade catalogue (validated at registration)            │
//! │  - trigger(name, data) → Chain                              │
//! │  - active chains → completed chains (bounded)               │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!               ┌───────────────┴───────────────┐
//!               ▼                               ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │      InternalAction       │   │          Router           │
//! │  - `system` steps         │   │  - named targets          │
//! │  - optional compensation  │   │  - `all` broadcast        │
//! └───────────────────────────┘   └───────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use settle_cascade::{CascadeEngine, EngineConfig, NoFaults, SimulatedRouter};
//!
//! let router = SimulatedRouter::new(NoFaults);
//! router.add_target("ledger");
//!
//! let engine = CascadeEngine::new(EngineConfig::default(), Arc::new(router))?;
//! let chain = engine.trigger("token", serde_json::json!({ "amount": 5 })).await?;
//! ```

mod action;
mod cascade;
mod catalog;
mod chain;
mod engine;
mod error;
mod events;
mod router;

pub use action::{Compensatable, ContinueLoop, InternalAction, StepContext, ValidateToken};
pub use cascade::{Cascade, Step, StepTarget};
pub use catalog::{
  COMMERCE_CASCADE, TOKEN_CASCADE, commerce_cascade, standard_actions, standard_cascades,
  token_cascade,
};
pub use chain::{Chain, ChainStatus, RollbackEntry, RollbackOutcome, StepRecord};
pub use engine::{CascadeEngine, EngineConfig, EngineStats};
pub use error::{CascadeError, RouteError, StepError};
pub use events::{CascadeEvent, ChannelNotifier, EngineNotifier, NoopNotifier};
pub use router::{
  BroadcastOutcome, FaultPolicy, NoFaults, RandomFaults, Router, SimulatedRouter, TargetResult,
};
