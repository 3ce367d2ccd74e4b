//! Settle Config
//!
//! This crate contains the serializable configuration types for a settle
//! network. These types describe a network before it is assembled: the nodes
//! and bonds to create, the cascades the engine knows about, and the
//! automation rules and timers that drive it.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `--network=network.json`)
//! - The built-in defaults (`NetworkDef::default()`)
//!
//! The runtime crates take these types, validate them, and build their own
//! in-memory structures from them.

mod automation;
mod cascade;
mod enums;
mod network;

pub use automation::{RuleDef, TimerDef};
pub use cascade::{BROADCAST_TARGET, CascadeDef, StepDef, SYSTEM_TARGET};
pub use enums::{ErrorPolicy, Priority, Strength};
pub use network::{BondDef, EngineSettings, FaultSettings, NetworkDef, NodeDef};
