//! Settle Graph
//!
//! The connection graph of a settle network. Nodes are joined by bonds: weighted,
//! source/target edges whose strength tier determines two derived values:
//!
//! - capacitance (`100 × strength`) which feeds a network-wide aggregate
//! - resistance (`10 / strength`) which determines transmission latency
//!
//! The graph is the only modeled source of latency in the network. Every
//! [`BondGraph::transmit`] suspends for a delay chosen by a [`DelayPolicy`];
//! the default policy is deterministic (`round(resistance × 10)` ms).

mod bond;
mod delay;
mod error;
mod graph;

pub use bond::{Bond, BondStatus, Transmission};
pub use delay::{DelayPolicy, FixedDelay, ResistanceDelay};
pub use error::GraphError;
pub use graph::{BondGraph, GraphStats};
pub use settle_config::Strength;
