//! Settle Store
//!
//! Per-node charge accounting. Every node registered with the
//! [`CapacityStore`] has a fixed capacitance and may hold up to ten times that
//! much charge. Charge moves between nodes only through
//! [`CapacityStore::transfer`], which requires an active bond in the
//! [`settle_graph::BondGraph`] and pays that bond's transmission latency.
//!
//! Transfers are atomic from the caller's point of view: if any stage fails,
//! the withdrawn amount is refunded to the source before the error is
//! returned. To guarantee the refund always fits, the source keeps the
//! withdrawn amount reserved as headroom while the transfer is in flight.

mod error;
mod node;
mod store;

pub use error::StoreError;
pub use node::{Node, NodeReport, NodeStatus};
pub use store::{CapacityStore, StoreStats};
