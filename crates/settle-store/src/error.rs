use settle_graph::GraphError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("node already registered: {0}")]
  AlreadyRegistered(String),

  #[error("capacitance must be positive for node '{0}'")]
  InvalidCapacitance(String),

  #[error("capacity exceeded on node '{node_id}': requested {requested}, available {available}")]
  CapacityExceeded {
    node_id: String,
    requested: u64,
    available: u64,
  },

  #[error("insufficient charge on node '{node_id}': requested {requested}, available {available}")]
  InsufficientCharge {
    node_id: String,
    requested: u64,
    available: u64,
  },

  #[error("no active bond between '{source_id}' and '{target_id}'")]
  NoConnection { source_id: String, target_id: String },

  #[error("cannot transfer from node '{0}' to itself")]
  SelfTransfer(String),

  #[error("transmission failed: {0}")]
  Transmission(#[from] GraphError),
}
