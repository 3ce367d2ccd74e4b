use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Active,
  Inactive,
}

/// Mutable per-node state, guarded by the node's own lock.
#[derive(Debug)]
pub(crate) struct NodeCell {
  pub node_id: String,
  pub capacitance: u64,
  pub max_charge: u64,
  pub charge: u64,
  /// Headroom held back for refunds of in-flight outgoing transfers.
  pub reserved: u64,
  pub status: NodeStatus,
  pub deposits: u64,
  pub withdrawals: u64,
}

impl NodeCell {
  pub fn new(node_id: &str, capacitance: u64) -> Self {
    Self {
      node_id: node_id.to_string(),
      capacitance,
      max_charge: capacitance.saturating_mul(10),
      charge: 0,
      reserved: 0,
      status: NodeStatus::Active,
      deposits: 0,
      withdrawals: 0,
    }
  }

  /// Room left for new deposits.
  pub fn available(&self) -> u64 {
    self.max_charge - self.charge - self.reserved
  }

  pub fn is_active(&self) -> bool {
    self.status == NodeStatus::Active
  }

  pub fn snapshot(&self) -> Node {
    Node {
      node_id: self.node_id.clone(),
      capacitance: self.capacitance,
      max_charge: self.max_charge,
      current_charge: self.charge,
      voltage: self.charge as f64 / self.capacitance as f64,
      reserved: self.reserved,
      status: self.status,
      deposits: self.deposits,
      withdrawals: self.withdrawals,
    }
  }
}

/// Point-in-time view of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  pub capacitance: u64,
  pub max_charge: u64,
  pub current_charge: u64,
  /// `current_charge / capacitance`, computed when the snapshot was taken.
  pub voltage: f64,
  pub reserved: u64,
  pub status: NodeStatus,
  pub deposits: u64,
  pub withdrawals: u64,
}

/// Derived figures for a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
  pub node_id: String,
  pub status: NodeStatus,
  pub current_charge: u64,
  pub max_charge: u64,
  pub voltage: f64,
  pub utilization_pct: f64,
  pub available_capacity: u64,
  /// Deposits per withdrawal; `None` until the first withdrawal.
  pub deposit_withdraw_ratio: Option<f64>,
}

impl From<&Node> for NodeReport {
  fn from(node: &Node) -> Self {
    Self {
      node_id: node.node_id.clone(),
      status: node.status,
      current_charge: node.current_charge,
      max_charge: node.max_charge,
      voltage: node.voltage,
      utilization_pct: node.current_charge as f64 / node.max_charge as f64 * 100.0,
      available_capacity: node.max_charge - node.current_charge - node.reserved,
      deposit_withdraw_ratio: (node.withdrawals > 0)
        .then(|| node.deposits as f64 / node.withdrawals as f64),
    }
  }
}
