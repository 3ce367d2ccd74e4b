//! Engine events and notifiers for observability.
//!
//! Events are emitted while chains run so consumers can observe progress,
//! keep metrics, or stream to a UI.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::chain::{ChainStatus, RollbackOutcome};

/// Events emitted during chain execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CascadeEvent {
  /// A chain has been created and registered as active.
  ChainStarted { chain_id: String, cascade: String },

  /// A step attempt succeeded.
  StepSucceeded {
    chain_id: String,
    order: u32,
    action: String,
    attempt: u32,
  },

  /// A step attempt failed.
  StepFailed {
    chain_id: String,
    order: u32,
    action: String,
    attempt: u32,
    error: String,
  },

  /// A failed step will be retried after the backoff.
  StepRetrying {
    chain_id: String,
    order: u32,
    backoff_ms: u64,
  },

  /// Rollback handled one previously-succeeded step.
  StepRolledBack {
    chain_id: String,
    order: u32,
    outcome: RollbackOutcome,
  },

  /// The chain reached a terminal status.
  ChainFinished {
    chain_id: String,
    status: ChainStatus,
    duration_ms: u64,
  },
}

/// Receives engine events.
///
/// The engine calls `notify` for each event; implementations decide what to
/// do with them.
pub trait EngineNotifier: Send + Sync {
  fn notify(&self, event: CascadeEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl EngineNotifier for NoopNotifier {
  fn notify(&self, _event: CascadeEvent) {}
}

/// Sends events to an unbounded channel.
///
/// Event volume is a handful per step, so the channel is left unbounded to
/// keep the engine from ever waiting on a slow consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<CascadeEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<CascadeEvent>) -> Self {
    Self { sender }
  }
}

impl EngineNotifier for ChannelNotifier {
  fn notify(&self, event: CascadeEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
