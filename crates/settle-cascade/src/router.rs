//! The router collaborator steps are sent through.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RouteError;

/// Result of sending to one target during a broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
  pub target: String,
  pub result: Result<serde_json::Value, RouteError>,
}

/// Per-target results of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastOutcome {
  pub results: Vec<TargetResult>,
}

impl BroadcastOutcome {
  pub fn succeeded(&self) -> usize {
    self.results.iter().filter(|r| r.result.is_ok()).count()
  }

  pub fn failed(&self) -> usize {
    self.results.len() - self.succeeded()
  }
}

/// Delivers step payloads to targets.
///
/// The engine treats any `Err` as a step failure.
#[async_trait]
pub trait Router: Send + Sync {
  /// Send a payload to one target.
  async fn send(
    &self,
    target: &str,
    payload: &serde_json::Value,
  ) -> Result<serde_json::Value, RouteError>;

  /// Every target a broadcast reaches.
  fn targets(&self) -> Vec<String>;

  /// Send a payload to every target concurrently.
  async fn broadcast(&self, payload: &serde_json::Value) -> BroadcastOutcome {
    let targets = self.targets();
    let sends = targets.iter().map(|target| self.send(target, payload));
    let results = futures::future::join_all(sends).await;

    BroadcastOutcome {
      results: targets
        .into_iter()
        .zip(results)
        .map(|(target, result)| TargetResult { target, result })
        .collect(),
    }
  }
}

/// Decides simulated latency and failure for a send.
pub trait FaultPolicy: Send + Sync {
  fn latency(&self, target: &str) -> Duration;
  fn should_fail(&self, target: &str) -> bool;
}

/// No latency, no failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
  fn latency(&self, _target: &str) -> Duration {
    Duration::ZERO
  }

  fn should_fail(&self, _target: &str) -> bool {
    false
  }
}

/// Uniform latency in `[0, max_latency]` and failure with `failure_rate`.
#[derive(Debug, Clone, Copy)]
pub struct RandomFaults {
  pub failure_rate: f64,
  pub max_latency: Duration,
}

impl RandomFaults {
  pub fn new(failure_rate: f64, max_latency: Duration) -> Self {
    Self {
      failure_rate: failure_rate.clamp(0.0, 1.0),
      max_latency,
    }
  }
}

impl Default for RandomFaults {
  fn default() -> Self {
    Self::new(0.05, Duration::from_millis(50))
  }
}

impl FaultPolicy for RandomFaults {
  fn latency(&self, _target: &str) -> Duration {
    let max = self.max_latency.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max))
  }

  fn should_fail(&self, _target: &str) -> bool {
    rand::thread_rng().gen_bool(self.failure_rate)
  }
}

/// In-process router with simulated latency and failure injection.
pub struct SimulatedRouter {
  targets: RwLock<BTreeSet<String>>,
  faults: Box<dyn FaultPolicy>,
}

impl SimulatedRouter {
  pub fn new(faults: impl FaultPolicy + 'static) -> Self {
    Self {
      targets: RwLock::new(BTreeSet::new()),
      faults: Box::new(faults),
    }
  }

  /// Make a target reachable. Returns false if it was already known.
  pub fn add_target(&self, target: &str) -> bool {
    self
      .targets
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(target.to_string())
  }

  pub fn knows(&self, target: &str) -> bool {
    self
      .targets
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(target)
  }
}

#[async_trait]
impl Router for SimulatedRouter {
  async fn send(
    &self,
    target: &str,
    payload: &serde_json::Value,
  ) -> Result<serde_json::Value, RouteError> {
    if !self.knows(target) {
      return Err(RouteError::UnknownTarget {
        target: target.to_string(),
      });
    }

    let latency = self.faults.latency(target);
    tokio::time::sleep(latency).await;

    if self.faults.should_fail(target) {
      debug!(target = %target, "simulated_send_failure");
      return Err(RouteError::Rejected {
        target: target.to_string(),
        message: "simulated failure".to_string(),
      });
    }

    Ok(serde_json::json!({
      "target": target,
      "delivered": true,
      "latency_ms": latency.as_millis() as u64,
      "action": payload.get("action").cloned().unwrap_or(serde_json::Value::Null),
    }))
  }

  fn targets(&self) -> Vec<String> {
    self
      .targets
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .cloned()
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  struct FailOn(&'static str);

  impl FaultPolicy for FailOn {
    fn latency(&self, _target: &str) -> Duration {
      Duration::from_millis(5)
    }

    fn should_fail(&self, target: &str) -> bool {
      target == self.0
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_send_to_known_target() {
    let router = SimulatedRouter::new(NoFaults);
    router.add_target("ledger");

    let out = router.send("ledger", &json!({ "action": "record" })).await.unwrap();
    assert_eq!(out["delivered"], true);
    assert_eq!(out["action"], "record");
  }

  #[tokio::test(start_paused = true)]
  async fn test_send_to_unknown_target() {
    let router = SimulatedRouter::new(NoFaults);
    let err = router.send("nowhere", &json!({})).await.unwrap_err();
    assert_eq!(
      err,
      RouteError::UnknownTarget {
        target: "nowhere".to_string()
      }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_broadcast_reports_each_target() {
    let router = SimulatedRouter::new(FailOn("b"));
    for target in ["a", "b", "c"] {
      router.add_target(target);
    }

    let outcome = router.broadcast(&json!({})).await;

    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.succeeded(), 2);
    assert_eq!(outcome.failed(), 1);
    assert!(outcome.results[1].result.is_err());
  }

  #[test]
  fn test_random_faults_extremes() {
    let never = RandomFaults::new(0.0, Duration::from_millis(10));
    let always = RandomFaults::new(1.0, Duration::ZERO);
    for _ in 0..50 {
      assert!(!never.should_fail("x"));
      assert!(always.should_fail("x"));
      assert!(never.latency("x") <= Duration::from_millis(10));
    }
  }
}
